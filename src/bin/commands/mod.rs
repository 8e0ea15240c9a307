pub mod build_cmd;
pub mod bulk_cmd;
pub mod inspect_cmd;
pub mod query_cmd;
pub mod watch_cmd;

pub use build_cmd::cmd_build;
pub use bulk_cmd::cmd_bulk;
pub use inspect_cmd::cmd_inspect;
pub use query_cmd::cmd_query;
pub use watch_cmd::cmd_watch;
