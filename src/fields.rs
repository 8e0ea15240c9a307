//! Static field table for row extraction
//!
//! Each standard field has a name, a kind that decides how its text is
//! typed, and the default used when the value is absent, empty, or fails to
//! parse. Any field not listed here is carried into the record's extend map.

use crate::record::GeoRecord;
use std::collections::HashMap;

/// How a standard field's text is typed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Copied verbatim, default `""`
    Text,
    /// Parsed as an integer, default `0`
    Integer,
    /// Parsed as a float, default `0.0`
    Float,
    /// Handled by the builder itself (cidr, source, confidence, extend), or
    /// row bookkeeping (id and the timestamps) that never reaches a record
    Reserved,
}

/// One entry of the field table
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Lower-case field name
    pub name: &'static str,
    /// Extraction rule
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

/// Every standard field, in record order
pub const STANDARD_FIELDS: &[FieldSpec] = &[
    field("cidr", FieldKind::Reserved),
    field("source", FieldKind::Reserved),
    field("confidence", FieldKind::Reserved),
    field("extend", FieldKind::Reserved),
    field("id", FieldKind::Reserved),
    field("createdat", FieldKind::Reserved),
    field("updatedat", FieldKind::Reserved),
    field("deletedat", FieldKind::Reserved),
    field("isp", FieldKind::Text),
    field("eswn", FieldKind::Text),
    field("continent", FieldKind::Text),
    field("country", FieldKind::Text),
    field("country_code", FieldKind::Text),
    field("country_english", FieldKind::Text),
    field("province", FieldKind::Text),
    field("city", FieldKind::Text),
    field("district", FieldKind::Text),
    field("area_code", FieldKind::Integer),
    field("latitude", FieldKind::Float),
    field("longitude", FieldKind::Float),
    field("asn", FieldKind::Integer),
    field("asn_org", FieldKind::Text),
];

/// Whether `name` (already lower-cased) belongs to the fixed schema
pub fn is_standard_field(name: &str) -> bool {
    STANDARD_FIELDS.iter().any(|f| f.name == name)
}

/// Non-empty value of a field, if present
pub fn value<'a>(row: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    row.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Text field, default `""`
pub fn text(row: &HashMap<String, String>, name: &str) -> String {
    value(row, name).unwrap_or_default().to_string()
}

/// Integer field; absent or untypeable values give `default`
pub fn integer<T: std::str::FromStr>(row: &HashMap<String, String>, name: &str, default: T) -> T {
    value(row, name)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Float field; absent, untypeable or non-finite values give `0.0`
pub fn float(row: &HashMap<String, String>, name: &str) -> f64 {
    value(row, name)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Fill the typed geo fields of a record from a row
///
/// `source` and `confidence` are left to the caller, which owns the
/// defaults for them.
pub fn extract_geo_fields(row: &HashMap<String, String>, record: &mut GeoRecord) {
    record.isp = text(row, "isp");
    record.eswn = text(row, "eswn");
    record.continent = text(row, "continent");
    record.country = text(row, "country");
    record.country_code = text(row, "country_code");
    record.country_english = text(row, "country_english");
    record.province = text(row, "province");
    record.city = text(row, "city");
    record.district = text(row, "district");
    record.area_code = integer(row, "area_code", 0i64);
    record.latitude = float(row, "latitude");
    record.longitude = float(row, "longitude");
    record.asn = integer(row, "asn", 0u32);
    record.asn_org = text(row, "asn_org");
    record.extend = row
        .iter()
        .filter(|(k, v)| !is_standard_field(k) && !v.is_empty())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
}
