//! Source bytes to an ordered sequence of untyped records.

pub mod csv;
pub mod json;
pub mod xlsx;

/// One untyped record: column or field name to value. CSV and spreadsheet
/// cells are always strings; JSON keeps its native types.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub(crate) fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}
