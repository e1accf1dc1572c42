//! Spreadsheet workbooks (.xlsx, .xlsm, .xls, .ods).

use std::io::Cursor;

use calamine::{Data, Reader};
use serde_json::Value;

use super::RawRecord;
use crate::error::ParseError;

/// Parses the first sheet of a workbook whose first row is the header.
///
/// Follows the delimited-text rules: headers are trimmed, columns with a
/// blank header are dropped, rows whose cells are all blank are skipped and
/// every cell becomes text. Numbers keep their shortest decimal form (`80`,
/// `120.5`); date cells become `YYYY-MM-DD HH:MM:SS`. A workbook without
/// sheets, or with an empty first sheet, yields no records.
///
/// # Errors
///
/// Returns [`ParseError::Spreadsheet`] when the bytes are not a readable
/// workbook and [`ParseError::NoColumns`] when every header cell is blank.
pub fn parse_xlsx(bytes: &[u8]) -> Result<Vec<RawRecord>, ParseError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let Some(range) = workbook.worksheet_range_at(0) else {
        return Ok(Vec::new());
    };
    let range = range?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_row.iter().map(|cell| cell_text(cell).trim().to_owned()).collect();
    if headers.iter().all(String::is_empty) {
        return Err(ParseError::NoColumns);
    }

    let mut records = Vec::new();
    for row in rows {
        let cells: Vec<String> = row.iter().map(|cell| cell_text(cell).trim().to_owned()).collect();
        if cells.iter().all(String::is_empty) {
            continue;
        }
        let record: RawRecord = headers
            .iter()
            .zip(cells)
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, cell)| (header.clone(), Value::String(cell)))
            .collect();
        records.push(record);
    }

    tracing::debug!(
        rows = records.len(),
        columns = headers.len(),
        "parsed spreadsheet source"
    );
    Ok(records)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map_or_else(|| dt.as_f64().to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKBOOK: &[u8] = include_bytes!("../../tests/fixtures/manual_sales.xlsx");

    fn cell<'a>(record: &'a RawRecord, key: &str) -> &'a str {
        record.get(key).and_then(Value::as_str).unwrap()
    }

    #[test]
    fn reads_first_sheet_with_trimmed_headers() {
        let records = parse_xlsx(WORKBOOK).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(cell(&records[0], "SKU"), "SF-0001");
        assert_eq!(cell(&records[0], "Sale Date"), "14.03.2025");
        assert!(records.iter().all(|r| r.get("ignored").is_none()));
    }

    #[test]
    fn numbers_and_dates_become_text() {
        let records = parse_xlsx(WORKBOOK).unwrap();
        assert_eq!(cell(&records[0], "Net Buy"), "80");
        assert_eq!(cell(&records[0], "Net Sale"), "120.5");
        assert_eq!(cell(&records[1], "Sale Date"), "2025-03-14 00:00:00");
        assert_eq!(cell(&records[1], "Net Buy"), "95.25");
    }

    #[test]
    fn blank_rows_are_skipped_and_missing_cells_are_blank() {
        let records = parse_xlsx(WORKBOOK).unwrap();
        assert_eq!(cell(&records[1], "SKU"), "SF-0002");
        assert_eq!(cell(&records[2], "Product Name"), "Runner Model 3");
        assert_eq!(cell(&records[2], "SKU"), "");
    }

    #[test]
    fn non_workbook_bytes_are_a_spreadsheet_error() {
        assert!(matches!(
            parse_xlsx(b"SKU,Status\nA,sold\n"),
            Err(ParseError::Spreadsheet(_))
        ));
    }
}
