//! Delimited text exports (StockX, Alias, manual sales sheets).

use std::borrow::Cow;

use serde_json::Value;

use super::{strip_bom, RawRecord};
use crate::error::ParseError;

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Parses a delimited file whose first row is the header.
///
/// Input is read as UTF-8 (a leading BOM is dropped) and falls back to
/// Latin-1 when it is not valid UTF-8. Without an explicit `delimiter` the
/// header line decides between `,` `;` tab and `|`. Headers are trimmed;
/// rows whose cells are all blank are dropped. A file with a header and no
/// rows, or no content at all, yields no records.
///
/// # Errors
///
/// Returns [`ParseError::Csv`] for malformed quoting and
/// [`ParseError::NoColumns`] when every header cell is blank.
pub fn parse_csv(bytes: &[u8], delimiter: Option<u8>) -> Result<Vec<RawRecord>, ParseError> {
    let text = decode(strip_bom(bytes));
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&text));

    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_owned()).collect();
    if headers.iter().all(String::is_empty) {
        return Err(ParseError::NoColumns);
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let record: RawRecord = headers
            .iter()
            .zip(row.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, cell)| (header.clone(), Value::String(cell.to_owned())))
            .collect();
        records.push(record);
    }

    tracing::debug!(
        rows = records.len(),
        columns = headers.len(),
        delimiter = %char::from(delimiter).escape_default(),
        "parsed delimited source"
    );
    Ok(records)
}

fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        // Latin-1 maps every byte to the code point of the same value.
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Picks the candidate that occurs most often outside quotes on the header
/// line. Ties go to the earlier candidate; no candidate at all means `,`.
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
    let mut quoted = false;
    for byte in header.bytes() {
        if byte == b'"' {
            quoted = !quoted;
            continue;
        }
        if quoted {
            continue;
        }
        if let Some(i) = CANDIDATE_DELIMITERS.iter().position(|&d| d == byte) {
            counts[i] += 1;
        }
    }

    let mut best: Option<(usize, usize)> = None;
    for (i, &count) in counts.iter().enumerate() {
        if count > 0 && best.is_none_or(|(_, top)| count > top) {
            best = Some((i, count));
        }
    }
    best.map_or(b',', |(i, _)| CANDIDATE_DELIMITERS[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell<'a>(record: &'a RawRecord, key: &str) -> &'a str {
        record.get(key).and_then(Value::as_str).unwrap()
    }

    #[test]
    fn parses_comma_file_with_bom_and_trimmed_headers() {
        let input = b"\xEF\xBB\xBFOrder Number , Item ,Listing Price\n\
            55476797-55376556,Nike Dunk Low Panda,\"1,182.00\"\n";
        let records = parse_csv(input, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(cell(&records[0], "Order Number"), "55476797-55376556");
        assert_eq!(cell(&records[0], "Listing Price"), "1,182.00");
    }

    #[test]
    fn sniffs_semicolon_and_tab() {
        let semi = parse_csv(b"SKU;Sale Date;Status\nDD1391-100;14.03.2025;sold\n", None).unwrap();
        assert_eq!(cell(&semi[0], "Sale Date"), "14.03.2025");

        let tab = parse_csv(b"SKU\tStatus\nFZ5897\tsold\n", None).unwrap();
        assert_eq!(cell(&tab[0], "Status"), "sold");
    }

    #[test]
    fn explicit_delimiter_overrides_sniffing() {
        let records = parse_csv(b"a|b,c\n1|2,3\n", Some(b'|')).unwrap();
        assert_eq!(cell(&records[0], "b,c"), "2,3");
    }

    #[test]
    fn quoted_delimiters_do_not_count_when_sniffing() {
        assert_eq!(sniff_delimiter("\"a;b;c\",d,e\n"), b',');
    }

    #[test]
    fn falls_back_to_latin1() {
        // "Größe" in Latin-1.
        let input = b"Item,Gr\xF6\xDFe\nBoot,42\n";
        let records = parse_csv(input, None).unwrap();
        assert_eq!(cell(&records[0], "Größe"), "42");
    }

    #[test]
    fn blank_rows_and_header_only_files_yield_nothing() {
        assert!(parse_csv(b"SKU,Status\n", None).unwrap().is_empty());
        assert!(parse_csv(b"", None).unwrap().is_empty());
        let records = parse_csv(b"SKU,Status\nA,sold\n , \n,,\n", None).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn short_rows_omit_missing_columns() {
        let records = parse_csv(b"SKU,Status,Brand\nA,sold\n", None).unwrap();
        assert!(records[0].get("Brand").is_none());
    }

    #[test]
    fn blank_header_row_is_rejected() {
        assert!(matches!(
            parse_csv(b" , \nA,B\n", None),
            Err(ParseError::NoColumns)
        ));
    }
}
