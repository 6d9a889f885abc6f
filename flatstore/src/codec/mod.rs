// Row codec - CSV bytes to and from ordered string rows.

use crate::error::{FlatstoreError, Result};
use indexmap::IndexMap;

/// One record: an ordered mapping from column name to string value.
/// Values carry no type information; filter operators interpret them
/// as numbers, dates, or patterns on demand.
pub type Row = IndexMap<String, String>;

/// The identity column every dataset carries.
pub const ID_COLUMN: &str = "id";

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Decode a dataset file into its header and rows.
///
/// Tolerates a UTF-8 byte-order mark and empty input (empty header, no
/// rows). Quoted fields may contain delimiters and newlines. A record
/// longer than the header drops the unnamed tail; a shorter record leaves
/// the trailing columns absent (they encode back as empty strings).
pub fn decode(bytes: &[u8]) -> Result<(Vec<String>, Vec<Row>)> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if bytes.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut records = reader.records();

    let header: Vec<String> = match records.next() {
        Some(first) => first?.iter().map(|field| field.to_string()).collect(),
        None => return Ok((Vec::new(), Vec::new())),
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        let mut row = Row::new();
        for (column, value) in header.iter().zip(record.iter()) {
            row.insert(column.clone(), value.to_string());
        }
        rows.push(row);
    }

    Ok((header, rows))
}

/// Return `header` widened with every column that appears in some row but
/// not in the header, appended in first-seen order. Declared columns keep
/// their positions.
pub fn reconcile_header(header: &[String], rows: &[Row]) -> Vec<String> {
    let mut reconciled = header.to_vec();
    for row in rows {
        for column in row.keys() {
            if !reconciled.iter().any(|c| c == column) {
                reconciled.push(column.clone());
            }
        }
    }
    reconciled
}

/// Encode a header and rows back to CSV bytes.
///
/// Header reconciliation happens here, once per full rewrite: columns
/// discovered in rows are appended to the header rather than dropped.
/// Rows missing a column are padded with the empty string.
pub fn encode(header: &[String], rows: &[Row]) -> Result<Vec<u8>> {
    let header = reconcile_header(header, rows);
    if header.is_empty() {
        return Ok(Vec::new());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for row in rows {
        writer.write_record(
            header
                .iter()
                .map(|column| row.get(column).map(String::as_str).unwrap_or("")),
        )?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| FlatstoreError::Other(format!("CSV buffer error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_decode_empty_input() {
        let (header, rows) = decode(b"").unwrap();
        assert!(header.is_empty());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_decode_header_only() {
        let (header, rows) = decode(b"id,name\n").unwrap();
        assert_eq!(header, vec!["id", "name"]);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_decode_strips_bom() {
        let (header, rows) = decode(b"\xef\xbb\xbfid,name\n1,Ann\n").unwrap();
        assert_eq!(header, vec!["id", "name"]);
        assert_eq!(rows[0]["id"], "1");
    }

    #[test]
    fn test_decode_quoted_delimiters_and_newlines() {
        let input = b"id,note\n1,\"hello, world\"\n2,\"line one\nline two\"\n";
        let (_, rows) = decode(input).unwrap();
        assert_eq!(rows[0]["note"], "hello, world");
        assert_eq!(rows[1]["note"], "line one\nline two");
    }

    #[test]
    fn test_decode_short_and_long_records() {
        let (header, rows) = decode(b"id,name,role\n1,Ann\n2,Bob,admin,extra\n").unwrap();
        assert_eq!(header.len(), 3);
        // short record: missing column absent
        assert_eq!(rows[0].get("role"), None);
        // long record: unnamed tail dropped
        assert_eq!(rows[1]["role"], "admin");
        assert_eq!(rows[1].len(), 3);
    }

    #[test]
    fn test_encode_pads_missing_columns() {
        let header = vec!["id".to_string(), "name".to_string(), "role".to_string()];
        let rows = vec![row(&[("id", "1"), ("name", "Ann")])];
        let bytes = encode(&header, &rows).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "id,name,role\n1,Ann,\n");
    }

    #[test]
    fn test_encode_widens_header() {
        let header = vec!["id".to_string()];
        let rows = vec![
            row(&[("id", "1"), ("name", "Ann")]),
            row(&[("id", "2"), ("level", "5")]),
        ];
        let bytes = encode(&header, &rows).unwrap();
        let (header, rows) = decode(&bytes).unwrap();
        assert_eq!(header, vec!["id", "name", "level"]);
        assert_eq!(rows[1]["level"], "5");
        assert_eq!(rows[1]["name"], "");
    }

    #[test]
    fn test_round_trip_preserves_order_and_values() {
        let input = b"id,name,score\n1,\"Ann, A.\",85\n2,Bob,\n";
        let (header, rows) = decode(input).unwrap();
        let bytes = encode(&header, &rows).unwrap();
        let (header2, rows2) = decode(&bytes).unwrap();
        assert_eq!(header, header2);
        assert_eq!(rows, rows2);
    }

    #[test]
    fn test_round_trip_is_byte_stable() {
        let input = b"id,name\n1,Ann\n2,\"B,ob\"\n";
        let (header, rows) = decode(input).unwrap();
        let first = encode(&header, &rows).unwrap();
        let (header2, rows2) = decode(&first).unwrap();
        let second = encode(&header2, &rows2).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_encode_empty_dataset() {
        assert!(encode(&[], &[]).unwrap().is_empty());
    }
}
