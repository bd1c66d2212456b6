//! Delimited-text codec.
//!
//! Decoding is lazy and forward-only. The header line is resolved once and
//! maps column positions onto [`AccountField`]s by name, so column order in
//! the input does not matter. Encoding always writes the declared order
//! with minimal quoting, so export output is re-importable.
//!
//! The remote store returns bulk results as independently-headered chunks.
//! Any record whose values repeat the header signature is dropped rather
//! than passed on as data.

use std::collections::BTreeMap;
use std::io::Write;

use csv::{
    ErrorKind, Position, QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder,
};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{AccountField, Record, Row};
use crate::sync::types::FailureDetail;

/// Column in bulk failure results holding the record id.
const FAILED_ID_COLUMN: &str = "sf__Id";
/// Column in bulk failure results holding the API error text.
const FAILED_ERROR_COLUMN: &str = "sf__Error";

/// A row together with the 1-based line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRow {
    pub line: u64,
    pub row: Row,
}

fn reader_builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder.has_headers(false).flexible(true);
    builder
}

fn record_line(record: &StringRecord) -> u64 {
    record.position().map_or(0, Position::line)
}

/// Per-record read errors the reader can continue past become
/// `Undecodable`; anything else stays a `Csv` error.
fn read_error(e: csv::Error) -> Error {
    match e.kind() {
        ErrorKind::Utf8 { pos, err } => Error::Undecodable {
            line: pos.as_ref().map_or(0, Position::line),
            detail: err.to_string(),
        },
        _ => e.into(),
    }
}

/// Resolve a header record into declared fields.
///
/// # Errors
///
/// Returns `SchemaMismatch` if a column is unknown, repeated, or a declared
/// field has no column.
pub fn resolve_header(record: &StringRecord) -> Result<Vec<AccountField>> {
    let line = record_line(record).max(1);
    let mut columns = Vec::with_capacity(record.len());
    for (i, raw) in record.iter().enumerate() {
        let name = if i == 0 {
            raw.trim_start_matches('\u{feff}').trim()
        } else {
            raw.trim()
        };
        let field: AccountField = name.parse().map_err(|_| Error::SchemaMismatch {
            line,
            detail: format!("unknown column '{name}'"),
        })?;
        if columns.contains(&field) {
            return Err(Error::SchemaMismatch {
                line,
                detail: format!("duplicate column '{name}'"),
            });
        }
        columns.push(field);
    }

    let missing: Vec<&str> = AccountField::ALL
        .iter()
        .filter(|f| !columns.contains(f))
        .map(AccountField::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(Error::SchemaMismatch {
            line,
            detail: format!("missing column(s) {}", missing.join(", ")),
        });
    }
    Ok(columns)
}

/// Whether `record` repeats the header signature for `columns`, or the
/// declared header.
fn is_header_echo(record: &StringRecord, columns: &[AccountField]) -> bool {
    if record.len() != columns.len() {
        return false;
    }
    record
        .iter()
        .map(str::trim)
        .eq(columns.iter().map(AccountField::as_str))
        || record
            .iter()
            .map(str::trim)
            .eq(AccountField::ALL.iter().map(AccountField::as_str))
}

/// Lazy decoder over a single headered stream.
///
/// A data line that is not valid UTF-8 yields `Err(Error::Undecodable)`
/// and decoding continues with the next line.
pub struct RowDecoder<R: std::io::Read> {
    records: csv::StringRecordsIntoIter<R>,
    columns: Vec<AccountField>,
}

impl<R: std::io::Read> RowDecoder<R> {
    /// Read and resolve the header line.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` for an empty stream or a bad header, and
    /// `Csv` if the header cannot be read.
    pub fn new(reader: R) -> Result<Self> {
        let mut records = reader_builder().from_reader(reader).into_records();
        let header = match records.next() {
            Some(record) => record?,
            None => {
                return Err(Error::SchemaMismatch {
                    line: 1,
                    detail: "no header line".to_string(),
                });
            }
        };
        let columns = resolve_header(&header)?;
        Ok(Self { records, columns })
    }
}

impl<R: std::io::Read> Iterator for RowDecoder<R> {
    type Item = Result<DecodedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(read_error(e))),
            };
            let line = record_line(&record);
            if is_header_echo(&record, &self.columns) {
                debug!(line, "dropping repeated header line");
                continue;
            }
            return Some(Ok(DecodedRow {
                line,
                row: Row::from_values(&self.columns, record.iter()),
            }));
        }
    }
}

/// Decoder for a stream delivered as independently-headered chunks.
///
/// Only the first chunk's header is treated as a header. Line numbers
/// continue across chunks.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    columns: Option<Vec<AccountField>>,
    lines_before: u64,
}

impl ChunkDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` if the first chunk's header is not the
    /// declared one, or `Csv` on unreadable text.
    pub fn decode_chunk(&mut self, chunk: &str) -> Result<Vec<DecodedRow>> {
        let mut reader = reader_builder().from_reader(chunk.as_bytes());
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let line = self.lines_before + record_line(&record);
            match &self.columns {
                None => self.columns = Some(resolve_header(&record)?),
                Some(columns) if is_header_echo(&record, columns) => {
                    debug!(line, "dropping chunk header");
                }
                Some(columns) => rows.push(DecodedRow {
                    line,
                    row: Row::from_values(columns, record.iter()),
                }),
            }
        }
        self.lines_before += chunk.lines().count() as u64;
        Ok(rows)
    }
}

/// Writer that emits the declared header once, then one line per row.
pub struct RowEncoder<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl<W: Write> RowEncoder<W> {
    /// Wrap `inner` and write the header line.
    ///
    /// # Errors
    ///
    /// Returns `Csv` if the header cannot be written.
    pub fn with_header(inner: W) -> Result<Self> {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(inner);
        writer.write_record(AccountField::header())?;
        Ok(Self { writer, rows: 0 })
    }

    /// Write a row in declared column order.
    ///
    /// # Errors
    ///
    /// Returns `Csv` on write failure.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        self.writer.write_record(row.ordered_values())?;
        self.rows += 1;
        Ok(())
    }

    /// Write already-ordered values.
    ///
    /// # Errors
    ///
    /// Returns `Csv` on write failure.
    pub fn write_values(&mut self, values: &[String]) -> Result<()> {
        self.writer.write_record(values)?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far, excluding the header.
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Flush and return the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns `Io` if buffered output cannot be flushed.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}

/// Encode disk-form rows into a complete document.
///
/// # Errors
///
/// Returns `Csv` on serialization failure.
pub fn encode_rows<'a>(rows: impl IntoIterator<Item = &'a Row>) -> Result<Vec<u8>> {
    let mut encoder = RowEncoder::with_header(Vec::new())?;
    for row in rows {
        encoder.write_row(row)?;
    }
    encoder.into_inner()
}

/// Encode records in payload form (ungrouped AnnualRevenue).
///
/// # Errors
///
/// Returns `Csv` on serialization failure.
pub fn encode_wire(records: &[Record]) -> Result<String> {
    let mut encoder = RowEncoder::with_header(Vec::new())?;
    for record in records {
        encoder.write_values(&record.to_wire_values())?;
    }
    let bytes = encoder.into_inner()?;
    String::from_utf8(bytes).map_err(|e| Error::Other(format!("payload is not UTF-8: {e}")))
}

/// Parse a bulk failure-results document.
///
/// # Errors
///
/// Returns `Csv` on unreadable text.
pub fn parse_failed_results(text: &str) -> Result<Vec<FailureDetail>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();
    let mut details = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row = BTreeMap::new();
        let mut id = String::new();
        let mut error = String::new();
        for (name, value) in headers.iter().zip(record.iter()) {
            match name {
                FAILED_ID_COLUMN => id = value.to_string(),
                FAILED_ERROR_COLUMN => error = value.to_string(),
                _ => {
                    row.insert(name.to_string(), value.to_string());
                }
            }
        }
        let record_label = if id.is_empty() {
            row.get(AccountField::Name.as_str()).cloned().unwrap_or_default()
        } else {
            id
        };
        details.push(FailureDetail {
            line: None,
            record: record_label,
            error,
            row,
        });
    }
    Ok(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Operation, Record};

    fn header_line() -> String {
        AccountField::header().join(",")
    }

    fn line_with(name: &str, revenue: &str) -> String {
        let mut values = vec![String::new(); AccountField::ALL.len()];
        values[AccountField::Name.index()] = name.to_string();
        values[AccountField::AnnualRevenue.index()] = revenue.to_string();
        values.join(",")
    }

    #[test]
    fn test_decode_lines_and_numbers() {
        let text = format!(
            "{}\n{}\n{}\n",
            header_line(),
            line_with("Acme", "10"),
            line_with("Globex", "20")
        );
        let rows: Vec<DecodedRow> = RowDecoder::new(text.as_bytes())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[1].line, 3);
        assert_eq!(rows[1].row.get(AccountField::Name), Some("Globex"));
    }

    #[test]
    fn test_decode_matches_columns_by_name() {
        let mut names = AccountField::header();
        names.swap(0, 1);
        let mut values = vec![""; names.len()];
        values[0] = "Acme";
        values[1] = "001A";
        let text = format!("{}\n{}\n", names.join(","), values.join(","));
        let row = RowDecoder::new(text.as_bytes()).unwrap().next().unwrap().unwrap().row;
        assert_eq!(row.get(AccountField::Id), Some("001A"));
        assert_eq!(row.get(AccountField::Name), Some("Acme"));
    }

    #[test]
    fn test_decode_rejects_unknown_header() {
        let text = "Id,Name,Website\n";
        let err = RowDecoder::new(text.as_bytes()).err().unwrap();
        assert!(matches!(err, Error::SchemaMismatch { line: 1, .. }));
    }

    #[test]
    fn test_decode_flags_ragged_rows() {
        let text = format!("{}\n{},extra\n{}\n", header_line(), line_with("A", "1"), "only,two");
        let rows: Vec<DecodedRow> = RowDecoder::new(text.as_bytes())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows[0].row.overflow().len(), 1);
        assert_eq!(rows[1].row.missing().len(), AccountField::ALL.len() - 2);
    }

    #[test]
    fn test_decode_continues_past_invalid_utf8() {
        let mut bytes = format!("{}\n{}\n", header_line(), line_with("Acme", "1")).into_bytes();
        bytes.extend_from_slice(b"001B,Soci");
        bytes.push(0xE9); // cp1252 'é'
        bytes.extend_from_slice(b"t\n");
        bytes.extend_from_slice(format!("{}\n", line_with("Globex", "3")).as_bytes());

        let results: Vec<Result<DecodedRow>> =
            RowDecoder::new(bytes.as_slice()).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().line, 2);
        assert!(matches!(results[1], Err(Error::Undecodable { line: 3, .. })));
        let last = results[2].as_ref().unwrap();
        assert_eq!(last.line, 4);
        assert_eq!(last.row.get(AccountField::Name), Some("Globex"));
    }

    #[test]
    fn test_chunks_drop_repeated_headers() {
        let quoted: Vec<String> = AccountField::header()
            .iter()
            .map(|h| format!("\"{h}\""))
            .collect();
        let first = format!("{}\n{}\n", quoted.join(","), line_with("A", "1"));
        let second = format!(
            "{}\n{}\n{}\n",
            quoted.join(","),
            line_with("B", "2"),
            line_with("C", "3")
        );

        let mut decoder = ChunkDecoder::new();
        let a = decoder.decode_chunk(&first).unwrap();
        let b = decoder.decode_chunk(&second).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].row.get(AccountField::Name), Some("B"));
        assert_eq!(b[0].line, 4);
    }

    #[test]
    fn test_minimal_quoting() {
        let mut row = Row::new();
        row.insert(AccountField::Name, "Acme, Inc.");
        row.insert(AccountField::BillingStreet, "1 \"Main\" St\nSuite 2");
        row.insert(AccountField::Phone, "555-0100");
        let text = String::from_utf8(encode_rows([&row]).unwrap()).unwrap();
        assert!(text.starts_with("Id,Name,BillingStreet"));
        assert!(text.contains("\"Acme, Inc.\""));
        assert!(text.contains("\"1 \"\"Main\"\" St\nSuite 2\""));
        assert!(text.contains(",555-0100,"));
    }

    #[test]
    fn test_round_trip_records() {
        let mut originals = Vec::new();
        for (name, street, revenue) in [
            ("Acme, Inc.", "1 \"Main\" St\nSuite 2", "1,234,567.00"),
            ("Globex", "", "N/A"),
            ("Initech", "42 Elm", ""),
        ] {
            let mut record = Record::new();
            record.set(0, AccountField::Name, name);
            record.set(0, AccountField::BillingStreet, street);
            record.set(0, AccountField::AnnualRevenue, revenue);
            originals.push(record);
        }

        let rows: Vec<Row> = originals.iter().map(Record::to_row).collect();
        let bytes = encode_rows(&rows).unwrap();
        let decoded: Vec<Record> = RowDecoder::new(bytes.as_slice())
            .unwrap()
            .map(|r| {
                let r = r.unwrap();
                Record::parse_row(r.line, &r.row, Operation::Upsert).unwrap().0
            })
            .collect();
        assert_eq!(decoded, originals);
        assert_eq!(
            decoded[0].to_row().get(AccountField::AnnualRevenue),
            Some("1,234,567.00")
        );
    }

    #[test]
    fn test_encode_wire_ungroups_revenue() {
        let mut record = Record::new();
        record.set(0, AccountField::Name, "Acme");
        record.set(0, AccountField::AnnualRevenue, "2,500,000");
        let payload = encode_wire(&[record]).unwrap();
        assert!(payload.lines().nth(1).unwrap().ends_with(",2500000"));
    }

    #[test]
    fn test_parse_failed_results() {
        let text = concat!(
            "\"sf__Id\",\"sf__Error\",Id,Name\n",
            "\"\",\"REQUIRED_FIELD_MISSING:Required fields are missing: [Name]:Name --\",,\n",
            "\"001X\",\"DUPLICATE_VALUE:dup\",001X,Acme\n",
        );
        let details = parse_failed_results(text).unwrap();
        assert_eq!(details.len(), 2);
        assert!(details[0].error.starts_with("REQUIRED_FIELD_MISSING"));
        assert_eq!(details[1].record, "001X");
        assert_eq!(details[1].row["Name"], "Acme");
    }
}
