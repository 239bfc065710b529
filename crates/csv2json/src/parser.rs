//! Strict delimited-text parsing with column-order preservation.
//!
//! The parser validates structure up front (a 4 KiB delimiter probe), then
//! reads the whole file into an ordered (headers, rows) structure. Row-level
//! problems fail the file; there is no partial output.

use crate::error::{IngestError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes inspected by [`Parser::validate`].
const VALIDATE_PROBE_BYTES: u64 = 4096;

/// Parsed file contents: header tokens plus data rows in on-disk order.
///
/// Invariant: every row has exactly `headers.len()` cells, and every cell is
/// raw text (empty cell is an empty string, never absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Delimited-record reader for one route's parsing profile.
pub struct Parser {
    delimiter: u8,
    quote: u8,
    has_header: bool,
}

impl Parser {
    pub fn new(delimiter: u8, quote: u8, has_header: bool) -> Self {
        Self {
            delimiter,
            quote,
            has_header,
        }
    }

    /// Structural pre-pass: the first 4 KiB must contain the configured
    /// delimiter. Catches binary files and wrong-delimiter inputs before
    /// full parsing.
    pub fn validate(&self, path: &Path) -> Result<()> {
        let mut probe = Vec::with_capacity(VALIDATE_PROBE_BYTES as usize);
        File::open(path)?
            .take(VALIDATE_PROBE_BYTES)
            .read_to_end(&mut probe)?;

        if !probe.contains(&self.delimiter) {
            return Err(IngestError::Structural(format!(
                "file does not appear to contain delimiter '{}'",
                self.delimiter as char
            )));
        }
        Ok(())
    }

    /// Read the whole file into headers plus rows, preserving on-disk order.
    ///
    /// With `has_header = false`, headers are synthesized as `col_0..col_N`
    /// from the arity of the first record, which is itself a data row.
    pub fn parse_ordered(&self, path: &Path) -> Result<ParseResult> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut headers: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<String>> = Vec::new();

        for (row_num, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                IngestError::Structural(format!(
                    "failed to read record at row {}: {}",
                    row_num, e
                ))
            })?;

            let mut cells: Vec<String> = record
                .iter()
                .map(|field| field.trim_start().to_string())
                .collect();

            if row_num == 0 {
                if cells.first().is_some_and(|f| f.starts_with('\u{feff}')) {
                    let stripped = cells[0].trim_start_matches('\u{feff}').to_string();
                    cells[0] = stripped;
                }
                if self.has_header {
                    headers = cells;
                    continue;
                }
                headers = (0..cells.len()).map(|i| format!("col_{}", i)).collect();
                rows.push(cells);
                continue;
            }

            if cells.len() != headers.len() {
                return Err(IngestError::Structural(format!(
                    "row {} has {} columns, expected {}",
                    row_num,
                    cells.len(),
                    headers.len()
                )));
            }
            rows.push(cells);
        }

        if rows.is_empty() {
            return Err(IngestError::Structural(
                "no data rows found in file".to_string(),
            ));
        }

        Ok(ParseResult { headers, rows })
    }
}
