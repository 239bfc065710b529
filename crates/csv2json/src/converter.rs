//! Ordered JSON serialization of parsed files.
//!
//! Generic JSON maps do not preserve insertion order, so the array is built
//! by iterating the header list and escaping each key and value through
//! `serde_json`. Every value stays a JSON string; the empty cell serializes
//! as `""`.

use crate::error::Result;
use crate::parser::ParseResult;
use std::collections::BTreeMap;

const INDENT: &str = "  ";

/// Serialize to the human-inspectable form: a JSON array with one compact
/// object per line, keys in header order.
pub fn to_json_ordered(result: &ParseResult) -> Result<Vec<u8>> {
    render(result, true)
}

/// Compact form used for queue payloads.
pub fn to_json_compact(result: &ParseResult) -> Result<Vec<u8>> {
    render(result, false)
}

fn render(result: &ParseResult, pretty: bool) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    buf.push(b'[');
    for (i, row) in result.rows.iter().enumerate() {
        if i > 0 {
            buf.push(b',');
        }
        if pretty {
            buf.push(b'\n');
            buf.extend_from_slice(INDENT.as_bytes());
        }
        buf.push(b'{');
        for (j, (key, value)) in result.headers.iter().zip(row.iter()).enumerate() {
            if j > 0 {
                buf.push(b',');
            }
            buf.append(&mut serde_json::to_vec(key)?);
            buf.push(b':');
            buf.append(&mut serde_json::to_vec(value)?);
        }
        buf.push(b'}');
    }
    if pretty {
        buf.push(b'\n');
    }
    buf.push(b']');
    Ok(buf)
}

/// Legacy entry point for callers that did not pass through the parser:
/// serialize plain rows with keys in alphabetical order.
pub fn to_json(rows: &[BTreeMap<String, String>]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(rows)?)
}

/// Output file name for an input: extension replaced by `.json`.
pub fn output_filename(input: &str) -> String {
    match input.rsplit_once('.') {
        Some((stem, _)) => format!("{}.json", stem),
        None => format!("{}.json", input),
    }
}
