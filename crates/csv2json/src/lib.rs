//! csv2json: a multi-route file ingestion engine.
//!
//! Per-route detectors watch drop directories for delimited text files,
//! a strict parser turns each file into an ordered (headers, rows)
//! structure, and an order-preserving converter produces JSON that is
//! delivered to a file sink, an AMQP queue, or both. Every input ends in
//! exactly one archive category: processed, ignored, or failed.

pub mod archiver;
pub mod config;
pub mod converter;
pub mod envelope;
pub mod error;
pub mod monitor;
pub mod output;
pub mod parser;
pub mod processor;
pub mod supervisor;
pub mod version;

pub use error::{IngestError, Result};
