//! File sink: one `.json` file per input, named after the source basename.

use crate::converter;
use crate::error::Result;
use crate::output::OutputHandler;
use crate::parser::ParseResult;
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;

/// Writes the converter's indented output under the configured directory.
/// File sinks never embed envelopes.
pub struct FileHandler {
    output_folder: PathBuf,
}

impl FileHandler {
    pub fn new(output_folder: PathBuf) -> Self {
        Self { output_folder }
    }
}

#[async_trait]
impl OutputHandler for FileHandler {
    async fn send(&self, result: &ParseResult, identifier: &str) -> Result<()> {
        let output_path = self
            .output_folder
            .join(converter::output_filename(identifier));
        let json = converter::to_json_ordered(result)?;
        fs::create_dir_all(&self.output_folder)?;
        fs::write(&output_path, json)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParseResult {
        ParseResult {
            headers: vec!["name".into(), "age".into()],
            rows: vec![vec!["John".into(), "30".into()]],
        }
    }

    #[tokio::test]
    async fn writes_json_named_after_input() {
        let dir = tempfile::tempdir().unwrap();
        let handler = FileHandler::new(dir.path().join("out"));

        handler.send(&sample(), "data.csv").await.unwrap();

        let written = fs::read_to_string(dir.path().join("out").join("data.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value[0]["name"], "John");
        assert_eq!(value[0]["age"], "30");
    }

    #[tokio::test]
    async fn creates_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let handler = FileHandler::new(nested.clone());

        handler.send(&sample(), "data.csv").await.unwrap();
        assert!(nested.join("data.json").exists());
    }

    #[tokio::test]
    async fn write_failure_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        // Output folder path occupied by a regular file.
        let blocked = dir.path().join("out");
        fs::write(&blocked, b"occupied").unwrap();

        let handler = FileHandler::new(blocked);
        assert!(handler.send(&sample(), "data.csv").await.is_err());
    }
}
