//! Input documents.
//!
//! Text extraction from PDFs and other formats happens upstream; the
//! pipeline only ever sees UTF-8 text.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::errors::InputError;

/// The full input text of one translation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    text: String,
    source_path: Option<PathBuf>,
}

impl Document {
    /// Wrap text that did not come from a file
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into(), source_path: None }
    }

    /// Read a UTF-8 text file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, InputError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => InputError::FileNotFound(path.to_path_buf()),
            _ => InputError::UnreadableDocument {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;

        Ok(Self { text, source_path: Some(path.to_path_buf()) })
    }

    /// Attach the path the text was extracted from
    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Length in characters
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Whether there is nothing to translate
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
