use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// @module: Output assembly, file and directory utilities

/// Separator placed between translated chunks
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Output name used when the source path is unknown
pub const DEFAULT_OUTPUT_STEM: &str = "translated_text";

/// Join translated chunks in order with a blank line and trim the result
pub fn assemble<S: AsRef<str>>(results: &[S]) -> String {
    results
        .iter()
        .map(|r| r.as_ref())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
        .trim()
        .to_string()
}

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.as_os_str().is_empty() && !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    // @generates: Output path for a translated document
    // @params: source, language file label, output_dir override
    //
    // "<dir>/<basename>_<language>.txt"; the directory defaults to the
    // source's own directory, and the basename to "translated_text".
    pub fn generate_output_path(
        source: Option<&Path>,
        language_label: &str,
        output_dir: Option<&Path>,
    ) -> PathBuf {
        let language = language_label.trim().to_lowercase().replace(' ', "_");

        let stem = source
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_OUTPUT_STEM.to_string());

        let file_name = format!("{}_{}.txt", stem, language);

        let dir = output_dir
            .map(Path::to_path_buf)
            .or_else(|| source.and_then(|p| p.parent()).map(Path::to_path_buf))
            .unwrap_or_default();

        dir.join(file_name)
    }

    /// Whether a file looks like an output written for `language_label`
    pub fn is_translation_output<P: AsRef<Path>>(path: P, language_label: &str) -> bool {
        let suffix = format!("_{}", language_label.trim().to_lowercase().replace(' ', "_"));
        path.as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase().ends_with(&suffix))
            .unwrap_or(false)
    }

    /// Find files with a specific extension in a directory
    pub fn find_files<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        let wanted = extension.trim_start_matches('.');

        for entry in WalkDir::new(dir.as_ref()).follow_links(true).sort_by_file_name() {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(wanted))
            {
                result.push(path.to_path_buf());
            }
        }

        Ok(result)
    }

    /// Write a string to a file as UTF-8, replacing any previous content
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> std::io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(&path, content)
    }

    /// Append content to a log file with timestamp
    pub fn append_to_log_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {:?}", path.as_ref()))?;

        writeln!(file, "[{}] {}", timestamp, content)
            .with_context(|| format!("Failed to write to log file: {:?}", path.as_ref()))?;

        Ok(())
    }
}
