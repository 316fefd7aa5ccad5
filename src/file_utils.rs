use anyhow::{Result, Context};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use log::debug;

// @module: File and directory utilities for subtitle files

/// Subtitle file extensions the engine recognizes when scanning directories
const SUBTITLE_EXTENSIONS: [&str; 4] = ["srt", "ass", "ssa", "sub"];

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    /// Output path for a translated subtitle: `<stem>.<target_lang>.<ext>`
    /// beside the original. A `.sub` input maps to a `.ass` output.
    pub fn output_path_for<P: AsRef<Path>>(input_file: P, target_lang: &str) -> PathBuf {
        let input_file = input_file.as_ref();
        let stem = input_file.file_stem().unwrap_or_default().to_string_lossy();

        let ext = input_file
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "srt".to_string());
        let out_ext = if ext == "sub" { "ass".to_string() } else { ext };

        input_file.with_file_name(format!("{}.{}.{}", stem, target_lang, out_ext))
    }

    /// Find subtitle files in a directory tree, skipping already-translated
    /// outputs for the given target language.
    pub fn find_subtitle_files<P: AsRef<Path>>(dir: P, target_lang: &str) -> Result<Vec<PathBuf>> {
        let translated_marker = format!(".{}.", target_lang);
        let mut result = Vec::new();

        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension() else { continue };
            let ext = ext.to_string_lossy().to_lowercase();
            if !SUBTITLE_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }
            // Our own outputs are named <stem>.<lang>.<ext>
            if path.to_string_lossy().contains(&translated_marker) {
                continue;
            }
            result.push(path.to_path_buf());
        }

        result.sort();
        Ok(result)
    }

    /// Read a subtitle file, auto-detecting encoding. Tries strict UTF-8
    /// first (with BOM strip), then falls back to Windows-1252, the usual
    /// legacy encoding for scene subtitles. Returns the content and the
    /// encoding label that was used.
    pub fn read_subtitle<P: AsRef<Path>>(path: P) -> Result<(String, &'static str)> {
        let bytes = fs::read(&path)
            .with_context(|| format!("Failed to read file: {:?}", path.as_ref()))?;

        // UTF-8 BOM
        let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);

        if let Ok(text) = std::str::from_utf8(body) {
            return Ok((text.to_string(), "utf-8"));
        }

        let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(body);
        if had_errors {
            debug!("Lossy windows-1252 decode for {:?}", path.as_ref());
        }
        Ok((decoded.into_owned(), "windows-1252"))
    }

    /// Write a subtitle file as UTF-8 without BOM
    pub fn write_subtitle<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        fs::write(&path, content.as_bytes())
            .with_context(|| format!("Failed to write to file: {:?}", path.as_ref()))?;

        Ok(())
    }
}
