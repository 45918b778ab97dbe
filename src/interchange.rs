//! Plain-file interchange: importing source text and glossaries, exporting
//! translations and glossaries under direction/timestamp file names.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::settings::Direction;
use crate::translate::TranslationMode;

#[derive(Debug, thiserror::Error)]
pub enum InterchangeError {
    #[error("nothing to export")]
    Empty,
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn unix_millis(at: SystemTime) -> u128 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

/// `translation-<direction>-<unix_ms>.<txt|html>`
pub fn translation_file_name(direction: Direction, mode: TranslationMode, at: SystemTime) -> String {
    format!(
        "translation-{}-{}.{}",
        direction,
        unix_millis(at),
        mode.file_extension()
    )
}

/// `glossary-<direction>-<unix_ms>.txt`
pub fn glossary_file_name(direction: Direction, at: SystemTime) -> String {
    format!("glossary-{}-{}.txt", direction, unix_millis(at))
}

/// Read a UTF-8 text file to import (source text, HTML, or glossary).
pub fn import_text(path: &Path) -> Result<String, InterchangeError> {
    std::fs::read_to_string(path).map_err(|source| InterchangeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `content` as `dir/file_name`, creating `dir` if needed.
pub fn write_export(dir: &Path, file_name: &str, content: &str) -> Result<PathBuf, InterchangeError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| InterchangeError::Io { path, source }
    };
    std::fs::create_dir_all(dir).map_err(io_err(dir))?;
    let path = dir.join(file_name);
    std::fs::write(&path, content).map_err(io_err(&path))?;
    info!(path = %path.display(), bytes = content.len(), "export_written");
    Ok(path)
}

/// Export a translation result. Empty output is refused.
pub fn export_translation(
    dir: &Path,
    direction: Direction,
    mode: TranslationMode,
    content: &str,
) -> Result<PathBuf, InterchangeError> {
    if content.is_empty() {
        return Err(InterchangeError::Empty);
    }
    write_export(dir, &translation_file_name(direction, mode, SystemTime::now()), content)
}

/// Export the raw glossary text. Blank text is refused.
pub fn export_glossary(
    dir: &Path,
    direction: Direction,
    glossary_text: &str,
) -> Result<PathBuf, InterchangeError> {
    if glossary_text.trim().is_empty() {
        return Err(InterchangeError::Empty);
    }
    write_export(dir, &glossary_file_name(direction, SystemTime::now()), glossary_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn file_names_carry_direction_timestamp_and_extension() {
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(
            translation_file_name(Direction::EsDa, TranslationMode::Html, at),
            "translation-es-da-1700000000123.html"
        );
        assert_eq!(
            translation_file_name(Direction::DaEs, TranslationMode::Text, at),
            "translation-da-es-1700000000123.txt"
        );
        assert_eq!(glossary_file_name(Direction::DaEs, at), "glossary-da-es-1700000000123.txt");
    }

    #[test]
    fn glossary_export_and_reimport() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_glossary(dir.path(), Direction::EsDa, "hola=hej\n").unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("glossary-es-da-"));
        assert_eq!(import_text(&path).unwrap(), "hola=hej\n");
    }

    #[test]
    fn blank_exports_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            export_glossary(dir.path(), Direction::EsDa, "  \n"),
            Err(InterchangeError::Empty)
        ));
        assert!(matches!(
            export_translation(dir.path(), Direction::EsDa, TranslationMode::Text, ""),
            Err(InterchangeError::Empty)
        ));
    }

    #[test]
    fn missing_import_names_the_path() {
        let err = import_text(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(err.to_string().starts_with("/definitely/not/here.txt"));
    }
}
