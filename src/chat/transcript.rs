//! JSONL transcripts - one message per line, in history order

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::history::{ChatMessage, ConversationHistory};
use crate::error::Result;

/// Write the full history, replacing any existing file
pub fn save(path: impl AsRef<Path>, history: &ConversationHistory) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for message in history.all() {
        writeln!(writer, "{}", serde_json::to_string(message)?)?;
    }
    writer.flush()?;
    log::debug!("Saved {} messages to {}", history.len(), path.display());
    Ok(())
}

/// Read a transcript back. Blank lines are skipped; the result is not
/// terminated and can seed a new run.
pub fn load(path: impl AsRef<Path>) -> Result<ConversationHistory> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut messages = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            let message: ChatMessage = serde_json::from_str(&line)?;
            messages.push(message);
        }
    }
    Ok(ConversationHistory::from_messages(messages))
}

/// Timestamped file name inside `dir`
pub fn default_path(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref()
        .join(format!("kqlpair-{}.jsonl", Utc::now().format("%Y%m%d-%H%M%S")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KqlPairError;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_preserves_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("run.jsonl");

        let mut history = ConversationHistory::seeded("show me errors");
        history
            .append(ChatMessage::agent("KustoQueryAgent", "T | where Level == 'Error'"))
            .unwrap();
        history
            .append(ChatMessage::agent("KustoQueryValidationAgent", "approve"))
            .unwrap();
        history.mark_terminated();

        save(&path, &history).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.all(), history.all());
        assert!(!loaded.is_terminated());
    }

    #[test]
    fn test_load_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let history = ConversationHistory::seeded("ping");
        save(&path, &history).unwrap();

        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str("\n\n");
        fs::write(&path, text).unwrap();

        assert_eq!(load(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, "not json\n").unwrap();
        assert!(matches!(load(&path), Err(KqlPairError::Json(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(load(dir.path().join("nope.jsonl")), Err(KqlPairError::Io(_))));
    }

    #[test]
    fn test_default_path_is_jsonl_in_dir() {
        let path = default_path("/tmp/transcripts");
        assert!(path.starts_with("/tmp/transcripts"));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jsonl"));
    }
}
