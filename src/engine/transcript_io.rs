//! Reading conversations from disk.
//!
//! Two formats are accepted: our own JSON [`Transcript`] document, and the
//! JSONL chat export used by common chat hosts (a metadata line followed
//! by one message per line).

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::frame::ImageRef;
use crate::model::transcript::{CharacterInfo, Transcript, TranscriptMessage};

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid transcript JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("file is empty or not a transcript")]
    UnknownFormat,
}

#[derive(Deserialize)]
struct HostMeta {
    character_name: String,
}

#[derive(Deserialize)]
struct HostLine {
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_user: bool,
    #[serde(default)]
    is_system: bool,
    #[serde(default)]
    mes: String,
    #[serde(default)]
    extra: HostExtra,
}

#[derive(Deserialize, Default)]
struct HostExtra {
    #[serde(default)]
    image: Option<String>,
}

pub fn load_transcript(path: &Path) -> Result<Transcript, TranscriptError> {
    let text = fs::read_to_string(path).map_err(|source| TranscriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let transcript = parse_transcript_text(&text)?;
    info!(
        path = %path.display(),
        messages = transcript.messages.len(),
        "transcript read"
    );
    Ok(transcript)
}

pub fn parse_transcript_text(text: &str) -> Result<Transcript, TranscriptError> {
    let Some(first_line) = text.lines().find(|l| !l.trim().is_empty()) else {
        return Err(TranscriptError::UnknownFormat);
    };

    match serde_json::from_str::<Transcript>(text) {
        Ok(transcript) => Ok(transcript),
        Err(doc_error) => match serde_json::from_str::<HostMeta>(first_line) {
            Ok(_) => parse_host_jsonl(text),
            Err(_) => Err(TranscriptError::Json(doc_error)),
        },
    }
}

fn parse_host_jsonl(text: &str) -> Result<Transcript, TranscriptError> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let Some((meta_index, meta_line)) = lines.next() else {
        return Err(TranscriptError::UnknownFormat);
    };
    let meta: HostMeta = serde_json::from_str(meta_line).map_err(|source| TranscriptError::Line {
        line: meta_index + 1,
        source,
    })?;

    let mut messages = Vec::new();
    for (index, line) in lines {
        let entry: HostLine = serde_json::from_str(line).map_err(|source| TranscriptError::Line {
            line: index + 1,
            source,
        })?;
        if entry.is_system {
            debug!(line = index + 1, "skipping hidden system message");
            continue;
        }
        messages.push(TranscriptMessage {
            speaker_name: entry.name,
            is_user: entry.is_user,
            raw_content: entry.mes,
            attachments: entry
                .extra
                .image
                .filter(|s| !s.trim().is_empty())
                .map(ImageRef::new)
                .into_iter()
                .collect(),
        });
    }

    Ok(Transcript {
        character: CharacterInfo {
            name: meta.character_name,
            avatar: None,
        },
        messages,
    })
}
