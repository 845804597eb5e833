//! Transcript export: JSON and CSV documents, and the files that hold them.
//!
//! JSON carries the session parameters and the full message sequence; CSV is a
//! flat `idx,role,content` table with one row per message (newlines inside
//! content are written as the two characters `\n`).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use super::transcript::{Message, Transcript};

pub const DEFAULT_EXPORT_NAME: &str = "primus_chat";

const CSV_HEADER: &str = "idx,role,content";

#[derive(Serialize)]
struct JsonExport<'a> {
    run_id: &'a str,
    model: &'a str,
    temperature: f32,
    max_output_tokens: u32,
    messages: &'a [Message],
    exported_at_utc: String,
}

/// Serialise the transcript as a pretty-printed JSON document.
pub fn export_json(transcript: &Transcript) -> Result<Vec<u8>, AppError> {
    let params = transcript.parameters();
    let doc = JsonExport {
        run_id: transcript.run_id().as_str(),
        model: params.model(),
        temperature: params.temperature(),
        max_output_tokens: params.max_output_tokens(),
        messages: transcript.messages(),
        exported_at_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    serde_json::to_vec_pretty(&doc).map_err(|e| AppError::Export(format!("serialise json: {e}")))
}

/// Serialise the transcript as a CSV table, one row per message.
pub fn export_csv(transcript: &Transcript) -> Vec<u8> {
    let mut out = String::with_capacity(64 * (transcript.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for (idx, m) in transcript.messages().iter().enumerate() {
        let content = escape_newlines(&m.content);
        out.push_str(&format!("{idx},{},{}\n", m.role, csv_field(&content)));
    }
    out.into_bytes()
}

/// `<name>_<run_id>.<ext>`
pub fn export_file_name(name: &str, transcript: &Transcript, ext: &str) -> String {
    format!("{name}_{}.{ext}", transcript.run_id())
}

/// Write both exports into `dir` (created if missing). Returns `(json, csv)` paths.
pub fn write_exports(
    transcript: &Transcript,
    dir: &Path,
    name: &str,
) -> Result<(PathBuf, PathBuf), AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::Export(format!("cannot create {}: {e}", dir.display())))?;

    let json_path = dir.join(export_file_name(name, transcript, "json"));
    let csv_path = dir.join(export_file_name(name, transcript, "csv"));

    fs::write(&json_path, export_json(transcript)?)
        .map_err(|e| AppError::Export(format!("cannot write {}: {e}", json_path.display())))?;
    fs::write(&csv_path, export_csv(transcript))
        .map_err(|e| AppError::Export(format!("cannot write {}: {e}", csv_path.display())))?;

    info!(
        run_id = %transcript.run_id(),
        messages = transcript.len(),
        json = %json_path.display(),
        csv = %csv_path.display(),
        "transcript exported"
    );
    Ok((json_path, csv_path))
}

fn escape_newlines(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\n', "\\n")
}

/// Quote a field when it holds a delimiter, a quote or a stray carriage return.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
