//! Best-effort content signals: short text excerpts from documents and image metadata.
//!
//! Every failure here means "no signal". Nothing is ever reported as an error.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::{Output, Stdio};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tokio::process::Command;

/// Maximum excerpt length in characters.
pub const MAX_EXCERPT_CHARS: usize = 1500;

/// Bytes read from plain text files before decoding.
const MAX_TEXT_BYTES: u64 = 64 * 1024;

/// Size limit for the DOCX document XML.
const MAX_DOCX_XML_BYTES: u64 = 8 * 1024 * 1024;

/// Time limit for one `pdftotext` or `exiftool` call.
const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

static RE_XML_PARAGRAPH_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</w:p>").expect("Failed to create regex pattern for paragraph end"));

static RE_XML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("Failed to create regex pattern for xml tags"));

/// Embedded image description and keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub artist: Option<String>,
}

impl ImageMetadata {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.keywords.is_empty() && self.artist.is_none()
    }

    /// Description and keywords as one lowercase string for term matching.
    #[must_use]
    pub fn searchable_text(&self) -> String {
        self.description
            .iter()
            .chain(self.keywords.iter())
            .map(|s| s.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Short summary for the AI prompt.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(description) = &self.description {
            parts.push(format!("description: {description}"));
        }
        if !self.keywords.is_empty() {
            parts.push(format!("keywords: {}", self.keywords.join(", ")));
        }
        if let Some(artist) = &self.artist {
            parts.push(format!("artist: {artist}"));
        }
        parts.join("; ")
    }
}

/// Extract up to [`MAX_EXCERPT_CHARS`] characters of text from a PDF, DOCX or TXT file.
pub async fn extract_text(path: &Path, extension: &str) -> Option<String> {
    let text = match extension {
        "pdf" => pdf_text(path).await,
        "docx" => {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || docx_text(&path)).await.ok().flatten()
        }
        "txt" => {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || plain_text(&path)).await.ok().flatten()
        }
        _ => None,
    }?;

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let excerpt = crate::truncate_chars(&collapsed, MAX_EXCERPT_CHARS);
    (!excerpt.is_empty()).then(|| excerpt.to_string())
}

/// First page text via `pdftotext`. Missing tool or unreadable PDF gives `None`.
async fn pdf_text(path: &Path) -> Option<String> {
    let mut command = Command::new("pdftotext");
    command.args(["-l", "1", "-q", "-enc", "UTF-8"]).arg(path).arg("-");
    let output = tool_output(command, TOOL_TIMEOUT).await?;
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Paragraph text from the `word/document.xml` entry.
fn docx_text(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut archive = zip::ZipArchive::new(file).ok()?;
    let entry = archive.by_name("word/document.xml").ok()?;
    let mut xml = String::new();
    entry.take(MAX_DOCX_XML_BYTES).read_to_string(&mut xml).ok()?;
    Some(xml_to_text(&xml))
}

fn xml_to_text(xml: &str) -> String {
    let with_breaks = RE_XML_PARAGRAPH_END.replace_all(xml, "\n");
    let stripped = RE_XML_TAG.replace_all(&with_breaks, "");
    stripped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// UTF-8 text, falling back to Windows-1252 for legacy files.
fn plain_text(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut bytes = Vec::new();
    file.take(MAX_TEXT_BYTES).read_to_end(&mut bytes).ok()?;
    Some(decode_text(bytes))
}

fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text.trim_start_matches('\u{feff}').to_string(),
        Err(error) => {
            let bytes = error.into_bytes();
            // A multibyte character may have been cut at the read limit.
            let (text, _, had_errors) = encoding_rs::UTF_8.decode(&bytes);
            if had_errors {
                encoding_rs::WINDOWS_1252.decode(&bytes).0.into_owned()
            } else {
                text.into_owned()
            }
        }
    }
}

/// Image description and keywords via `exiftool`. Missing tool or no metadata gives `None`.
pub async fn image_metadata(path: &Path) -> Option<ImageMetadata> {
    let mut command = Command::new("exiftool");
    command
        .args([
            "-j",
            "-q",
            "-ImageDescription",
            "-Keywords",
            "-XPKeywords",
            "-Subject",
            "-Artist",
        ])
        .arg(path);
    let output = tool_output(command, TOOL_TIMEOUT).await?;
    parse_exiftool_output(&output.stdout)
}

/// Run an external tool and collect its stdout.
///
/// A tool that fails to start, exits with an error or runs past the time limit gives `None`.
/// The child is killed when the limit is hit.
async fn tool_output(mut command: Command, limit: Duration) -> Option<Output> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = tokio::time::timeout(limit, command.output()).await.ok()?.ok()?;
    output.status.success().then_some(output)
}

/// Parse `exiftool -j` output for a single file.
fn parse_exiftool_output(stdout: &[u8]) -> Option<ImageMetadata> {
    let value: Value = serde_json::from_slice(stdout).ok()?;
    let object = value.as_array()?.first()?.as_object()?;

    let string_field = |name: &str| {
        object
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    };

    let mut keywords: Vec<String> = Vec::new();
    for name in ["Keywords", "XPKeywords", "Subject"] {
        match object.get(name) {
            Some(Value::Array(items)) => keywords.extend(items.iter().map(value_to_string)),
            Some(Value::String(text)) => keywords.extend(text.split([';', ',']).map(|s| s.trim().to_string())),
            Some(other @ Value::Number(_)) => keywords.push(value_to_string(other)),
            _ => {}
        }
    }
    keywords.retain(|keyword| !keyword.is_empty());
    keywords.dedup();

    let metadata = ImageMetadata {
        description: string_field("ImageDescription"),
        keywords,
        artist: string_field("Artist"),
    };
    (!metadata.is_empty()).then_some(metadata)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        other => other.to_string(),
    }
}
