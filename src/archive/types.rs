use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::category::Category;

/// A regular file found under the source root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileTask {
    /// Absolute path to the source file.
    pub source_path: PathBuf,
    /// Lowercase extension without the dot, empty if the file has none.
    pub extension: String,
    pub size_bytes: u64,
}

/// How a folder was associated with a film.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
    ContentHeuristic,
    Ai,
    None,
}

/// Where a film id came from. Ids are never generated, so the registry is the only source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdSource {
    Registry,
}

/// The result of matching one folder against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderAssociation {
    pub folder_path: PathBuf,
    pub film_id: Option<String>,
    pub match_method: MatchMethod,
    pub source: Option<IdSource>,
}

/// Whether a folder represents a single film.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderVerdict {
    /// The folder belongs to the registry film with this id.
    Film { film_id: String, method: MatchMethod },
    /// The folder is confirmed not to be a single film (collection, admin, press...).
    NotFilm,
    /// Nothing conclusive.
    Unknown,
}

/// Which stage of the categorization cascade produced the final category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceSource {
    Cache,
    Rules,
    Content,
    Ai,
}

/// Category and film for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub film_id: Option<String>,
    pub confidence_source: ConfidenceSource,
}

/// Outcome status written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    Success,
    Ignored,
    Error,
    CriticalError,
}

/// One audit log row. Exactly one is written for every file task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub timestamp: String,
    pub original_path: PathBuf,
    pub status: Status,
    pub film_id: Option<String>,
    pub film_name: Option<String>,
    pub category: Option<Category>,
    pub new_path: Option<PathBuf>,
    pub reason: Option<String>,
}

/// Why a file was excluded before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    Pattern(String),
    NoExtension,
    InvalidExtension(String),
}

impl FileTask {
    pub fn new(source_path: PathBuf, size_bytes: u64) -> Self {
        let extension = crate::path_to_file_extension_string(&source_path);
        Self {
            source_path,
            extension,
            size_bytes,
        }
    }

    /// File name with special characters composed.
    #[must_use]
    pub fn file_name(&self) -> String {
        crate::path_to_filename_string(&self.source_path)
    }

    /// Path relative to the source root, lowercased, for keyword and title matching.
    #[must_use]
    pub fn relative_path_lower(&self, source_root: &Path) -> String {
        crate::get_relative_path_or_filename(&self.source_path, source_root).to_lowercase()
    }
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Ignored => "ignored",
            Self::Error => "error",
            Self::CriticalError => "critical_error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exact => "exact",
            Self::Fuzzy => "fuzzy",
            Self::ContentHeuristic => "content-heuristic",
            Self::Ai => "ai",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(pattern) => write!(f, "Ignored pattern ({pattern})"),
            Self::NoExtension => f.write_str("No extension"),
            Self::InvalidExtension(extension) => write!(f, "Invalid extension (.{extension})"),
        }
    }
}

impl AuditRecord {
    /// A record with only the path and status filled in, timestamped now.
    #[must_use]
    pub fn new(original_path: &Path, status: Status) -> Self {
        Self {
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            original_path: original_path.to_path_buf(),
            status,
            film_id: None,
            film_name: None,
            category: None,
            new_path: None,
            reason: None,
        }
    }

    #[must_use]
    pub fn ignored(original_path: &Path, reason: &IgnoreReason) -> Self {
        Self {
            reason: Some(reason.to_string()),
            ..Self::new(original_path, Status::Ignored)
        }
    }

    #[must_use]
    pub fn critical(original_path: &Path, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::new(original_path, Status::CriticalError)
        }
    }
}

impl FolderAssociation {
    /// Build the association for a folder from its verdict.
    #[must_use]
    pub fn from_verdict(folder_path: PathBuf, verdict: &FolderVerdict) -> Self {
        match verdict {
            FolderVerdict::Film { film_id, method } => Self {
                folder_path,
                film_id: Some(film_id.clone()),
                match_method: *method,
                source: Some(IdSource::Registry),
            },
            FolderVerdict::NotFilm | FolderVerdict::Unknown => Self {
                folder_path,
                film_id: None,
                match_method: MatchMethod::None,
                source: None,
            },
        }
    }
}
