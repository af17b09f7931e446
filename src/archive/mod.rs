//! Film media classification and archiving.
//!
//! A run associates folders and files of an unstructured source tree with films from a registry,
//! assigns every file one of a fixed set of archival categories, copies it into a deterministic
//! destination layout, and writes one audit record per file.

pub mod ai;
pub mod associator;
pub mod audit;
pub mod cache;
pub mod category;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod engine;
pub mod extract;
pub mod mover;
pub mod normalize;
pub mod registry;
pub mod report;
pub mod stats;
pub mod types;

pub use ai::{AiClassifier, CompletionBackend};
pub use associator::FilmAssociator;
pub use audit::AuditLogger;
pub use cache::DecisionCache;
pub use category::Category;
pub use classifier::FileCategorizer;
pub use config::{ArchiveConfig, Config, DisambiguationRule};
pub use detector::{FolderFilmDetector, FolderIndex};
pub use engine::{Archiver, FileOutcome, RunOutcome};
pub use mover::FileMover;
pub use registry::{FilmRecord, FilmRegistry};
pub use stats::{AssociatedFolder, RunStats};
pub use types::{AuditRecord, FolderVerdict, Status};
