//! Orchestrates a full archiving run.
//!
//! Builds the folder index once, then processes every file under the source root in fixed-size
//! concurrent batches. Each file produces exactly one audit record, whatever happens to it.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use crate::archive::ai::AiClassifier;
use crate::archive::associator::FilmAssociator;
use crate::archive::audit::AuditLogger;
use crate::archive::cache::DecisionCache;
use crate::archive::classifier::{FileCategorizer, FileContext};
use crate::archive::config::{Config, DisambiguationRule};
use crate::archive::detector::{FolderFilmDetector, FolderIndex};
use crate::archive::mover::FileMover;
use crate::archive::registry::FilmRegistry;
use crate::archive::report;
use crate::archive::stats::RunStats;
use crate::archive::types::{AuditRecord, Classification, FileTask, IgnoreReason, Status};
use crate::{print_bold, print_error, print_warning};

const PROGRESS_BAR_CHARS: &str = "=>-";
const PROGRESS_BAR_TEMPLATE: &str = "[{elapsed_precise}] {bar:80.magenta/blue} {pos}/{len} {percent}%";

/// Reason recorded for files left unprocessed after an interrupt.
pub const INTERRUPTED_REASON: &str = "Interrupted before processing";

/// Reason recorded for planned copies in dry run mode.
pub const DRY_RUN_REASON: &str = "Dry run";

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Copied (or planned, in dry run mode) to the destination tree.
    Archived {
        classification: Classification,
        film_name: Option<String>,
        new_path: PathBuf,
    },
    /// Excluded before any classification.
    Ignored(IgnoreReason),
    /// Could not be copied.
    Failed {
        classification: Option<Classification>,
        film_name: Option<String>,
        reason: String,
    },
}

/// Result of a complete run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stats: RunStats,
    /// One record per file found, in completion order.
    pub records: Vec<AuditRecord>,
    /// Number of folders associated with a film.
    pub associated_folders: usize,
    pub aborted: bool,
    pub log_path: PathBuf,
}

/// Archiving run over one source tree.
pub struct Archiver {
    config: Config,
    ai: Option<AiClassifier>,
    abort_flag: Arc<AtomicBool>,
}

/// State shared by all file tasks of a run.
struct RunContext {
    source_root: PathBuf,
    registry: FilmRegistry,
    index: FolderIndex,
    cache: Mutex<DecisionCache>,
    categorizer: FileCategorizer,
    mover: FileMover,
    logger: AuditLogger,
    extensions: Vec<String>,
    ignore_patterns: Vec<String>,
    file_fuzzy_threshold: f64,
    disambiguation: Vec<DisambiguationRule>,
    dryrun: bool,
    verbose: bool,
    debug: bool,
}

impl FileOutcome {
    /// Audit record for this outcome.
    #[must_use]
    pub fn into_record(self, original_path: &Path, dryrun: bool) -> AuditRecord {
        match self {
            Self::Archived {
                classification,
                film_name,
                new_path,
            } => AuditRecord {
                film_id: classification.film_id,
                film_name,
                category: Some(classification.category),
                new_path: Some(new_path),
                reason: dryrun.then(|| DRY_RUN_REASON.to_string()),
                ..AuditRecord::new(original_path, Status::Success)
            },
            Self::Ignored(reason) => AuditRecord::ignored(original_path, &reason),
            Self::Failed {
                classification,
                film_name,
                reason,
            } => AuditRecord {
                film_id: classification.as_ref().and_then(|c| c.film_id.clone()),
                film_name,
                category: classification.map(|c| c.category),
                reason: Some(reason),
                ..AuditRecord::new(original_path, Status::Error)
            },
        }
    }
}

impl Archiver {
    /// Create a run for the given config. The AI classifier is built from the config.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let ai = AiClassifier::from_config(&config.ai);
        Self {
            config,
            ai,
            abort_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the AI classifier.
    #[must_use]
    pub fn with_ai_classifier(mut self, ai: Option<AiClassifier>) -> Self {
        self.ai = ai;
        self
    }

    /// Use an externally controlled abort flag, for example one set from a Ctrl+C handler.
    #[must_use]
    pub fn with_abort_flag(mut self, abort_flag: Arc<AtomicBool>) -> Self {
        self.abort_flag = abort_flag;
        self
    }

    /// Run the whole pipeline.
    ///
    /// # Errors
    /// Fails only before any file is processed: unreadable source root,
    /// destination that cannot be created, or audit log that cannot be created.
    pub async fn run(&self) -> Result<RunOutcome> {
        let start = Instant::now();
        let source_root = crate::resolve_input_path(Some(&self.config.source))?;
        if !source_root.is_dir() {
            anyhow::bail!("Source is not a directory: {}", source_root.display());
        }
        let destination = crate::resolve_output_dir(&self.config.destination)?;
        if !self.config.dryrun {
            std::fs::create_dir_all(&destination)
                .with_context(|| format!("Failed to create destination: {}", destination.display()))?;
        }
        let destination = if destination.exists() {
            dunce::canonicalize(&destination)?
        } else {
            destination
        };
        if destination == source_root {
            anyhow::bail!("Destination must differ from the source: {}", destination.display());
        }
        let logger = AuditLogger::create(&self.config.log)?;

        if self.config.verbose {
            println!("{}", self.config);
        }
        if self.config.dryrun {
            print_bold!("Dry run: no files will be copied");
        }

        let registry = FilmRegistry::load(self.config.registry.as_deref(), self.config.alternate_titles.as_deref());
        if registry.is_empty() {
            print_warning!("Film registry is empty, every file will be filed as unknown");
        } else if self.config.verbose {
            println!("Loaded {} films from the registry", registry.len());
        }

        let cache = Mutex::new(DecisionCache::load(self.config.cache.as_deref()));
        let index = FolderFilmDetector::new(
            &registry,
            &cache,
            self.ai.as_ref(),
            self.config.folder_fuzzy_threshold,
            &self.config.ignore_patterns,
            self.config.verbose,
        )
        .with_abort_flag(&self.abort_flag)
        .detect(&source_root, Some(destination.as_path()))
        .await;

        let skip = [Some(logger.path().to_path_buf()), self.config.cache.clone()];
        let tasks = collect_files(&source_root, &destination, &skip);
        if self.config.verbose {
            println!("Found {} files", tasks.len());
        }

        let associated_folders = index.len();
        let context = Arc::new(RunContext {
            source_root,
            registry,
            index,
            cache,
            categorizer: FileCategorizer::new(self.ai.clone()),
            mover: FileMover::new(destination, self.config.dryrun),
            logger,
            extensions: self.config.extensions.clone(),
            ignore_patterns: self.config.ignore_patterns.clone(),
            file_fuzzy_threshold: self.config.file_fuzzy_threshold,
            disambiguation: self.config.disambiguation.clone(),
            dryrun: self.config.dryrun,
            verbose: self.config.verbose,
            debug: self.config.debug,
        });

        let (records, aborted) = self.process_batches(&context, tasks).await?;
        if aborted {
            println!("\n{}", "Aborted by user".bold().red());
        }

        if let Ok(mut cache) = context.cache.lock()
            && let Err(error) = cache.save()
        {
            print_error!("Failed to save decision cache: {error:#}");
        }

        let mut stats = RunStats::default();
        for record in &records {
            stats.add_record(record);
        }
        stats.add_folders(&context.index, &context.source_root);
        stats.duration = start.elapsed();

        if let Some(report_path) = &self.config.report {
            match report::write_report(&stats, report_path) {
                Ok(()) => println!("Report written to {}", report_path.display()),
                Err(error) => print_error!("{error:#}"),
            }
        }

        Ok(RunOutcome {
            stats,
            records,
            associated_folders,
            aborted,
            log_path: context.logger.path().to_path_buf(),
        })
    }

    /// Process files batch by batch. Files in a batch run concurrently.
    async fn process_batches(&self, context: &Arc<RunContext>, tasks: Vec<FileTask>) -> Result<(Vec<AuditRecord>, bool)> {
        let progress_bar = Arc::new(if self.config.verbose || self.config.debug {
            ProgressBar::hidden()
        } else {
            let progress_bar = ProgressBar::new(tasks.len() as u64);
            progress_bar.set_style(
                ProgressStyle::default_bar()
                    .template(PROGRESS_BAR_TEMPLATE)?
                    .progress_chars(PROGRESS_BAR_CHARS),
            );
            progress_bar
        });

        let mut records = Vec::with_capacity(tasks.len());
        let mut aborted = false;
        for batch in tasks.chunks(self.config.batch_size.max(1)) {
            if !aborted && self.abort_flag.load(Ordering::SeqCst) {
                aborted = true;
            }
            if aborted {
                for task in batch {
                    let record = AuditRecord {
                        reason: Some(INTERRUPTED_REASON.to_string()),
                        ..AuditRecord::new(&task.source_path, Status::Error)
                    };
                    context.logger.log_or_warn(&record);
                    records.push(record);
                }
                continue;
            }

            let handles: Vec<_> = batch
                .iter()
                .cloned()
                .map(|task| {
                    let context = Arc::clone(context);
                    let progress = Arc::clone(&progress_bar);
                    tokio::spawn(async move {
                        let path = task.source_path.clone();
                        let record = match process_file(&context, task).await {
                            Ok(outcome) => outcome.into_record(&path, context.dryrun),
                            Err(error) => AuditRecord::critical(&path, format!("{error:#}")),
                        };
                        context.logger.log_or_warn(&record);
                        progress.inc(1);
                        record
                    })
                })
                .collect();

            let results = futures::future::join_all(handles).await;
            for (task, result) in batch.iter().zip(results) {
                let record = result.unwrap_or_else(|error| {
                    let record = AuditRecord::critical(&task.source_path, format!("File task failed: {error}"));
                    context.logger.log_or_warn(&record);
                    progress_bar.inc(1);
                    record
                });
                context.print_record(&record);
                records.push(record);
            }
        }

        progress_bar.finish_and_clear();
        Ok((records, aborted))
    }
}

impl RunContext {
    fn print_record(&self, record: &AuditRecord) {
        let relative = crate::get_relative_path_or_filename(&record.original_path, &self.source_root);
        match record.status {
            Status::Success if self.verbose || self.debug => {
                let new_path = record.new_path.as_deref().map_or_else(String::new, |path| {
                    crate::get_relative_path_or_filename(path, self.mover.destination_root())
                });
                println!("{} -> {}", relative, new_path.green());
            }
            Status::Ignored if self.debug => {
                println!("{}: {}", relative, record.reason.as_deref().unwrap_or_default().yellow());
            }
            Status::Error | Status::CriticalError => {
                print_error!("{relative}: {}", record.reason.as_deref().unwrap_or_default());
            }
            _ => {}
        }
    }

    fn associator(&self) -> FilmAssociator<'_> {
        FilmAssociator::new(
            &self.registry,
            &self.index,
            &self.source_root,
            self.file_fuzzy_threshold,
            &self.disambiguation,
        )
    }
}

/// Ignore filter, categorization, film association and copy for one file.
async fn process_file(context: &Arc<RunContext>, task: FileTask) -> Result<FileOutcome> {
    if let Some(reason) = ignore_reason(&task, &context.source_root, &context.extensions, &context.ignore_patterns) {
        return Ok(FileOutcome::Ignored(reason));
    }
    if !task.source_path.is_file() {
        return Ok(FileOutcome::Failed {
            classification: None,
            film_name: None,
            reason: "File no longer exists".to_string(),
        });
    }

    let file = FileContext::new(&task, &context.source_root);
    let (category, confidence_source) = context.categorizer.categorize(&file, &context.cache).await;
    let film_id = context.associator().associate(&file);
    let film_name = film_id
        .as_deref()
        .and_then(|id| context.registry.canonical_title(id))
        .map(ToString::to_string);
    let classification = Classification {
        category,
        film_id,
        confidence_source,
    };
    if context.debug {
        println!(
            "{}: {category} ({confidence_source:?}), film {}",
            file.relative_path,
            film_name.as_deref().unwrap_or("-")
        );
    }

    let mover_context = Arc::clone(context);
    let source = task.source_path;
    let film = classification.film_id.clone().zip(film_name.clone());
    let placed = tokio::task::spawn_blocking(move || {
        let film = film.as_ref().map(|(id, name)| (id.as_str(), name.as_str()));
        mover_context.mover.place(&source, film, category)
    })
    .await
    .context("File copy task failed")?;

    Ok(match placed {
        Ok(new_path) => FileOutcome::Archived {
            classification,
            film_name,
            new_path,
        },
        Err(error) => FileOutcome::Failed {
            classification: Some(classification),
            film_name,
            reason: format!("Copy failed: {error:#}"),
        },
    })
}

/// Why a file should be skipped, if at all.
///
/// Patterns are matched against every component of the path below the source root,
/// so files inside ignored folders are skipped too.
#[must_use]
pub fn ignore_reason(
    task: &FileTask,
    source_root: &Path,
    extensions: &[String],
    ignore_patterns: &[String],
) -> Option<IgnoreReason> {
    let relative = task.source_path.strip_prefix(source_root).unwrap_or(&task.source_path);
    let components: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(crate::os_str_to_string(name)),
            _ => None,
        })
        .collect();

    if let Some(pattern) = ignore_patterns
        .iter()
        .find(|pattern| components.iter().any(|name| name.contains(pattern.as_str())))
    {
        return Some(IgnoreReason::Pattern(pattern.clone()));
    }
    if task.extension.is_empty() {
        return Some(IgnoreReason::NoExtension);
    }
    if !extensions.contains(&task.extension) {
        return Some(IgnoreReason::InvalidExtension(task.extension.clone()));
    }
    None
}

/// Every regular file under the source root, excluding the destination tree and run artifacts.
fn collect_files(source_root: &Path, destination: &Path, skip: &[Option<PathBuf>]) -> Vec<FileTask> {
    let mut files: Vec<FileTask> = WalkDir::new(source_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !entry.path().starts_with(destination))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                print_warning!("Failed to read directory entry: {error}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| !skip.iter().flatten().any(|path| path == entry.path()))
        .map(|entry| {
            let size = entry.metadata().map(|metadata| metadata.len()).unwrap_or_default();
            FileTask::new(entry.into_path(), size)
        })
        .collect();

    files.sort();
    files
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files: {} archived, {} ignored, {} errors, {} critical errors",
            self.stats.total,
            self.stats.success,
            self.stats.ignored,
            self.stats.errors,
            self.stats.critical_errors
        )
    }
}

#[cfg(test)]
mod engine_tests {
    use super::*;

    use std::fs;

    use tempfile::tempdir;

    use crate::archive::category::Category;
    use crate::archive::config::DEFAULT_EXTENSIONS;
    use crate::archive::types::ConfidenceSource;

    fn extensions() -> Vec<String> {
        DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect()
    }

    fn patterns() -> Vec<String> {
        vec![".DS_Store".to_string(), "._".to_string(), "__MACOSX".to_string()]
    }

    fn reason(root: &Path, relative: &str) -> Option<IgnoreReason> {
        let task = FileTask::new(root.join(relative), 0);
        ignore_reason(&task, root, &extensions(), &patterns())
    }

    #[test]
    fn ignore_filter_reasons() {
        let root = Path::new("/archive");
        assert_eq!(
            reason(root, "The Kid/.DS_Store"),
            Some(IgnoreReason::Pattern(".DS_Store".to_string()))
        );
        assert_eq!(
            reason(root, "The Kid/._poster.jpg"),
            Some(IgnoreReason::Pattern("._".to_string()))
        );
        assert_eq!(
            reason(root, "__MACOSX/The Kid/poster.jpg"),
            Some(IgnoreReason::Pattern("__MACOSX".to_string()))
        );
        assert_eq!(reason(root, "The Kid/README"), Some(IgnoreReason::NoExtension));
        assert_eq!(
            reason(root, "The Kid/setup.EXE"),
            Some(IgnoreReason::InvalidExtension("exe".to_string()))
        );
        assert_eq!(reason(root, "The Kid/poster.JPG"), None);
    }

    #[test]
    fn source_root_name_does_not_trigger_ignore() {
        let root = Path::new("/backups/__MACOSX_export");
        assert_eq!(reason(root, "poster.jpg"), None);
    }

    #[test]
    fn archived_outcome_record() {
        let outcome = FileOutcome::Archived {
            classification: Classification {
                category: Category::Affiches,
                film_id: Some("100".to_string()),
                confidence_source: ConfidenceSource::Rules,
            },
            film_name: Some("The Kid".to_string()),
            new_path: PathBuf::from("/sorted/The Kid/1_100/poster1.jpg"),
        };
        let record = outcome.clone().into_record(Path::new("/src/poster1.jpg"), false);
        assert_eq!(record.status, Status::Success);
        assert_eq!(record.film_id.as_deref(), Some("100"));
        assert_eq!(record.category, Some(Category::Affiches));
        assert_eq!(record.reason, None);

        let dry = outcome.into_record(Path::new("/src/poster1.jpg"), true);
        assert_eq!(dry.reason.as_deref(), Some(DRY_RUN_REASON));
    }

    #[test]
    fn failed_outcome_record() {
        let record = FileOutcome::Failed {
            classification: None,
            film_name: None,
            reason: "Copy failed".to_string(),
        }
        .into_record(Path::new("/src/a.pdf"), false);
        assert_eq!(record.status, Status::Error);
        assert_eq!(record.category, None);
        assert_eq!(record.reason.as_deref(), Some("Copy failed"));
    }

    #[test]
    fn collect_skips_destination_and_artifacts() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("The Kid")).unwrap();
        fs::create_dir_all(root.join("Sorted/The Kid/1_100")).unwrap();
        fs::write(root.join("The Kid/poster.jpg"), "a").unwrap();
        fs::write(root.join("Sorted/The Kid/1_100/poster.jpg"), "a").unwrap();
        fs::write(root.join("audit.csv"), "").unwrap();

        let files = collect_files(root, &root.join("Sorted"), &[Some(root.join("audit.csv")), None]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].source_path, root.join("The Kid/poster.jpg"));
        assert_eq!(files[0].size_bytes, 1);
    }

    #[tokio::test]
    async fn abort_flag_marks_files_interrupted() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir_all(&source).unwrap();
        for index in 0..3 {
            fs::write(source.join(format!("note{index}.txt")), "x").unwrap();
        }

        let config = Config::with_defaults(source, dir.path().join("Sorted"));
        let abort_flag = Arc::new(AtomicBool::new(true));
        let outcome = Archiver::new(config).with_abort_flag(abort_flag).run().await.unwrap();

        assert!(outcome.aborted);
        assert_eq!(outcome.records.len(), 3);
        assert!(outcome
            .records
            .iter()
            .all(|record| record.status == Status::Error && record.reason.as_deref() == Some(INTERRUPTED_REASON)));
        assert!(!dir.path().join("Sorted/Inconnu").exists());
    }

    #[tokio::test]
    async fn destination_equal_to_source_is_rejected() {
        let dir = tempdir().unwrap();
        let config = Config::with_defaults(dir.path().to_path_buf(), dir.path().to_path_buf());
        assert!(Archiver::new(config).run().await.is_err());
    }
}
