//! Folder to film detection.
//!
//! Every directory under the source root is matched against the registry once,
//! before any file is processed. Associations do not nest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use itertools::Itertools;
use walkdir::WalkDir;

use crate::archive::ai::{AiClassifier, FolderRequest};
use crate::archive::cache::DecisionCache;
use crate::archive::normalize;
use crate::archive::registry::FilmRegistry;
use crate::archive::types::{FolderAssociation, FolderVerdict, MatchMethod};
use crate::{print_bold, print_warning};

/// Subfolder names inspected by the content heuristic and sent to the AI classifier.
const SAMPLE_SIZE: usize = 5;

/// Distinct media tokens needed in the sampled subfolders before a word-overlap match is tried.
const MIN_MEDIA_TOKENS: usize = 2;

/// Fraction of a title's significant words that must appear in the folder name.
const MIN_WORD_OVERLAP: f64 = 0.5;

/// Subfolder name fragments typical of a single film's material.
const MEDIA_TOKENS: &[&str] = &[
    "affiche",
    "poster",
    "photo",
    "still",
    "trailer",
    "bande annonce",
    "dossier de presse",
    "press kit",
    "pressbook",
    "revue de presse",
    "press",
    "making of",
    "hd",
];

/// Folder name fragments that mark a folder as something other than a single film.
const NON_FILM_INDICATORS: &[&str] = &[
    "collection",
    "archives",
    "bonus",
    "resources",
    "brochure",
    "press",
    "marketing",
    "communication",
    "inventaire",
    "inventory",
    "logos",
    "certificates",
    "music cue",
    "contracts",
    "factures",
    "invoices",
    "presentations",
    "documents",
    "administratifs",
    "revue de presse",
    "press coverage",
    "general",
    "divers",
    "various",
];

/// Folder associations for one source tree.
#[derive(Debug, Default, Clone)]
pub struct FolderIndex {
    folders: BTreeMap<PathBuf, String>,
    names: BTreeMap<String, String>,
    associations: Vec<FolderAssociation>,
}

/// Walks the source tree and associates folders with registry films.
pub struct FolderFilmDetector<'a> {
    registry: &'a FilmRegistry,
    cache: &'a Mutex<DecisionCache>,
    ai: Option<&'a AiClassifier>,
    fuzzy_threshold: f64,
    ignore_patterns: &'a [String],
    abort_flag: Option<&'a AtomicBool>,
    verbose: bool,
}

impl FolderIndex {
    /// Film id associated directly with this folder.
    #[must_use]
    pub fn film_for(&self, folder: &Path) -> Option<&str> {
        self.folders.get(folder).map(String::as_str)
    }

    /// Canonical name of a film that has at least one associated folder.
    #[must_use]
    pub fn film_name(&self, film_id: &str) -> Option<&str> {
        self.names.get(film_id).map(String::as_str)
    }

    /// Associations in processing order.
    #[must_use]
    pub fn associations(&self) -> &[FolderAssociation] {
        &self.associations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.folders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// True if the folder or one of its ancestors is associated.
    fn covers(&self, folder: &Path) -> bool {
        folder.ancestors().any(|ancestor| self.folders.contains_key(ancestor))
    }

    /// True if a folder below this one is already associated.
    fn has_associated_descendant(&self, folder: &Path) -> bool {
        self.folders
            .range(folder.to_path_buf()..)
            .skip_while(|(path, _)| path.as_path() == folder)
            .take_while(|(path, _)| path.starts_with(folder))
            .next()
            .is_some()
    }

    fn insert(&mut self, association: FolderAssociation, film_name: &str) {
        if let Some(film_id) = &association.film_id {
            self.folders.insert(association.folder_path.clone(), film_id.clone());
            self.names
                .entry(film_id.clone())
                .or_insert_with(|| film_name.to_string());
        }
        self.associations.push(association);
    }
}

impl<'a> FolderFilmDetector<'a> {
    #[must_use]
    pub const fn new(
        registry: &'a FilmRegistry,
        cache: &'a Mutex<DecisionCache>,
        ai: Option<&'a AiClassifier>,
        fuzzy_threshold: f64,
        ignore_patterns: &'a [String],
        verbose: bool,
    ) -> Self {
        Self {
            registry,
            cache,
            ai,
            fuzzy_threshold,
            ignore_patterns,
            abort_flag: None,
            verbose,
        }
    }

    /// Stop detection early once the flag is set.
    #[must_use]
    pub const fn with_abort_flag(mut self, abort_flag: &'a AtomicBool) -> Self {
        self.abort_flag = Some(abort_flag);
        self
    }

    /// Associate every folder under `root` with a film where possible.
    ///
    /// `YYYY - Title` folders are processed first, then everything else, shallow before deep.
    /// Folders under `exclude` are skipped.
    pub async fn detect(&self, root: &Path, exclude: Option<&Path>) -> FolderIndex {
        let mut index = FolderIndex::default();
        if self.registry.is_empty() {
            return index;
        }

        for folder in self.ordered_folders(root, exclude) {
            if self.abort_flag.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                print_warning!("Folder detection interrupted");
                break;
            }
            if index.covers(&folder) || index.has_associated_descendant(&folder) {
                continue;
            }
            let verdict = self.evaluate(&folder).await;
            if let FolderVerdict::Film { film_id, method } = &verdict {
                let film_name = self.registry.canonical_title(film_id).unwrap_or(film_id);
                if self.verbose {
                    println!(
                        "{} -> {film_name} ({film_id}, {method})",
                        crate::get_relative_path_or_filename(&folder, root)
                    );
                }
                index.insert(FolderAssociation::from_verdict(folder, &verdict), film_name);
            }
        }

        if self.verbose {
            let films = index.folders.values().unique().count();
            print_bold!("Associated {} folders with {films} films", index.len());
        }
        index
    }

    fn ordered_folders(&self, root: &Path, exclude: Option<&Path>) -> Vec<PathBuf> {
        let (year_folders, other_folders): (Vec<_>, Vec<_>) = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.file_type().is_dir()
                    && !exclude.is_some_and(|excluded| entry.path().starts_with(excluded))
                    && !self.is_ignored_name(&crate::os_str_to_string(entry.file_name()))
            })
            .filter_map(Result::ok)
            .map(|entry| (entry.depth(), entry.into_path()))
            .partition(|(_, path)| normalize::has_year_prefix(&crate::path_to_filename_string(path)));

        year_folders
            .into_iter()
            .sorted()
            .chain(other_folders.into_iter().sorted())
            .map(|(_, path)| path)
            .collect()
    }

    fn is_ignored_name(&self, name: &str) -> bool {
        self.ignore_patterns.iter().any(|pattern| name.contains(pattern.as_str()))
    }

    /// Decide whether a single folder is a film.
    ///
    /// Exact match, fuzzy match, non-film indicators, content heuristic and finally the AI classifier,
    /// stopping at the first conclusive step.
    pub async fn evaluate(&self, folder: &Path) -> FolderVerdict {
        if let Some(verdict) = self.cached_verdict(folder) {
            return verdict;
        }

        let name = crate::path_to_filename_string(folder);
        let title = normalize::strip_year_prefix(&name);

        let verdict = if let Some(film_id) = self.exact_match(&name, title) {
            FolderVerdict::Film {
                film_id,
                method: MatchMethod::Exact,
            }
        } else if let Some(film_id) = self.fuzzy_match(title) {
            FolderVerdict::Film {
                film_id,
                method: MatchMethod::Fuzzy,
            }
        } else if is_non_film_name(&name) {
            FolderVerdict::NotFilm
        } else if let Some(film_id) = self.content_heuristic(folder, title) {
            FolderVerdict::Film {
                film_id,
                method: MatchMethod::ContentHeuristic,
            }
        } else {
            self.ask_ai(folder, &name, title).await
        };

        self.store(folder, &verdict);
        verdict
    }

    /// Cached verdict, ignoring film ids that are no longer in the registry.
    fn cached_verdict(&self, folder: &Path) -> Option<FolderVerdict> {
        let cached = self.cache.lock().ok()?.folder(folder)?;
        match &cached {
            FolderVerdict::Film { film_id, .. } if !self.registry.contains_id(film_id) => None,
            _ => Some(cached),
        }
    }

    fn store(&self, folder: &Path, verdict: &FolderVerdict) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.set_folder(folder, verdict);
        }
    }

    fn exact_match(&self, name: &str, title: &str) -> Option<String> {
        self.registry
            .lookup_exact(name)
            .or_else(|| self.registry.lookup_exact(title))
            .map(ToString::to_string)
    }

    /// Best scoring registry title at or above the folder threshold.
    fn fuzzy_match(&self, title: &str) -> Option<String> {
        let mut best: Option<(f64, &str)> = None;
        for (key, film_id) in self.registry.title_keys() {
            let score = normalize::similarity(title, key);
            if score >= self.fuzzy_threshold && best.is_none_or(|(best_score, _)| score > best_score) {
                best = Some((score, film_id));
            }
        }
        best.map(|(_, film_id)| film_id.to_string())
    }

    /// Registry title sharing most significant words with the folder name.
    fn word_overlap_match(&self, title: &str) -> Option<String> {
        let mut best: Option<(f64, &str)> = None;
        for (key, film_id) in self.registry.title_keys() {
            let overlap = normalize::word_overlap(key, title);
            if overlap >= MIN_WORD_OVERLAP && best.is_none_or(|(best_overlap, _)| overlap > best_overlap) {
                best = Some((overlap, film_id));
            }
        }
        best.map(|(_, film_id)| film_id.to_string())
    }

    /// Subfolders that look like one film's material allow a looser title match.
    fn content_heuristic(&self, folder: &Path, title: &str) -> Option<String> {
        let subfolders = sample_entries(folder, true);
        let tokens = subfolders
            .iter()
            .flat_map(|name| {
                let name = name.to_lowercase();
                MEDIA_TOKENS
                    .iter()
                    .filter(move |token| normalize::contains_term(&name, token))
                    .copied()
                    .collect::<Vec<_>>()
            })
            .unique()
            .count();

        if tokens < MIN_MEDIA_TOKENS {
            return None;
        }
        self.word_overlap_match(title)
    }

    /// A FILM answer still needs a registry match, a NON_FILM answer is final.
    async fn ask_ai(&self, folder: &Path, name: &str, title: &str) -> FolderVerdict {
        let Some(ai) = self.ai else {
            return FolderVerdict::Unknown;
        };
        let request = FolderRequest {
            folder_name: name.to_string(),
            sample_subdirs: sample_entries(folder, true),
            sample_files: sample_entries(folder, false),
        };
        let verdict = match ai.classify_folder(&request).await {
            Some(true) => self.word_overlap_match(title).map_or(FolderVerdict::Unknown, |film_id| {
                FolderVerdict::Film {
                    film_id,
                    method: MatchMethod::Ai,
                }
            }),
            Some(false) => FolderVerdict::NotFilm,
            None => FolderVerdict::Unknown,
        };

        if verdict != FolderVerdict::Unknown
            && let Ok(mut cache) = self.cache.lock()
        {
            cache.set_folder(folder, &verdict);
            if let Err(error) = cache.save() {
                print_warning!("Failed to save decision cache: {error:#}");
            }
        }
        verdict
    }
}

fn is_non_film_name(name: &str) -> bool {
    let normalized = normalize::normalize(name);
    NON_FILM_INDICATORS
        .iter()
        .any(|indicator| normalized.contains(indicator))
}

/// Up to [`SAMPLE_SIZE`] sorted names of subfolders or files directly inside the folder.
fn sample_entries(folder: &Path, directories: bool) -> Vec<String> {
    let Ok(entries) = fs::read_dir(folder) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|file_type| file_type.is_dir() == directories))
        .map(|entry| crate::os_str_to_string(&entry.file_name()))
        .filter(|name| !name.starts_with('.'))
        .sorted()
        .take(SAMPLE_SIZE)
        .collect()
}
