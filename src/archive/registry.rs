//! Canonical film registry loaded from a spreadsheet and an alternate-titles table.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use calamine::{Data, Reader, open_workbook_auto};

use crate::archive::normalize;
use crate::print_warning;

/// Rows scanned when looking for the header row.
const HEADER_SEARCH_ROWS: usize = 20;

/// Registry keys shorter than this are never used for substring matching.
pub const MIN_SUBSTRING_TITLE_LENGTH: usize = 4;

/// Alternate titles: lowercase canonical title to its known synonyms.
pub type AlternateTitles = BTreeMap<String, Vec<String>>;

/// One film from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilmRecord {
    pub id: String,
    pub canonical_title: String,
    pub alternate_titles: BTreeSet<String>,
}

/// Film id to title mapping plus a flat lookup of every registered title form.
#[derive(Debug, Default, Clone)]
pub struct FilmRegistry {
    records: BTreeMap<String, FilmRecord>,
    /// Lowercase title form to film id.
    titles: BTreeMap<String, String>,
    /// Normalized title form to film id.
    normalized_titles: BTreeMap<String, String>,
}

impl FilmRegistry {
    /// Load the registry spreadsheet and the alternate-titles table.
    ///
    /// Never fails: a missing or unreadable spreadsheet gives an empty registry,
    /// and every file association then ends up unknown.
    #[must_use]
    pub fn load(registry_path: Option<&Path>, alternate_titles_path: Option<&Path>) -> Self {
        let alternates = alternate_titles_path.map_or_else(default_alternate_titles, |path| {
            load_alternate_titles(path).unwrap_or_else(|error| {
                print_warning!("Using built-in alternate titles: {error:#}");
                default_alternate_titles()
            })
        });

        let Some(registry_path) = registry_path else {
            print_warning!("No film registry configured, all files will be filed under Inconnu");
            return Self::default();
        };

        match read_registry_rows(registry_path) {
            Ok(rows) => Self::from_entries(registry_entries(&rows), &alternates),
            Err(error) => {
                print_warning!("Failed to load film registry {}: {error:#}", registry_path.display());
                Self::default()
            }
        }
    }

    /// Build the registry from `(id, title)` pairs in file order.
    #[must_use]
    pub fn from_entries<I, S>(entries: I, alternates: &AlternateTitles) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut registry = Self::default();
        for (id, title) in entries {
            let id: String = id.into().trim().to_string();
            let title: String = title.into().trim().to_string();
            if id.is_empty() || title.is_empty() {
                continue;
            }
            registry.insert(id, title, alternates);
        }
        registry
    }

    fn insert(&mut self, id: String, title: String, alternates: &AlternateTitles) {
        let lower = title.to_lowercase();
        let prefix = title_before_bracket(&title);

        let mut alternate_titles = BTreeSet::new();
        for key in std::iter::once(lower.as_str()).chain(prefix.as_deref()) {
            if let Some(synonyms) = alternates.get(&key.to_lowercase()) {
                alternate_titles.extend(
                    synonyms
                        .iter()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty()),
                );
            }
        }

        let mut keys = vec![title.clone(), lower];
        keys.extend(prefix);
        keys.extend(alternate_titles.iter().cloned());
        for key in keys {
            self.register_key(&key, &id);
        }

        self.records.entry(id.clone()).or_insert(FilmRecord {
            id,
            canonical_title: title,
            alternate_titles,
        });
    }

    /// Earlier ids keep their keys when a later film has the same title.
    fn register_key(&mut self, key: &str, id: &str) {
        let lower = key.trim().to_lowercase();
        if lower.is_empty() {
            return;
        }
        let normalized = normalize::normalize(&lower);
        if !normalized.is_empty() {
            self.normalized_titles
                .entry(normalized)
                .or_insert_with(|| id.to_string());
        }
        self.titles.entry(lower).or_insert_with(|| id.to_string());
    }

    /// Film id for a title, case-insensitively, falling back to accent and punctuation insensitive comparison.
    #[must_use]
    pub fn lookup_exact(&self, title: &str) -> Option<&str> {
        let lower = title.trim().to_lowercase();
        if lower.is_empty() {
            return None;
        }
        self.titles
            .get(&lower)
            .or_else(|| self.normalized_titles.get(&normalize::normalize(&lower)))
            .map(String::as_str)
    }

    /// All registered lowercase title forms with their film id.
    pub fn title_keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.titles.iter().map(|(title, id)| (title.as_str(), id.as_str()))
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&FilmRecord> {
        self.records.get(id)
    }

    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Canonical title for a film id.
    #[must_use]
    pub fn canonical_title(&self, id: &str) -> Option<&str> {
        self.records.get(id).map(|record| record.canonical_title.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Read all rows of the first sheet as trimmed strings.
///
/// `.csv` files go through the csv reader, everything else through the spreadsheet reader.
fn read_registry_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    if !path.is_file() {
        anyhow::bail!("File does not exist");
    }
    let extension = crate::path_to_file_extension_string(path);
    if extension == "csv" {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        return reader
            .records()
            .map(|record| {
                record
                    .map(|row| row.iter().map(|cell| cell.trim().to_string()).collect())
                    .context("Failed to read CSV row")
            })
            .collect();
    }

    let mut workbook = open_workbook_auto(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .context("Workbook has no sheets")?
        .context("Failed to read first sheet")?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Int(value) => value.to_string(),
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => format!("{value:.0}"),
        Data::Float(value) => value.to_string(),
        Data::String(value) => value.trim().to_string(),
        Data::Bool(value) => value.to_string(),
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

/// Extract `(id, title)` pairs, locating the header row if there is one.
///
/// The header row is the first row containing an `ID` cell and a `Titre` or `Title` cell.
/// Without it, the id is read from the first column and the title from the second.
fn registry_entries(rows: &[Vec<String>]) -> Vec<(String, String)> {
    let header = rows
        .iter()
        .take(HEADER_SEARCH_ROWS)
        .enumerate()
        .find_map(|(index, row)| {
            let id_column = row.iter().position(|cell| cell.trim().eq_ignore_ascii_case("id"))?;
            let title_column = row.iter().position(|cell| {
                let cell = cell.trim().to_lowercase();
                cell == "titre" || cell == "title"
            })?;
            Some((index, id_column, title_column))
        });

    let (data_start, id_column, title_column) = header.map_or((0, 0, 1), |(index, id, title)| (index + 1, id, title));

    rows.iter()
        .skip(data_start)
        .filter_map(|row| {
            let id = row.get(id_column)?.trim();
            let title = row.get(title_column)?.trim();
            (!id.is_empty() && !title.is_empty()).then(|| (id.to_string(), title.to_string()))
        })
        .collect()
}

/// Text before the first bracket or parenthesis, if any remains.
fn title_before_bracket(title: &str) -> Option<String> {
    let index = title.find(['(', '['])?;
    let prefix = title[..index].trim();
    (!prefix.is_empty()).then(|| prefix.to_string())
}

/// Read the alternate-titles JSON table, creating it with the built-in defaults if missing.
///
/// # Errors
/// Returns an error if the file exists but is not a valid table, or cannot be created.
pub fn load_alternate_titles(path: &Path) -> Result<AlternateTitles> {
    if !path.exists() {
        let defaults = default_alternate_titles();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&defaults)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        return Ok(defaults);
    }

    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let table: AlternateTitles =
        serde_json::from_str(&content).with_context(|| format!("Invalid alternate titles in {}", path.display()))?;

    Ok(table
        .into_iter()
        .map(|(title, synonyms)| (title.trim().to_lowercase(), synonyms))
        .collect())
}

/// French release titles for the Chaplin catalog.
#[must_use]
pub fn default_alternate_titles() -> AlternateTitles {
    [
        ("the kid", "Le Kid"),
        ("the gold rush", "La Ruée vers l'or"),
        ("city lights", "Les Lumières de la ville"),
        ("modern times", "Les Temps modernes"),
        ("the great dictator", "Le Dictateur"),
        ("limelight", "Les Feux de la rampe"),
        ("the circus", "Le Cirque"),
        ("a king in new york", "Un roi à New York"),
    ]
    .into_iter()
    .map(|(title, alternate)| (title.to_string(), vec![alternate.to_string()]))
    .collect()
}
