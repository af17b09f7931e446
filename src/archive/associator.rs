//! File to film association.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;

use crate::archive::classifier::FileContext;
use crate::archive::config::DisambiguationRule;
use crate::archive::detector::FolderIndex;
use crate::archive::normalize::{self, contains_term};
use crate::archive::registry::{FilmRegistry, MIN_SUBSTRING_TITLE_LENGTH};

/// Files already named with the archive convention: `<media label>_<film id>_...`
static RE_ARCHIVE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[1-4]_(?P<id>[^_]+)_").expect("Failed to create regex pattern for archive file names")
});

/// Resolves the film a file belongs to.
pub struct FilmAssociator<'a> {
    registry: &'a FilmRegistry,
    index: &'a FolderIndex,
    source_root: &'a Path,
    fuzzy_threshold: f64,
    /// Film id to required lowercase keywords.
    guards: HashMap<String, Vec<String>>,
}

impl<'a> FilmAssociator<'a> {
    #[must_use]
    pub fn new(
        registry: &'a FilmRegistry,
        index: &'a FolderIndex,
        source_root: &'a Path,
        fuzzy_threshold: f64,
        rules: &[DisambiguationRule],
    ) -> Self {
        let mut guards: HashMap<String, Vec<String>> = HashMap::new();
        for rule in rules {
            guards.entry(rule.film_id.trim().to_string()).or_default().extend(
                rule.keywords
                    .iter()
                    .map(|keyword| keyword.trim().to_lowercase())
                    .filter(|keyword| !keyword.is_empty()),
            );
        }
        Self {
            registry,
            index,
            source_root,
            fuzzy_threshold,
            guards,
        }
    }

    /// Film id for a file, or `None` when nothing trustworthy matches.
    ///
    /// Tries the folder index, the archive naming convention, registry titles contained in the name or path,
    /// and finally fuzzy title matching on the name and then the path.
    /// Candidates rejected by a disambiguation guard are skipped.
    #[must_use]
    pub fn associate(&self, file: &FileContext) -> Option<String> {
        self.from_folder_index(file)
            .or_else(|| self.from_archive_name(file))
            .or_else(|| self.from_contained_title(file))
            .or_else(|| self.from_fuzzy_title(file, &file.file_name))
            .or_else(|| self.from_fuzzy_title(file, &file.relative_path))
            .map(ToString::to_string)
    }

    /// A guarded id is only accepted when one of its keywords appears in the file name or path.
    #[must_use]
    pub fn guard_accepts(&self, film_id: &str, file: &FileContext) -> bool {
        self.guards.get(film_id).is_none_or(|keywords| {
            keywords.iter().any(|keyword| {
                contains_term(&file.file_name, keyword) || contains_term(&file.relative_path, keyword)
            })
        })
    }

    fn accept<'b>(&self, film_id: &'b str, file: &FileContext) -> Option<&'b str> {
        (self.registry.contains_id(film_id) && self.guard_accepts(film_id, file)).then_some(film_id)
    }

    fn from_folder_index(&self, file: &FileContext) -> Option<&'a str> {
        let parent = file.source_path.parent()?;
        let film_id = parent
            .ancestors()
            .take_while(|ancestor| ancestor.starts_with(self.source_root) && *ancestor != self.source_root)
            .find_map(|ancestor| self.index.film_for(ancestor))?;
        self.accept(film_id, file)
    }

    fn from_archive_name(&self, file: &FileContext) -> Option<&'a str> {
        let captures = RE_ARCHIVE_NAME.captures(&file.file_name)?;
        let id = captures.name("id")?.as_str();
        let record = self.registry.get(id)?;
        self.accept(record.id.as_str(), file)
    }

    /// Longest registry title contained in the file name or relative path.
    fn from_contained_title(&self, file: &FileContext) -> Option<&'a str> {
        self.registry
            .title_keys()
            .filter(|(title, _)| title.chars().count() >= MIN_SUBSTRING_TITLE_LENGTH)
            .filter(|(title, _)| file.file_name.contains(title) || file.relative_path.contains(title))
            .sorted_by_key(|(title, _)| std::cmp::Reverse(title.chars().count()))
            .find_map(|(_, film_id)| self.accept(film_id, file))
    }

    /// Best fuzzy title match in the given text at or above the file threshold.
    fn from_fuzzy_title(&self, file: &FileContext, text: &str) -> Option<&'a str> {
        let text_length = normalize::normalize(text).chars().count();
        self.registry
            .title_keys()
            .filter(|(title, _)| {
                let length = normalize::normalize(title).chars().count();
                length >= MIN_SUBSTRING_TITLE_LENGTH && length <= text_length
            })
            .map(|(title, film_id)| (normalize::partial_similarity(title, text), film_id))
            .filter(|(score, _)| *score >= self.fuzzy_threshold)
            .sorted_by(|a, b| b.0.total_cmp(&a.0))
            .find_map(|(_, film_id)| self.accept(film_id, file))
    }
}

#[cfg(test)]
mod associator_tests {
    use super::*;

    use std::path::PathBuf;
    use std::sync::Mutex;

    use tempfile::tempdir;

    use crate::archive::cache::DecisionCache;
    use crate::archive::detector::FolderFilmDetector;
    use crate::archive::registry::{AlternateTitles, default_alternate_titles};
    use crate::archive::types::FileTask;

    fn registry() -> FilmRegistry {
        FilmRegistry::from_entries(
            [
                ("100", "The Kid"),
                ("101", "City Lights"),
                ("102", "Modern Times"),
                ("205", "Police"),
                ("206", "The Circus"),
            ],
            &default_alternate_titles(),
        )
    }

    fn context(root: &Path, relative: &str) -> FileContext {
        FileContext::new(&FileTask::new(root.join(relative), 0), root)
    }

    fn police_guard() -> Vec<DisambiguationRule> {
        vec![DisambiguationRule {
            film_id: "205".to_string(),
            keywords: vec!["1916".to_string(), "Essanay".to_string()],
        }]
    }

    #[tokio::test]
    async fn folder_index_supplies_film() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("1921 - The Kid/Posters")).unwrap();
        let registry = registry();
        let cache = Mutex::new(DecisionCache::default());
        let index = FolderFilmDetector::new(&registry, &cache, None, 90.0, &[], false)
            .detect(dir.path(), None)
            .await;
        let associator = FilmAssociator::new(&registry, &index, dir.path(), 95.0, &[]);

        let file = context(dir.path(), "1921 - The Kid/Posters/scan_01.jpg");
        assert_eq!(associator.associate(&file), Some("100".to_string()));
    }

    #[test]
    fn archive_naming_convention() {
        let registry = registry();
        let index = FolderIndex::default();
        let root = PathBuf::from("/archive");
        let associator = FilmAssociator::new(&registry, &index, &root, 95.0, &[]);

        assert_eq!(associator.associate(&context(&root, "misc/2_102_still.jpg")), Some("102".to_string()));
        assert_eq!(associator.associate(&context(&root, "misc/2_999_still.jpg")), None);
    }

    #[test]
    fn contained_title_prefers_longest() {
        let registry = FilmRegistry::from_entries(
            [("1", "Lights"), ("2", "City Lights")],
            &AlternateTitles::new(),
        );
        let index = FolderIndex::default();
        let root = PathBuf::from("/archive");
        let associator = FilmAssociator::new(&registry, &index, &root, 95.0, &[]);

        let file = context(&root, "press/city lights review.pdf");
        assert_eq!(associator.associate(&file), Some("2".to_string()));
    }

    #[test]
    fn alternate_titles_are_matched() {
        let registry = registry();
        let index = FolderIndex::default();
        let root = PathBuf::from("/archive");
        let associator = FilmAssociator::new(&registry, &index, &root, 95.0, &[]);

        let file = context(&root, "Affiches/Les Temps modernes - affiche.jpg");
        assert_eq!(associator.associate(&file), Some("102".to_string()));
    }

    #[test]
    fn fuzzy_match_on_name() {
        let registry = registry();
        let index = FolderIndex::default();
        let root = PathBuf::from("/archive");
        let associator = FilmAssociator::new(&registry, &index, &root, 95.0, &[]);

        let file = context(&root, "scans/city_lights_poster.jpg");
        assert_eq!(associator.associate(&file), Some("101".to_string()));
    }

    #[test]
    fn source_root_name_is_not_matched() {
        let registry = registry();
        let index = FolderIndex::default();
        let root = PathBuf::from("/archive/Modern Times");
        let associator = FilmAssociator::new(&registry, &index, &root, 95.0, &[]);

        assert_eq!(associator.associate(&context(&root, "misc/scan.jpg")), None);
    }

    #[test]
    fn guard_accepts_with_keyword() {
        let registry = registry();
        let index = FolderIndex::default();
        let root = PathBuf::from("/archive");
        let rules = police_guard();
        let associator = FilmAssociator::new(&registry, &index, &root, 95.0, &rules);

        let file = context(&root, "Essanay/police_still_01.jpg");
        assert_eq!(associator.associate(&file), Some("205".to_string()));
    }

    #[test]
    fn guard_rejects_without_keyword() {
        let registry = registry();
        let index = FolderIndex::default();
        let root = PathBuf::from("/archive");
        let rules = police_guard();
        let associator = FilmAssociator::new(&registry, &index, &root, 95.0, &rules);

        let file = context(&root, "Admin/police_report_scan.jpg");
        assert_eq!(associator.associate(&file), None);
    }

    #[test]
    fn rejected_candidate_falls_through_to_next() {
        let registry = registry();
        let index = FolderIndex::default();
        let root = PathBuf::from("/archive");
        let rules = vec![DisambiguationRule {
            film_id: "102".to_string(),
            keywords: vec!["1936".to_string()],
        }];
        let associator = FilmAssociator::new(&registry, &index, &root, 95.0, &rules);

        // "modern times" is the longest contained title but lacks its keyword.
        let file = context(&root, "Modern Times/the circus still.jpg");
        assert_eq!(associator.associate(&file), Some("206".to_string()));
    }

    #[tokio::test]
    async fn guard_applies_to_folder_index() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Police")).unwrap();
        let registry = registry();
        let cache = Mutex::new(DecisionCache::default());
        let index = FolderFilmDetector::new(&registry, &cache, None, 90.0, &[], false)
            .detect(dir.path(), None)
            .await;
        assert_eq!(index.film_for(&dir.path().join("Police")), Some("205"));

        let rules = police_guard();
        let associator = FilmAssociator::new(&registry, &index, dir.path(), 95.0, &rules);
        assert_eq!(associator.associate(&context(dir.path(), "Police/report.pdf")), None);
        assert_eq!(
            associator.associate(&context(dir.path(), "Police/police 1916 still.jpg")),
            Some("205".to_string())
        );
    }
}
