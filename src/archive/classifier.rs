//! File categorization cascade.
//!
//! Stages run in order: keyword rules, content signals, AI classifier.
//! Each stage either decides the category or defers to the next one.
//! The final category is cached per absolute path.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use futures::future::BoxFuture;
use unicode_normalization::UnicodeNormalization;

use crate::archive::ai::{AiClassifier, FileRequest};
use crate::archive::cache::DecisionCache;
use crate::archive::category::{Category, EXIF_EXTENSIONS, IMAGE_EXTENSIONS, TEXT_EXTENSIONS};
use crate::archive::extract::{self, ImageMetadata};
use crate::archive::normalize::contains_term;
use crate::archive::types::{ConfidenceSource, FileTask};
use crate::print_warning;

/// Keyword rule: any keyword in the name or path, and an allowed extension.
struct KeywordRule {
    category: Category,
    keywords: &'static [&'static str],
    extensions: &'static [&'static str],
}

/// Primary media rules, checked first. A match decides the category, except a photo
/// match, which image metadata may still turn into a poster.
const PRIMARY_RULES: &[KeywordRule] = &[
    KeywordRule {
        category: Category::Affiches,
        keywords: &["affiche", "poster", "aff", "movie poster"],
        extensions: &["jpg", "jpeg", "png", "tif", "tiff", "gif", "bmp", "pdf"],
    },
    KeywordRule {
        category: Category::DossierDePresse,
        keywords: &["dossier de presse", "press kit", "presskit", "pressbook", "dp"],
        extensions: &["pdf", "doc", "docx", "zip", "rar"],
    },
    KeywordRule {
        category: Category::RevueDePresse,
        keywords: &[
            "revue de presse",
            "press review",
            "article",
            "critique",
            "review",
            "clipping",
            "quote",
            "citation",
        ],
        extensions: &["pdf", "doc", "docx", "jpg", "jpeg", "png", "txt"],
    },
    KeywordRule {
        category: Category::PhotoHd,
        keywords: &["photo", "image", "still", "hd", "highres", "high res", "scene"],
        extensions: IMAGE_EXTENSIONS,
    },
];

/// Secondary rules. A match sets a tentative category that later stages may refine.
const SECONDARY_RULES: &[KeywordRule] = &[
    KeywordRule {
        category: Category::Factures,
        keywords: &["facture", "invoice", "billing"],
        extensions: &["pdf", "xlsx", "xls", "doc", "docx", "csv"],
    },
    KeywordRule {
        category: Category::Contrats,
        keywords: &["contrat", "contract", "agreement", "nda"],
        extensions: &["pdf", "doc", "docx"],
    },
    KeywordRule {
        category: Category::Presentations,
        keywords: &["présentation", "presentation", "slides", "deck"],
        extensions: &["pptx", "ppt", "pdf", "key"],
    },
    KeywordRule {
        category: Category::DocumentsAdministratifs,
        keywords: &["administratif", "admin", "legal", "document"],
        extensions: &["pdf", "doc", "docx", "txt", "xls", "xlsx"],
    },
];

/// Phrases searched in extracted document text, in priority order.
const CONTENT_PHRASES: &[(Category, &[&str])] = &[
    (Category::Factures, &["facture", "invoice"]),
    (Category::Contrats, &["contrat", "agreement", "contract"]),
    (
        Category::DossierDePresse,
        &["dossier de presse", "press kit", "communiqué de presse", "communique de presse", "press release"],
    ),
    (Category::RevueDePresse, &["revue de presse", "critique", "article paru", "review"]),
    (Category::Presentations, &["présentation", "presentation", "slides"]),
];

/// Terms in image metadata that mark a poster.
const POSTER_METADATA_TERMS: &[&str] = &["affiche", "poster"];

/// What the cascade knows about one file.
#[derive(Debug, Clone)]
pub struct FileContext {
    pub source_path: PathBuf,
    pub extension: String,
    /// Lowercase file name.
    pub file_name: String,
    /// Lowercase path relative to the source root.
    pub relative_path: String,
}

/// Tentative result and signals gathered while the cascade runs.
#[derive(Debug, Clone)]
pub struct CascadeState {
    pub category: Category,
    pub source: ConfidenceSource,
    pub excerpt: Option<String>,
    pub metadata: Option<ImageMetadata>,
}

/// Stage outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Decide(Category),
    Defer,
}

/// One stage of the categorization cascade.
pub trait Classifier: Send + Sync {
    /// Source recorded when this stage decides.
    fn source(&self) -> ConfidenceSource;

    fn classify<'a>(&'a self, file: &'a FileContext, state: &'a mut CascadeState) -> BoxFuture<'a, Verdict>;
}

/// Filename and path keyword rules with extension defaults.
pub struct RuleBased;

/// Text excerpts from documents and image metadata.
pub struct ContentHeuristic;

/// Last resort for files without a primary category.
pub struct AiAssisted {
    ai: AiClassifier,
}

/// Ordered chain of classifiers.
pub struct FileCategorizer {
    stages: Vec<Box<dyn Classifier>>,
}

impl FileContext {
    #[must_use]
    pub fn new(task: &FileTask, source_root: &Path) -> Self {
        Self {
            source_path: task.source_path.clone(),
            extension: task.extension.clone(),
            file_name: task.file_name().to_lowercase(),
            relative_path: task.relative_path_lower(source_root).nfc().collect(),
        }
    }

    fn mentions(&self, keyword: &str) -> bool {
        contains_term(&self.file_name, keyword) || contains_term(&self.relative_path, keyword)
    }
}

impl Default for CascadeState {
    fn default() -> Self {
        Self {
            category: Category::Divers,
            source: ConfidenceSource::Rules,
            excerpt: None,
            metadata: None,
        }
    }
}

impl KeywordRule {
    fn matches(&self, file: &FileContext) -> bool {
        self.extensions.contains(&file.extension.as_str())
            && self.keywords.iter().any(|keyword| file.mentions(keyword))
    }
}

impl RuleBased {
    /// Category from rules alone, and whether it is final.
    #[must_use]
    pub fn categorize(file: &FileContext) -> (Category, bool) {
        if let Some(rule) = PRIMARY_RULES.iter().find(|rule| rule.matches(file)) {
            return (rule.category, rule.category != Category::PhotoHd);
        }
        if let Some(rule) = SECONDARY_RULES.iter().find(|rule| rule.matches(file)) {
            return (rule.category, false);
        }
        (Category::default_for_extension(&file.extension), false)
    }
}

impl Classifier for RuleBased {
    fn source(&self) -> ConfidenceSource {
        ConfidenceSource::Rules
    }

    fn classify<'a>(&'a self, file: &'a FileContext, state: &'a mut CascadeState) -> BoxFuture<'a, Verdict> {
        Box::pin(async move {
            let (category, is_final) = Self::categorize(file);
            if is_final {
                return Verdict::Decide(category);
            }
            state.category = category;
            state.source = ConfidenceSource::Rules;
            Verdict::Defer
        })
    }
}

impl ContentHeuristic {
    fn category_from_text(text: &str) -> Option<Category> {
        let text = text.to_lowercase();
        CONTENT_PHRASES
            .iter()
            .find(|(_, phrases)| phrases.iter().any(|phrase| text.contains(phrase)))
            .map(|(category, _)| *category)
    }
}

impl Classifier for ContentHeuristic {
    fn source(&self) -> ConfidenceSource {
        ConfidenceSource::Content
    }

    fn classify<'a>(&'a self, file: &'a FileContext, state: &'a mut CascadeState) -> BoxFuture<'a, Verdict> {
        Box::pin(async move {
            let extension = file.extension.as_str();

            if state.category == Category::Divers && TEXT_EXTENSIONS.contains(&extension) {
                state.excerpt = extract::extract_text(&file.source_path, extension).await;
                if let Some(category) = state.excerpt.as_deref().and_then(Self::category_from_text) {
                    if category.is_primary() {
                        return Verdict::Decide(category);
                    }
                    state.category = category;
                    state.source = ConfidenceSource::Content;
                }
            }

            if matches!(state.category, Category::PhotoHd | Category::Divers) && EXIF_EXTENSIONS.contains(&extension) {
                state.metadata = extract::image_metadata(&file.source_path).await;
                if let Some(metadata) = &state.metadata {
                    let text = metadata.searchable_text();
                    if POSTER_METADATA_TERMS.iter().any(|term| text.contains(term)) {
                        return Verdict::Decide(Category::Affiches);
                    }
                }
            }

            Verdict::Defer
        })
    }
}

impl AiAssisted {
    #[must_use]
    pub const fn new(ai: AiClassifier) -> Self {
        Self { ai }
    }
}

impl Classifier for AiAssisted {
    fn source(&self) -> ConfidenceSource {
        ConfidenceSource::Ai
    }

    fn classify<'a>(&'a self, file: &'a FileContext, state: &'a mut CascadeState) -> BoxFuture<'a, Verdict> {
        Box::pin(async move {
            if state.category.is_primary() {
                return Verdict::Defer;
            }
            let request = FileRequest {
                file_name: &file.file_name,
                relative_path: &file.relative_path,
                extension: &file.extension,
                excerpt: state.excerpt.as_deref(),
                metadata: state.metadata.as_ref().map(ImageMetadata::summary),
            };
            self.ai
                .classify_file(&request)
                .await
                .map_or(Verdict::Defer, Verdict::Decide)
        })
    }
}

impl FileCategorizer {
    /// Rules and content stages, plus the AI stage when a classifier is available.
    #[must_use]
    pub fn new(ai: Option<AiClassifier>) -> Self {
        let mut stages: Vec<Box<dyn Classifier>> = vec![Box::new(RuleBased), Box::new(ContentHeuristic)];
        if let Some(ai) = ai {
            stages.push(Box::new(AiAssisted::new(ai)));
        }
        Self { stages }
    }

    /// Category for a file. A cached category skips the cascade entirely.
    pub async fn categorize(&self, file: &FileContext, cache: &Mutex<DecisionCache>) -> (Category, ConfidenceSource) {
        if let Some(category) = cache.lock().ok().and_then(|cache| cache.category(&file.source_path)) {
            return (category, ConfidenceSource::Cache);
        }

        let mut state = CascadeState::default();
        let mut decision = None;
        for stage in &self.stages {
            if let Verdict::Decide(category) = stage.classify(file, &mut state).await {
                decision = Some((category, stage.source()));
                break;
            }
        }
        let (category, source) = decision.unwrap_or((state.category, state.source));

        if let Ok(mut cache) = cache.lock() {
            cache.set_category(&file.source_path, category);
            if source == ConfidenceSource::Ai
                && let Err(error) = cache.save()
            {
                print_warning!("Failed to save decision cache: {error:#}");
            }
        }
        (category, source)
    }
}
