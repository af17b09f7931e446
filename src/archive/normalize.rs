//! Title normalization and similarity scoring.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;
use unicode_segmentation::UnicodeSegmentation;

static RE_YEAR_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:19|20)\d{2}\s*-\s*").expect("Failed to create regex pattern for year prefix"));

/// Words ignored when comparing titles word by word.
const STOPWORDS: &[&str] = &[
    "the", "and", "les", "des", "une", "for", "with", "von", "der", "die", "das", "del", "los", "las", "aux",
];

/// Minimum length of a word that counts in a bag-of-words comparison.
const MIN_WORD_LENGTH: usize = 3;

/// Terms up to this length only match between letter or digit boundaries.
const SHORT_TERM_LENGTH: usize = 3;

/// True if the name follows the `YYYY - Title` convention.
#[must_use]
pub fn has_year_prefix(name: &str) -> bool {
    RE_YEAR_PREFIX.is_match(name)
}

/// Remove a leading `YYYY - ` from the name.
///
/// ```rust
/// use film_archive::archive::normalize::strip_year_prefix;
///
/// assert_eq!(strip_year_prefix("1921 - The Kid"), "The Kid");
/// assert_eq!(strip_year_prefix("2003-Dogville"), "Dogville");
/// assert_eq!(strip_year_prefix("The Kid"), "The Kid");
/// ```
#[must_use]
pub fn strip_year_prefix(name: &str) -> &str {
    RE_YEAR_PREFIX
        .find(name)
        .map_or(name, |prefix| name[prefix.end()..].trim_end())
}

/// Lowercase, strip accents, replace punctuation with spaces and collapse whitespace.
///
/// ```rust
/// use film_archive::archive::normalize::normalize;
///
/// assert_eq!(normalize("La Ruée vers l'or"), "la ruee vers l or");
/// assert_eq!(normalize("  The_Great   DICTATOR! "), "the great dictator");
/// ```
#[must_use]
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity of two strings in the range 0..=100 after normalization.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b) * 100.0
}

/// Best similarity of the shorter string against any equally long window of the longer one.
///
/// Scores 100 when the shorter string appears verbatim inside the longer one.
#[must_use]
pub fn partial_similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    if long.contains(&short) {
        return 100.0;
    }

    let long_chars: Vec<char> = long.chars().collect();
    let window = short.chars().count();
    long_chars
        .windows(window)
        .map(|slice| {
            let candidate: String = slice.iter().collect();
            strsim::normalized_levenshtein(&short, &candidate)
        })
        .fold(0.0_f64, f64::max)
        * 100.0
}

/// Significant words of a title: normalized, at least three letters long and not a stopword.
#[must_use]
pub fn significant_words(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    normalized
        .unicode_words()
        .filter(|word| word.chars().count() >= MIN_WORD_LENGTH && !STOPWORDS.contains(word))
        .map(ToString::to_string)
        .collect()
}

/// Fraction of the title's significant words that appear in the candidate text.
///
/// Returns zero when the title has no significant words.
#[must_use]
pub fn word_overlap(title: &str, candidate: &str) -> f64 {
    let title_words = significant_words(title);
    if title_words.is_empty() {
        return 0.0;
    }
    let normalized = normalize(candidate);
    let candidate_words: HashSet<&str> = normalized.unicode_words().collect();
    let present = title_words
        .iter()
        .filter(|word| candidate_words.contains(word.as_str()))
        .count();

    present as f64 / title_words.len() as f64
}

/// Case-sensitive term search where short terms must stand alone between non-alphanumeric characters.
///
/// Callers pass lowercase text and terms.
///
/// ```rust
/// use film_archive::archive::normalize::contains_term;
///
/// assert!(contains_term("signed nda.pdf", "nda"));
/// assert!(!contains_term("agenda.pdf", "nda"));
/// assert!(contains_term("movie_poster_final.jpg", "poster"));
/// ```
#[must_use]
pub fn contains_term(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    if term.chars().count() > SHORT_TERM_LENGTH {
        return text.contains(term);
    }
    text.match_indices(term).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
