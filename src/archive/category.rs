use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Image extensions recognised by the rule engine.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "tif", "tiff", "bmp"];

/// Video extensions recognised by the rule engine.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "wmv", "flv", "mpg", "mpeg", "webm"];

/// Audio extensions recognised by the rule engine.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aac", "ogg", "flac", "m4a"];

/// Document extensions that can yield a text excerpt.
pub const TEXT_EXTENSIONS: &[&str] = &["pdf", "docx", "txt"];

/// Image extensions that can carry EXIF description and keywords.
pub const EXIF_EXTENSIONS: &[&str] = &["jpg", "jpeg", "tif", "tiff"];

/// Archival categories. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Posters
    #[serde(rename = "AfficheS")]
    Affiches,
    /// Stills and photos
    #[serde(rename = "PhotoHD")]
    PhotoHd,
    /// Press kit
    #[serde(rename = "DossierDePresse")]
    DossierDePresse,
    /// Press coverage and reviews
    #[serde(rename = "RevueDePresse")]
    RevueDePresse,
    #[serde(rename = "DocumentsAdministratifs")]
    DocumentsAdministratifs,
    #[serde(rename = "Factures")]
    Factures,
    #[serde(rename = "Contrats")]
    Contrats,
    #[serde(rename = "Présentations")]
    Presentations,
    /// Audio and video
    #[serde(rename = "MédiasAV")]
    MediasAv,
    /// Catch-all
    #[serde(rename = "Divers")]
    Divers,
}

impl Category {
    pub const ALL: [Self; 10] = [
        Self::Affiches,
        Self::PhotoHd,
        Self::DossierDePresse,
        Self::RevueDePresse,
        Self::DocumentsAdministratifs,
        Self::Factures,
        Self::Contrats,
        Self::Presentations,
        Self::MediasAv,
        Self::Divers,
    ];

    /// Category name as used in destination folders, the audit log and AI answers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Affiches => "AfficheS",
            Self::PhotoHd => "PhotoHD",
            Self::DossierDePresse => "DossierDePresse",
            Self::RevueDePresse => "RevueDePresse",
            Self::DocumentsAdministratifs => "DocumentsAdministratifs",
            Self::Factures => "Factures",
            Self::Contrats => "Contrats",
            Self::Presentations => "Présentations",
            Self::MediasAv => "MédiasAV",
            Self::Divers => "Divers",
        }
    }

    /// Short description given to the AI classifier next to each name.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Affiches => "film posters",
            Self::PhotoHd => "set photos, portraits, high resolution promotional stills",
            Self::DossierDePresse => "press kit: press releases, synopsis, biographies",
            Self::RevueDePresse => "published press articles, reviews, interviews, quotes",
            Self::DocumentsAdministratifs => "internal documents, notes, memos",
            Self::Factures => "invoices, expense reports, payment documents",
            Self::Contrats => "contracts, legal agreements, licences",
            Self::Presentations => "slide decks",
            Self::MediasAv => "video or audio files: rushes, trailers, audio interviews",
            Self::Divers => "only when no other category fits",
        }
    }

    /// Numeric media label for the four primary media categories.
    #[must_use]
    pub const fn media_label(self) -> Option<&'static str> {
        match self {
            Self::Affiches => Some("1"),
            Self::PhotoHd => Some("2"),
            Self::DossierDePresse => Some("3"),
            Self::RevueDePresse => Some("4"),
            _ => None,
        }
    }

    /// True for the four primary media categories that carry a media label.
    #[must_use]
    pub const fn is_primary(self) -> bool {
        self.media_label().is_some()
    }

    /// Category implied by the extension alone when no keyword rule fires.
    #[must_use]
    pub fn default_for_extension(extension: &str) -> Self {
        if IMAGE_EXTENSIONS.contains(&extension) {
            Self::PhotoHd
        } else if VIDEO_EXTENSIONS.contains(&extension) || AUDIO_EXTENSIONS.contains(&extension) {
            Self::MediasAv
        } else if matches!(extension, "ppt" | "pptx" | "key") {
            Self::Presentations
        } else {
            Self::Divers
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Parse an exact category name.
    /// Surrounding whitespace, quotes and a trailing period are tolerated, nothing else.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim_end_matches('.');
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == trimmed)
            .ok_or_else(|| format!("Unknown category: {s}"))
    }
}

#[cfg(test)]
mod category_tests {
    use super::*;

    #[test]
    fn media_labels_cover_primary_categories() {
        assert_eq!(Category::Affiches.media_label(), Some("1"));
        assert_eq!(Category::PhotoHd.media_label(), Some("2"));
        assert_eq!(Category::DossierDePresse.media_label(), Some("3"));
        assert_eq!(Category::RevueDePresse.media_label(), Some("4"));
        let primary = Category::ALL.iter().filter(|c| c.is_primary()).count();
        assert_eq!(primary, 4);
    }

    #[test]
    fn parse_accepts_exact_names_only() {
        assert_eq!("AfficheS".parse::<Category>(), Ok(Category::Affiches));
        assert_eq!(" \"MédiasAV\".\n".parse::<Category>(), Ok(Category::MediasAv));
        assert_eq!("Présentations".parse::<Category>(), Ok(Category::Presentations));
        assert!("Photo HD".parse::<Category>().is_err());
        assert!("affiches".parse::<Category>().is_err());
        assert!("The answer is Factures".parse::<Category>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for category in Category::ALL {
            assert_eq!(category.to_string().parse::<Category>(), Ok(category));
        }
    }

    #[test]
    fn serde_uses_archive_names() {
        let json = serde_json::to_string(&Category::PhotoHd).unwrap();
        assert_eq!(json, "\"PhotoHD\"");
        let parsed: Category = serde_json::from_str("\"Présentations\"").unwrap();
        assert_eq!(parsed, Category::Presentations);
    }

    #[test]
    fn extension_defaults() {
        assert_eq!(Category::default_for_extension("jpg"), Category::PhotoHd);
        assert_eq!(Category::default_for_extension("mov"), Category::MediasAv);
        assert_eq!(Category::default_for_extension("wav"), Category::MediasAv);
        assert_eq!(Category::default_for_extension("pptx"), Category::Presentations);
        assert_eq!(Category::default_for_extension("pdf"), Category::Divers);
        assert_eq!(Category::default_for_extension("xlsx"), Category::Divers);
    }
}
