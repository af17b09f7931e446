//! Configuration for archive runs.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use itertools::Itertools;
use serde::Deserialize;

/// File extensions processed when no allow-list is configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "tif", "tiff", "bmp", "pdf", "docx", "doc", "pptx", "ppt", "xlsx", "xls", "txt", "mp4",
    "mov", "avi", "mp3", "wav",
];

/// Path fragments that always exclude a file: OS artifacts and VCS metadata.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[".DS_Store", "._", ".git", "__MACOSX", "Thumbs.db", ".tmp"];

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_FOLDER_FUZZY_THRESHOLD: f64 = 90.0;
const DEFAULT_FILE_FUZZY_THRESHOLD: f64 = 95.0;
const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_AI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_AI_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_AI_TIMEOUT_SECS: u64 = 20;

/// A film id that is only accepted when one of the keywords appears in the file path or name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DisambiguationRule {
    pub film_id: String,
    pub keywords: Vec<String>,
}

/// AI collaborator settings from the `[archive.ai]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default = "default_ai_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
}

/// Config from the user config file.
#[derive(Debug, Default, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub alternate_titles: Option<PathBuf>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub cache: Option<PathBuf>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub destination: Option<PathBuf>,
    #[serde(default)]
    pub disambiguation: Vec<DisambiguationRule>,
    #[serde(default)]
    pub dryrun: bool,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub file_fuzzy_threshold: Option<f64>,
    #[serde(default)]
    pub folder_fuzzy_threshold: Option<f64>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub log: Option<PathBuf>,
    #[serde(default)]
    pub registry: Option<PathBuf>,
    #[serde(default)]
    pub report: Option<PathBuf>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub ai: AiConfig,
}

/// Wrapper needed for parsing the config section.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    archive: ArchiveConfig,
}

/// Final config created from CLI arguments and user config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub registry: Option<PathBuf>,
    pub alternate_titles: Option<PathBuf>,
    pub cache: Option<PathBuf>,
    pub log: PathBuf,
    pub report: Option<PathBuf>,
    pub batch_size: usize,
    /// Lowercase extensions without the leading dot.
    pub extensions: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub folder_fuzzy_threshold: f64,
    pub file_fuzzy_threshold: f64,
    pub disambiguation: Vec<DisambiguationRule>,
    pub ai: AiConfig,
    pub debug: bool,
    pub dryrun: bool,
    pub verbose: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_ai_model(),
            base_url: default_ai_base_url(),
            api_key_env: default_ai_api_key_env(),
            timeout_secs: DEFAULT_AI_TIMEOUT_SECS,
        }
    }
}

impl ArchiveConfig {
    /// Try to read user config from the file if it exists.
    /// Otherwise, fall back to default config.
    ///
    /// # Errors
    /// Returns an error if config file exists but cannot be read or parsed.
    pub fn get_user_config() -> Result<Self> {
        let Some(path) = crate::config::CONFIG_PATH.as_deref() else {
            return Ok(Self::default());
        };

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse config file {}:\n{e}", path.display())),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {error}",
                path.display()
            )),
        }
    }

    /// Parse config from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML string is invalid.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str::<UserConfig>(toml_str)
            .map(|config| config.archive)
            .with_context(|| "Failed to parse config TOML")
    }
}

impl Config {
    /// Build a config for the given source root from user config values,
    /// filling in defaults for everything left unset.
    ///
    /// # Errors
    /// Returns an error if the destination or log path cannot be resolved.
    pub fn from_user_config(source: PathBuf, user_config: ArchiveConfig) -> Result<Self> {
        let destination = match user_config.destination {
            Some(path) => crate::resolve_output_dir(&path)?,
            None => default_destination(&source),
        };
        let log = match user_config.log {
            Some(path) => crate::resolve_output_dir(&path)?,
            None => default_log_path()?,
        };
        let extensions = if user_config.extensions.is_empty() {
            DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect()
        } else {
            normalize_extensions(user_config.extensions)
        };
        let ignore_patterns = DEFAULT_IGNORE_PATTERNS
            .iter()
            .map(ToString::to_string)
            .chain(user_config.ignore_patterns)
            .filter(|pattern| !pattern.trim().is_empty())
            .unique()
            .collect();

        Ok(Self {
            source,
            destination,
            registry: user_config.registry,
            alternate_titles: user_config
                .alternate_titles
                .or_else(|| crate::config::ALTERNATE_TITLES_PATH.clone()),
            cache: user_config.cache.or_else(|| crate::config::CACHE_PATH.clone()),
            log,
            report: user_config.report,
            batch_size: user_config.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1),
            extensions,
            ignore_patterns,
            folder_fuzzy_threshold: user_config
                .folder_fuzzy_threshold
                .unwrap_or(DEFAULT_FOLDER_FUZZY_THRESHOLD),
            file_fuzzy_threshold: user_config.file_fuzzy_threshold.unwrap_or(DEFAULT_FILE_FUZZY_THRESHOLD),
            disambiguation: user_config.disambiguation,
            ai: user_config.ai,
            debug: user_config.debug,
            dryrun: user_config.dryrun,
            verbose: user_config.verbose,
        })
    }

    /// Config with defaults only, writing all run artifacts under the given destination.
    ///
    /// No user config file is read, which keeps the result independent of the machine.
    #[must_use]
    pub fn with_defaults(source: PathBuf, destination: PathBuf) -> Self {
        let log = destination.join("audit.csv");
        let cache = destination.join("decisions.json");
        Self {
            source,
            destination,
            registry: None,
            alternate_titles: None,
            cache: Some(cache),
            log,
            report: None,
            batch_size: DEFAULT_BATCH_SIZE,
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(ToString::to_string).collect(),
            folder_fuzzy_threshold: DEFAULT_FOLDER_FUZZY_THRESHOLD,
            file_fuzzy_threshold: DEFAULT_FILE_FUZZY_THRESHOLD,
            disambiguation: Vec::new(),
            ai: AiConfig::default(),
            debug: false,
            dryrun: false,
            verbose: false,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let optional = |path: Option<&PathBuf>| path.map_or_else(|| "-".to_string(), |p| p.display().to_string());
        writeln!(f, "Config:")?;
        writeln!(f, "  source:      {}", self.source.display())?;
        writeln!(f, "  destination: {}", self.destination.display())?;
        writeln!(f, "  registry:    {}", optional(self.registry.as_ref()))?;
        writeln!(f, "  titles:      {}", optional(self.alternate_titles.as_ref()))?;
        writeln!(f, "  cache:       {}", optional(self.cache.as_ref()))?;
        writeln!(f, "  log:         {}", self.log.display())?;
        writeln!(f, "  report:      {}", optional(self.report.as_ref()))?;
        writeln!(f, "  batch size:  {}", self.batch_size)?;
        writeln!(f, "  thresholds:  folder {} / file {}", self.folder_fuzzy_threshold, self.file_fuzzy_threshold)?;
        writeln!(f, "  ai:          {}", colorize_bool(self.ai.enabled))?;
        writeln!(f, "  dryrun:      {}", colorize_bool(self.dryrun))?;
        writeln!(f, "  verbose:     {}", colorize_bool(self.verbose))?;
        writeln!(f, "  extensions:  {}", self.extensions.join(", "))?;
        writeln!(f, "  ignore:      {}", self.ignore_patterns.join(", "))?;
        write!(
            f,
            "  guarded ids: {}",
            self.disambiguation.iter().map(|rule| rule.film_id.as_str()).join(", ")
        )
    }
}

fn colorize_bool(value: bool) -> colored::ColoredString {
    if value { "true".green() } else { "false".yellow() }
}

fn normalize_extensions(extensions: Vec<String>) -> Vec<String> {
    extensions
        .into_iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .unique()
        .collect()
}

/// Sibling `Sorted` directory next to the source root so copies never land inside the tree being walked.
fn default_destination(source: &Path) -> PathBuf {
    source
        .parent()
        .map_or_else(|| source.join("Sorted"), |parent| parent.join("Sorted"))
}

fn default_log_path() -> Result<PathBuf> {
    let log_dir = crate::config::LOG_DIR
        .clone()
        .context("Failed to determine home directory for the audit log")?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    Ok(log_dir.join(format!("audit_{timestamp}.csv")))
}

fn default_ai_model() -> String {
    DEFAULT_AI_MODEL.to_string()
}

fn default_ai_base_url() -> String {
    DEFAULT_AI_BASE_URL.to_string()
}

fn default_ai_api_key_env() -> String {
    DEFAULT_AI_API_KEY_ENV.to_string()
}

const fn default_ai_timeout_secs() -> u64 {
    DEFAULT_AI_TIMEOUT_SECS
}

#[cfg(test)]
mod archive_config_tests {
    use super::*;

    #[test]
    fn from_toml_str_parses_empty_config() {
        let config = ArchiveConfig::from_toml_str("").unwrap();
        assert!(!config.debug);
        assert!(!config.dryrun);
        assert!(config.destination.is_none());
        assert!(config.disambiguation.is_empty());
        assert!(!config.ai.enabled);
        assert_eq!(config.ai.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.ai.timeout_secs, 20);
    }

    #[test]
    fn from_toml_str_parses_archive_section() {
        let toml = r#"
[archive]
destination = "/tmp/Sorted"
registry = "/tmp/films.xlsx"
batch_size = 4
folder_fuzzy_threshold = 85.0
verbose = true
extensions = [".PDF", "jpg"]
ignore_patterns = ["~$"]
"#;
        let config = ArchiveConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.destination, Some(PathBuf::from("/tmp/Sorted")));
        assert_eq!(config.registry, Some(PathBuf::from("/tmp/films.xlsx")));
        assert_eq!(config.batch_size, Some(4));
        assert_eq!(config.folder_fuzzy_threshold, Some(85.0));
        assert!(config.verbose);
        assert_eq!(config.extensions, vec![".PDF", "jpg"]);
        assert_eq!(config.ignore_patterns, vec!["~$"]);
    }

    #[test]
    fn from_toml_str_parses_disambiguation_and_ai() {
        let toml = r#"
[archive]
disambiguation = [
    { film_id = "7", keywords = ["circus", "cirque"] },
]

[archive.ai]
enabled = true
model = "gpt-4o"
timeout_secs = 5
"#;
        let config = ArchiveConfig::from_toml_str(toml).unwrap();
        assert_eq!(
            config.disambiguation,
            vec![DisambiguationRule {
                film_id: "7".to_string(),
                keywords: vec!["circus".to_string(), "cirque".to_string()],
            }]
        );
        assert!(config.ai.enabled);
        assert_eq!(config.ai.model, "gpt-4o");
        assert_eq!(config.ai.timeout_secs, 5);
        assert_eq!(config.ai.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn from_toml_str_rejects_invalid_types() {
        let toml = r#"
[archive]
batch_size = "many"
"#;
        assert!(ArchiveConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn from_user_config_applies_defaults() {
        let user_config = ArchiveConfig {
            log: Some(PathBuf::from("/tmp/audit.csv")),
            batch_size: Some(0),
            extensions: vec![".PDF".to_string(), "pdf".to_string()],
            ..ArchiveConfig::default()
        };
        let config = Config::from_user_config(PathBuf::from("/data/Chaplin"), user_config).unwrap();
        assert_eq!(config.destination, PathBuf::from("/data/Sorted"));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.extensions, vec!["pdf"]);
        assert!(config.ignore_patterns.contains(&".DS_Store".to_string()));
        assert!((config.file_fuzzy_threshold - 95.0).abs() < f64::EPSILON);
    }
}
