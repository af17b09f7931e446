use std::path::PathBuf;
use std::sync::LazyLock;

const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

/// Path to the user config file: `$HOME/.config/film-archive.toml`
///
/// Returns `None` if the home directory cannot be determined.
pub static CONFIG_PATH: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let home_dir = dirs::home_dir()?;
    Some(home_dir.join(".config").join(format!("{PROJECT_NAME}.toml")))
});

/// Default path for the alternate-titles table: `$HOME/.config/film-archive-titles.json`
pub static ALTERNATE_TITLES_PATH: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let home_dir = dirs::home_dir()?;
    Some(home_dir.join(".config").join(format!("{PROJECT_NAME}-titles.json")))
});

/// Default path for the decision cache: `<cache dir>/film-archive/decisions.json`
pub static CACHE_PATH: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let cache_dir = dirs::cache_dir()?;
    Some(cache_dir.join(PROJECT_NAME).join("decisions.json"))
});

/// Default directory for audit logs: `$HOME/logs/film-archive`
pub static LOG_DIR: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let home_dir = dirs::home_dir()?;
    Some(home_dir.join("logs").join(PROJECT_NAME))
});
