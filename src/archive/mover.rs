//! Copies classified files into the destination tree.
//!
//! Destination layout: `<film name or Inconnu>/<media label>_<film id | category>/<file name>`.
//! Existing files are never overwritten and the source is never modified.

use std::collections::HashSet;
use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use anyhow::{Context, Result};
use regex::Regex;

use crate::archive::category::Category;
use crate::print_warning;

/// Top-level folder for files without a film.
pub const UNKNOWN_FILM_DIR: &str = "Inconnu";

/// Maximum file name length in characters, extension included.
pub const MAX_FILE_NAME_CHARS: usize = 240;

/// Highest `_copyN` suffix tried before giving up.
pub const MAX_COPY_ATTEMPTS: usize = 100;

static RE_INVALID_FILENAME_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).expect("Failed to create regex pattern for invalid filename characters")
});

static RE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Failed to create regex pattern for whitespace"));

/// Copies files into the destination root with collision-safe names.
#[derive(Debug)]
pub struct FileMover {
    destination_root: PathBuf,
    dryrun: bool,
    /// Destination paths handed out during this run.
    claimed: Mutex<HashSet<PathBuf>>,
}

impl FileMover {
    #[must_use]
    pub fn new(destination_root: PathBuf, dryrun: bool) -> Self {
        Self {
            destination_root,
            dryrun,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }

    /// Target directory for a file, relative to the destination root.
    ///
    /// The `<label>_<id>` segment is only used for the primary media categories when the film is known.
    #[must_use]
    pub fn relative_directory(film: Option<(&str, &str)>, category: Category) -> PathBuf {
        let film_dir = film.map_or_else(|| UNKNOWN_FILM_DIR.to_string(), |(_, name)| sanitize_file_name(name));
        let segment = match (film, category.media_label()) {
            (Some((film_id, _)), Some(label)) => format!("{label}_{}", sanitize_file_name(film_id)),
            _ => category.as_str().to_string(),
        };
        PathBuf::from(film_dir).join(segment)
    }

    /// Copy `source` into the target directory and return the final destination path.
    ///
    /// Tries the sanitized name first and then `_copy1` up to `_copy100`.
    /// A candidate that already holds identical bytes from an earlier run is reused,
    /// unless another file of this run already went there.
    /// In dry run mode the path is planned but nothing is written.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created, the copy fails,
    /// or no free name is found.
    pub fn place(&self, source: &Path, film: Option<(&str, &str)>, category: Category) -> Result<PathBuf> {
        let directory = self
            .destination_root
            .join(Self::relative_directory(film, category));
        let file_name = sanitize_file_name(&crate::path_to_filename_string(source));

        if !self.dryrun {
            fs::create_dir_all(&directory)
                .with_context(|| format!("Failed to create directory: {}", directory.display()))?;
        }

        for attempt in 0..=MAX_COPY_ATTEMPTS {
            let candidate = if attempt == 0 {
                directory.join(&file_name)
            } else {
                crate::insert_suffix_before_extension(&directory.join(&file_name), &format!("_copy{attempt}"))
            };
            if !self.claim(&candidate) {
                continue;
            }

            if self.dryrun {
                if !candidate.exists() || self.reuse_identical(source, &candidate)? {
                    return Ok(candidate);
                }
                continue;
            }

            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(file) => {
                    if let Err(error) = copy_with_times(source, file) {
                        if let Err(remove_error) = fs::remove_file(&candidate) {
                            print_warning!("Failed to remove partial copy {}: {remove_error}", candidate.display());
                        }
                        self.release(&candidate);
                        return Err(error)
                            .with_context(|| format!("Failed to copy {} to {}", source.display(), candidate.display()));
                    }
                    return Ok(candidate);
                }
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                    if self.reuse_identical(source, &candidate)? {
                        return Ok(candidate);
                    }
                }
                Err(error) => {
                    self.release(&candidate);
                    return Err(error).with_context(|| format!("Failed to create file: {}", candidate.display()));
                }
            }
        }

        anyhow::bail!(
            "Too many name collisions for {} in {}",
            file_name,
            directory.display()
        )
    }

    /// Reserve a destination path for this run. Returns false if it was already taken.
    fn claim(&self, path: &Path) -> bool {
        self.claimed
            .lock()
            .map(|mut claimed| claimed.insert(path.to_path_buf()))
            .unwrap_or(false)
    }

    /// Whether an existing candidate holds the same bytes as the source.
    /// The claim is released unless the candidate is reused.
    fn reuse_identical(&self, source: &Path, candidate: &Path) -> Result<bool> {
        let identical = files_are_identical(source, candidate);
        if !matches!(identical, Ok(true)) {
            self.release(candidate);
        }
        identical
    }

    fn release(&self, path: &Path) {
        if let Ok(mut claimed) = self.claimed.lock() {
            claimed.remove(path);
        }
    }
}

/// Replace characters that are invalid on common filesystems, collapse whitespace,
/// and cap the length while keeping the extension.
///
/// ```rust
/// use film_archive::archive::mover::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("Kid: poster?  v2.jpg"), "Kid_ poster_ v2.jpg");
/// assert_eq!(sanitize_file_name("  a/b.pdf "), "a_b.pdf");
/// ```
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let replaced = RE_INVALID_FILENAME_CHARS.replace_all(name, "_");
    let collapsed = RE_WHITESPACE.replace_all(&replaced, " ").trim().to_string();
    if collapsed.is_empty() {
        return "_".to_string();
    }
    if collapsed.chars().count() <= MAX_FILE_NAME_CHARS {
        return collapsed;
    }

    match collapsed.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() && extension.chars().count() + 1 < MAX_FILE_NAME_CHARS => {
            let available = MAX_FILE_NAME_CHARS - extension.chars().count() - 1;
            format!("{}.{extension}", crate::truncate_chars(stem, available))
        }
        _ => crate::truncate_chars(&collapsed, MAX_FILE_NAME_CHARS).to_string(),
    }
}

/// Copy file contents and carry over permissions and timestamps.
fn copy_with_times(source: &Path, mut target: File) -> Result<()> {
    let metadata = fs::metadata(source)?;
    let mut reader = File::open(source)?;
    io::copy(&mut reader, &mut target)?;

    let mut times = FileTimes::new();
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    target.set_times(times)?;
    target.set_permissions(metadata.permissions())?;
    Ok(())
}

/// Byte comparison of two files.
fn files_are_identical(a: &Path, b: &Path) -> Result<bool> {
    let metadata_a = fs::metadata(a).with_context(|| format!("Failed to read metadata: {}", a.display()))?;
    let metadata_b = fs::metadata(b).with_context(|| format!("Failed to read metadata: {}", b.display()))?;
    if metadata_a.len() != metadata_b.len() {
        return Ok(false);
    }

    let mut reader_a = BufReader::new(File::open(a)?);
    let mut reader_b = BufReader::new(File::open(b)?);
    let mut buffer_a = vec![0_u8; 64 * 1024];
    let mut buffer_b = vec![0_u8; 64 * 1024];
    loop {
        let read = reader_a.read(&mut buffer_a)?;
        if read == 0 {
            return Ok(true);
        }
        reader_b.read_exact(&mut buffer_b[..read])?;
        if buffer_a[..read] != buffer_b[..read] {
            return Ok(false);
        }
    }
}

#[cfg(test)]
mod mover_tests {
    use super::*;

    use tempfile::tempdir;

    const KID: Option<(&str, &str)> = Some(("100", "The Kid"));

    #[test]
    fn primary_category_with_film_uses_label_segment() {
        assert_eq!(
            FileMover::relative_directory(KID, Category::Affiches),
            PathBuf::from("The Kid/1_100")
        );
        assert_eq!(
            FileMover::relative_directory(KID, Category::RevueDePresse),
            PathBuf::from("The Kid/4_100")
        );
    }

    #[test]
    fn other_categories_use_category_name() {
        assert_eq!(
            FileMover::relative_directory(KID, Category::Factures),
            PathBuf::from("The Kid/Factures")
        );
        assert_eq!(
            FileMover::relative_directory(None, Category::RevueDePresse),
            PathBuf::from("Inconnu/RevueDePresse")
        );
        assert_eq!(
            FileMover::relative_directory(None, Category::Divers),
            PathBuf::from("Inconnu/Divers")
        );
    }

    #[test]
    fn film_name_is_sanitized() {
        assert_eq!(
            FileMover::relative_directory(Some(("7", "Monsieur Verdoux: Comedy of Murders")), Category::Contrats),
            PathBuf::from("Monsieur Verdoux_ Comedy of Murders/Contrats")
        );
    }

    #[test]
    fn long_names_keep_extension() {
        let name = format!("{}.jpeg", "é".repeat(300));
        let sanitized = sanitize_file_name(&name);
        assert_eq!(sanitized.chars().count(), MAX_FILE_NAME_CHARS);
        assert!(sanitized.ends_with(".jpeg"));
    }

    #[test]
    fn empty_name_is_replaced() {
        assert_eq!(sanitize_file_name("   "), "_");
    }

    #[test]
    fn copies_and_keeps_source() {
        let source_dir = tempdir().unwrap();
        let destination = tempdir().unwrap();
        let source = source_dir.path().join("poster1.jpg");
        fs::write(&source, b"poster").unwrap();

        let mover = FileMover::new(destination.path().to_path_buf(), false);
        let placed = mover.place(&source, KID, Category::Affiches).unwrap();

        assert_eq!(placed, destination.path().join("The Kid/1_100/poster1.jpg"));
        assert_eq!(fs::read(&placed).unwrap(), b"poster");
        assert_eq!(fs::read(&source).unwrap(), b"poster");
        assert_eq!(
            fs::metadata(&placed).unwrap().modified().unwrap(),
            fs::metadata(&source).unwrap().modified().unwrap()
        );
    }

    #[test]
    fn collisions_get_copy_suffix() {
        let source_dir = tempdir().unwrap();
        let destination = tempdir().unwrap();
        let first = source_dir.path().join("a/scan.pdf");
        let second = source_dir.path().join("b/scan.pdf");
        let third = source_dir.path().join("c/scan.pdf");
        for (path, content) in [(&first, "one"), (&second, "two"), (&third, "three")] {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let mover = FileMover::new(destination.path().to_path_buf(), false);
        let directory = destination.path().join("Inconnu/Divers");
        assert_eq!(mover.place(&first, None, Category::Divers).unwrap(), directory.join("scan.pdf"));
        assert_eq!(mover.place(&second, None, Category::Divers).unwrap(), directory.join("scan_copy1.pdf"));
        assert_eq!(mover.place(&third, None, Category::Divers).unwrap(), directory.join("scan_copy2.pdf"));
        assert_eq!(fs::read_to_string(directory.join("scan.pdf")).unwrap(), "one");
        assert_eq!(fs::read_to_string(directory.join("scan_copy2.pdf")).unwrap(), "three");
    }

    #[test]
    fn identical_copies_in_one_run_are_not_merged() {
        let source_dir = tempdir().unwrap();
        let destination = tempdir().unwrap();
        let first = source_dir.path().join("a/same.txt");
        let second = source_dir.path().join("b/same.txt");
        for path in [&first, &second] {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "same").unwrap();
        }

        let mover = FileMover::new(destination.path().to_path_buf(), false);
        let a = mover.place(&first, None, Category::Divers).unwrap();
        let b = mover.place(&second, None, Category::Divers).unwrap();
        assert_ne!(a, b);
        assert!(b.ends_with("same_copy1.txt"));
    }

    #[test]
    fn rerun_reuses_identical_file() {
        let source_dir = tempdir().unwrap();
        let destination = tempdir().unwrap();
        let source = source_dir.path().join("contract.docx");
        fs::write(&source, "signed").unwrap();

        let first_run = FileMover::new(destination.path().to_path_buf(), false);
        let placed = first_run.place(&source, None, Category::Contrats).unwrap();

        let second_run = FileMover::new(destination.path().to_path_buf(), false);
        assert_eq!(second_run.place(&source, None, Category::Contrats).unwrap(), placed);
        assert_eq!(fs::read_dir(placed.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn existing_different_file_is_not_overwritten() {
        let source_dir = tempdir().unwrap();
        let destination = tempdir().unwrap();
        let source = source_dir.path().join("notes.txt");
        fs::write(&source, "new").unwrap();
        let directory = destination.path().join("Inconnu/Divers");
        fs::create_dir_all(&directory).unwrap();
        fs::write(directory.join("notes.txt"), "old").unwrap();

        let mover = FileMover::new(destination.path().to_path_buf(), false);
        let placed = mover.place(&source, None, Category::Divers).unwrap();
        assert_eq!(placed, directory.join("notes_copy1.txt"));
        assert_eq!(fs::read_to_string(directory.join("notes.txt")).unwrap(), "old");
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let source_dir = tempdir().unwrap();
        let destination = tempdir().unwrap();
        let source = source_dir.path().join("x.txt");
        fs::write(&source, "source").unwrap();
        let directory = destination.path().join("Inconnu/Divers");
        fs::create_dir_all(&directory).unwrap();
        fs::write(directory.join("x.txt"), "taken").unwrap();
        for attempt in 1..=MAX_COPY_ATTEMPTS {
            fs::write(directory.join(format!("x_copy{attempt}.txt")), "taken").unwrap();
        }

        let mover = FileMover::new(destination.path().to_path_buf(), false);
        assert!(mover.place(&source, None, Category::Divers).is_err());
    }

    #[test]
    fn dry_run_writes_nothing() {
        let source_dir = tempdir().unwrap();
        let destination = tempdir().unwrap();
        let source = source_dir.path().join("poster1.jpg");
        fs::write(&source, "poster").unwrap();

        let mover = FileMover::new(destination.path().to_path_buf(), true);
        let planned = mover.place(&source, KID, Category::Affiches).unwrap();
        assert_eq!(planned, destination.path().join("The Kid/1_100/poster1.jpg"));
        assert!(!planned.exists());
        assert!(!destination.path().join("The Kid").exists());

        let second = mover.place(&source, KID, Category::Affiches).unwrap();
        assert!(second.ends_with("poster1_copy1.jpg"));
    }

    #[test]
    fn failed_comparison_releases_claim() {
        let source_dir = tempdir().unwrap();
        let destination = tempdir().unwrap();
        let existing = destination.path().join("Inconnu/Divers/scan.txt");
        fs::create_dir_all(existing.parent().unwrap()).unwrap();
        fs::write(&existing, "archived").unwrap();
        let vanished = source_dir.path().join("scan.txt");

        for dryrun in [true, false] {
            let mover = FileMover::new(destination.path().to_path_buf(), dryrun);
            assert!(mover.place(&vanished, None, Category::Divers).is_err());
            assert!(mover.claimed.lock().unwrap().is_empty());
        }
    }
}
