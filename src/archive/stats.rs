use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use colored::Colorize;

use crate::archive::category::Category;
use crate::archive::detector::FolderIndex;
use crate::archive::types::{AuditRecord, MatchMethod, Status};

/// Width of the longest bar in the category chart.
const CHART_WIDTH: usize = 40;

/// Label used for files without a film in the per-film table.
pub const NO_FILM_LABEL: &str = "Inconnu";

/// A source folder associated with a film during detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociatedFolder {
    /// Path relative to the source root.
    pub folder: String,
    pub film_id: String,
    pub film_name: String,
    pub method: MatchMethod,
}

/// Statistics for one archiving run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub success: usize,
    pub ignored: usize,
    pub errors: usize,
    pub critical_errors: usize,
    /// Successfully archived files per category.
    pub per_category: BTreeMap<Category, usize>,
    /// Successfully archived files per film name.
    pub per_film: BTreeMap<String, usize>,
    /// Folders associated with a film, in detection order.
    pub folders: Vec<AssociatedFolder>,
    pub duration: Duration,
}

impl RunStats {
    /// Count one audit record.
    pub fn add_record(&mut self, record: &AuditRecord) {
        self.total += 1;
        match record.status {
            Status::Success => {
                self.success += 1;
                if let Some(category) = record.category {
                    *self.per_category.entry(category).or_default() += 1;
                }
                let film = record.film_name.clone().unwrap_or_else(|| NO_FILM_LABEL.to_string());
                *self.per_film.entry(film).or_default() += 1;
            }
            Status::Ignored => self.ignored += 1,
            Status::Error => self.errors += 1,
            Status::CriticalError => self.critical_errors += 1,
        }
    }

    /// Record the folder associations of the run.
    pub fn add_folders(&mut self, index: &FolderIndex, source_root: &Path) {
        self.folders = index
            .associations()
            .iter()
            .filter_map(|association| {
                let film_id = association.film_id.as_deref()?;
                Some(AssociatedFolder {
                    folder: crate::get_relative_path_or_filename(&association.folder_path, source_root),
                    film_id: film_id.to_string(),
                    film_name: index.film_name(film_id).unwrap_or(film_id).to_string(),
                    method: association.match_method,
                })
            })
            .collect();
    }

    #[must_use]
    pub const fn count(&self, status: Status) -> usize {
        match status {
            Status::Success => self.success,
            Status::Ignored => self.ignored,
            Status::Error => self.errors,
            Status::CriticalError => self.critical_errors,
        }
    }

    /// Film rows sorted by descending count, then name.
    #[must_use]
    pub fn films_by_count(&self) -> Vec<(&str, usize)> {
        let mut rows: Vec<(&str, usize)> = self.per_film.iter().map(|(name, count)| (name.as_str(), *count)).collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        rows
    }

    /// Category rows sorted by descending count.
    #[must_use]
    pub fn categories_by_count(&self) -> Vec<(Category, usize)> {
        let mut rows: Vec<(Category, usize)> = self.per_category.iter().map(|(c, n)| (*c, *n)).collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows
    }

    /// Text bar chart of the category distribution.
    #[must_use]
    pub fn category_chart(&self) -> Vec<String> {
        let rows = self.categories_by_count();
        let max = rows.first().map_or(0, |(_, count)| *count);
        if max == 0 {
            return Vec::new();
        }
        let label_width = rows
            .iter()
            .map(|(category, _)| category.as_str().chars().count())
            .max()
            .unwrap_or_default();

        rows.iter()
            .map(|(category, count)| {
                let width = (count * CHART_WIDTH).div_ceil(max);
                let label = category.as_str();
                let padding = " ".repeat(label_width - label.chars().count());
                format!("{label}{padding} | {} {count}", "#".repeat(width))
            })
            .collect()
    }

    pub fn print_summary(&self, log_path: &Path) {
        if !self.per_film.is_empty() {
            println!("{}", "\n--- Files per film ---".bold().magenta());
            let width = self.per_film.keys().map(|name| name.chars().count()).max().unwrap_or_default();
            for (name, count) in self.films_by_count() {
                let padding = " ".repeat(width - name.chars().count());
                println!("{name}{padding}  {count:>6}");
            }
        }

        if !self.per_category.is_empty() {
            println!("{}", "\n--- Files per category ---".bold().magenta());
            for line in self.category_chart() {
                println!("{line}");
            }
        }

        println!("{}", "\n--- Archive Summary ---".bold().magenta());
        println!("Film folders:           {}", self.folders.len());
        println!("Files found:            {}", self.total);
        println!("Success:                {}", self.success.to_string().green());
        println!("Ignored:                {}", self.ignored);
        println!(
            "Errors:                 {}",
            if self.errors > 0 {
                self.errors.to_string().red()
            } else {
                "0".normal()
            }
        );
        println!(
            "Critical errors:        {}",
            if self.critical_errors > 0 {
                self.critical_errors.to_string().red()
            } else {
                "0".normal()
            }
        );
        println!("Total time:             {}", crate::format_duration(self.duration));
        println!("\nSee the audit log for details on every file: {}", log_path.display());
    }
}
