//! Optional XLSX summary of a run.

use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Chart, ChartType, Format, FormatBorder, RowNum, Workbook};

use crate::archive::stats::RunStats;

const FILMS_SHEET: &str = "Films";
const CATEGORIES_SHEET: &str = "Categories";
const STATUS_SHEET: &str = "Status";
const FOLDERS_SHEET: &str = "Folders";

/// Write per-film and per-category tables with a pie chart of the categories,
/// status counts, and the folders associated with each film.
///
/// # Errors
/// Returns an error if the workbook cannot be built or saved.
pub fn write_report(stats: &RunStats, output_file: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let header_format = Format::new()
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_background_color("C6E0B4");

    let films = workbook.add_worksheet().set_name(FILMS_SHEET)?;
    films.write_string_with_format(0, 0, "Film", &header_format)?;
    films.write_string_with_format(0, 1, "Files", &header_format)?;
    let mut row: RowNum = 1;
    for (name, count) in stats.films_by_count() {
        films.write_string(row, 0, name)?;
        films.write_number(row, 1, count_to_u32(count))?;
        row += 1;
    }
    films.autofit();

    let categories = workbook.add_worksheet().set_name(CATEGORIES_SHEET)?;
    categories.write_string_with_format(0, 0, "Category", &header_format)?;
    categories.write_string_with_format(0, 1, "Files", &header_format)?;
    let mut row: RowNum = 1;
    for (category, count) in stats.categories_by_count() {
        categories.write_string(row, 0, category.as_str())?;
        categories.write_number(row, 1, count_to_u32(count))?;
        row += 1;
    }
    categories.autofit();

    let last_row = row - 1;
    if last_row > 0 {
        let mut chart = Chart::new(ChartType::Pie);
        chart
            .add_series()
            .set_categories((CATEGORIES_SHEET, 1, 0, last_row, 0))
            .set_values((CATEGORIES_SHEET, 1, 1, last_row, 1));
        chart.title().set_name("Files per category");
        categories.insert_chart(1, 3, &chart)?;
    }

    let status = workbook.add_worksheet().set_name(STATUS_SHEET)?;
    status.write_string_with_format(0, 0, "Status", &header_format)?;
    status.write_string_with_format(0, 1, "Files", &header_format)?;
    let rows = [
        ("success", stats.success),
        ("ignored", stats.ignored),
        ("error", stats.errors),
        ("critical_error", stats.critical_errors),
    ];
    for (row, (name, count)) in (1..).zip(rows) {
        status.write_string(row, 0, name)?;
        status.write_number(row, 1, count_to_u32(count))?;
    }
    status.autofit();

    let folders = workbook.add_worksheet().set_name(FOLDERS_SHEET)?;
    for (column, title) in (0..).zip(["Folder", "Film", "ID", "Match"]) {
        folders.write_string_with_format(0, column, title, &header_format)?;
    }
    for (row, folder) in (1..).zip(&stats.folders) {
        folders.write_string(row, 0, &folder.folder)?;
        folders.write_string(row, 1, &folder.film_name)?;
        folders.write_string(row, 2, &folder.film_id)?;
        folders.write_string(row, 3, folder.method.to_string())?;
    }
    folders.autofit();

    if let Some(parent) = output_file.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory: {}", parent.display()))?;
    }
    workbook
        .save(output_file)
        .with_context(|| format!("Failed to save report: {}", output_file.display()))?;
    Ok(())
}

fn count_to_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod report_tests {
    use super::*;

    use calamine::{Reader, open_workbook_auto};
    use tempfile::tempdir;

    use crate::archive::category::Category;
    use crate::archive::stats::AssociatedFolder;
    use crate::archive::types::{AuditRecord, MatchMethod, Status};

    #[test]
    fn writes_tables() {
        let mut stats = RunStats::default();
        for category in [Category::Affiches, Category::Affiches, Category::Contrats] {
            stats.add_record(&AuditRecord {
                category: Some(category),
                film_name: Some("The Kid".to_string()),
                ..AuditRecord::new(Path::new("/src/a"), Status::Success)
            });
        }

        stats.folders.push(AssociatedFolder {
            folder: "1921 - The Kid".to_string(),
            film_id: "100".to_string(),
            film_name: "The Kid".to_string(),
            method: MatchMethod::Exact,
        });

        let dir = tempdir().unwrap();
        let path = dir.path().join("reports/summary.xlsx");
        write_report(&stats, &path).unwrap();

        let mut workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(
            workbook.sheet_names(),
            vec![FILMS_SHEET, CATEGORIES_SHEET, STATUS_SHEET, FOLDERS_SHEET]
        );

        let folders = workbook.worksheet_range(FOLDERS_SHEET).unwrap();
        assert_eq!(folders.get_value((1, 0)).unwrap().to_string(), "1921 - The Kid");
        assert_eq!(folders.get_value((1, 2)).unwrap().to_string(), "100");
        assert_eq!(folders.get_value((1, 3)).unwrap().to_string(), "exact");

        let categories = workbook.worksheet_range(CATEGORIES_SHEET).unwrap();
        assert_eq!(categories.get_value((1, 0)).unwrap().to_string(), "AfficheS");
        assert_eq!(categories.get_value((1, 1)).unwrap().to_string(), "2");

        let films = workbook.worksheet_range(FILMS_SHEET).unwrap();
        assert_eq!(films.get_value((1, 0)).unwrap().to_string(), "The Kid");
    }

    #[test]
    fn empty_run_still_writes_workbook() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.xlsx");
        write_report(&RunStats::default(), &path).unwrap();
        assert!(path.exists());
    }
}
