//! Batch report: pivot per-file results into a parameter × file table.
//!
//! Rows are parameters (Title Case labels, first-seen order), columns are
//! input files. Reasoning text follows the parameters, and a final
//! "Processing Error" row appears when at least one file failed. The table
//! can be written as an XLSX sheet named `Report`, rendered as plain text,
//! and the raw records dumped as JSON.

use crate::error::ExtractError;
use crate::events::FileRecord;
use crate::schema::display_name;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::path::Path;
use tracing::info;

/// Label of the row holding per-file error messages.
pub const ERROR_ROW: &str = "Processing Error";

/// Name of the worksheet written by [`ReportTable::write_xlsx`].
pub const SHEET_NAME: &str = "Report";

/// One row of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub label: String,
    /// One cell per file, in file order; empty when the file has no value.
    pub cells: Vec<String>,
}

/// The pivoted table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReportTable {
    pub files: Vec<String>,
    pub rows: Vec<ReportRow>,
}

impl ReportTable {
    /// Pivot `records` into a table.
    pub fn from_records(records: &[FileRecord]) -> Self {
        let files: Vec<String> = records.iter().map(|r| r.filename.clone()).collect();

        let mut parameter_keys: Vec<&str> = Vec::new();
        let mut reasoning_keys: Vec<&str> = Vec::new();
        for record in records {
            if let Ok(outcome) = &record.result {
                for key in outcome.data.keys() {
                    let is_reasoning = outcome
                        .reasoning
                        .keys()
                        .any(|r| r.rsplit('.').next() == Some(key));
                    if !is_reasoning && !parameter_keys.contains(&key) {
                        parameter_keys.push(key);
                    }
                }
                for key in outcome.reasoning.keys() {
                    if !reasoning_keys.contains(&key) {
                        reasoning_keys.push(key);
                    }
                }
            }
        }

        let mut rows: Vec<ReportRow> = parameter_keys
            .iter()
            .map(|key| ReportRow {
                label: display_name(key),
                cells: records
                    .iter()
                    .map(|r| cell(r, |o| o.data.get(key)))
                    .collect(),
            })
            .collect();

        rows.extend(reasoning_keys.iter().map(|key| ReportRow {
            label: reasoning_label(key),
            cells: records
                .iter()
                .map(|r| cell(r, |o| o.reasoning.get(key)))
                .collect(),
        }));

        if records.iter().any(|r| !r.is_success()) {
            rows.push(ReportRow {
                label: ERROR_ROW.to_string(),
                cells: records
                    .iter()
                    .map(|r| r.error().unwrap_or_default().to_string())
                    .collect(),
            });
        }

        Self { files, rows }
    }

    pub fn row(&self, label: &str) -> Option<&ReportRow> {
        self.rows.iter().find(|r| r.label == label)
    }

    /// Write the table as a single-sheet workbook.
    pub fn write_xlsx(&self, path: &Path) -> Result<(), ExtractError> {
        self.build_workbook()
            .and_then(|mut workbook| workbook.save(path))
            .map_err(|e| ExtractError::ReportWriteFailed {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        info!("Wrote report to {}", path.display());
        Ok(())
    }

    fn build_workbook(&self) -> Result<Workbook, XlsxError> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();
        let wrap = Format::new().set_text_wrap();

        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;
        sheet.write_string_with_format(0, 0, "Parameter", &header)?;
        sheet.set_column_width(0, 28)?;
        for (col, file) in self.files.iter().enumerate() {
            let col = (col + 1) as u16;
            sheet.write_string_with_format(0, col, file, &header)?;
            sheet.set_column_width(col, 32)?;
        }
        for (i, row) in self.rows.iter().enumerate() {
            let r = (i + 1) as u32;
            sheet.write_string_with_format(r, 0, &row.label, &header)?;
            for (col, value) in row.cells.iter().enumerate() {
                sheet.write_string_with_format(r, (col + 1) as u16, value, &wrap)?;
            }
        }
        sheet.set_freeze_panes(1, 1)?;
        Ok(workbook)
    }

    /// Render the table for a terminal, columns padded to their widest cell.
    ///
    /// Cells longer than `max_cell` characters are truncated with `…`.
    pub fn render_text(&self, max_cell: usize) -> String {
        let clip = |s: &str| -> String {
            if s.chars().count() > max_cell {
                s.chars().take(max_cell.saturating_sub(1)).collect::<String>() + "…"
            } else {
                s.to_string()
            }
        };

        let mut grid: Vec<Vec<String>> = Vec::with_capacity(self.rows.len() + 1);
        grid.push(
            std::iter::once("Parameter".to_string())
                .chain(self.files.iter().map(|f| clip(f.as_str())))
                .collect(),
        );
        for row in &self.rows {
            grid.push(
                std::iter::once(clip(row.label.as_str()))
                    .chain(row.cells.iter().map(|c| clip(c.replace('\n', " ").as_str())))
                    .collect(),
            );
        }

        let columns = self.files.len() + 1;
        let widths: Vec<usize> = (0..columns)
            .map(|c| {
                grid.iter()
                    .map(|r| r.get(c).map_or(0, |s| s.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        for (i, row) in grid.iter().enumerate() {
            let line: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(c, s)| format!("{:<width$}", s, width = widths[c]))
                .collect();
            out.push_str(line.join(" │ ").trim_end());
            out.push('\n');
            if i == 0 {
                let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
                out.push_str(&rule.join("─┼─"));
                out.push('\n');
            }
        }
        out
    }
}

fn cell<'a>(
    record: &'a FileRecord,
    get: impl Fn(&'a crate::events::FileOutcome) -> Option<&'a str>,
) -> String {
    match &record.result {
        Ok(outcome) => get(outcome).unwrap_or_default().to_string(),
        Err(_) => String::new(),
    }
}

fn reasoning_label(key: &str) -> String {
    match key.split_once('.') {
        Some((batch, field)) => format!("{} [{}]", display_name(field), batch),
        None => display_name(key),
    }
}

/// Dump `records` as `[{"filename", "data" | "error"}]`.
pub fn write_json(records: &[FileRecord], path: &Path) -> Result<(), ExtractError> {
    let to_err = |detail: String| ExtractError::ReportWriteFailed {
        path: path.to_path_buf(),
        detail,
    };
    let json = serde_json::to_string_pretty(records).map_err(|e| to_err(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| to_err(e.to_string()))?;
    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FileOutcome, ParameterValues};
    use crate::pipeline::normalize::Rotation;

    fn ok(name: &str, pairs: &[(&str, &str)], reasoning: &[(&str, &str)]) -> FileRecord {
        let mut data: ParameterValues = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut batch_reasoning = ParameterValues::new();
        for (key, text) in reasoning {
            let field = key.rsplit('.').next().unwrap_or(*key);
            data.insert(field, *text);
            batch_reasoning.insert(*key, *text);
        }
        FileRecord {
            filename: name.into(),
            result: Ok(FileOutcome {
                data,
                image: vec![],
                image_mime: "image/jpeg",
                image_url: String::new(),
                rotation: Rotation::None,
                reasoning: batch_reasoning,
                missing: vec![],
            }),
        }
    }

    fn err(name: &str, message: &str) -> FileRecord {
        FileRecord {
            filename: name.into(),
            result: Err(message.into()),
        }
    }

    fn records() -> Vec<FileRecord> {
        vec![
            ok(
                "a.pdf",
                &[("bore_diameter", "50"), ("rod_diameter", "28")],
                &[("batch1.close_length_reasoning", "read CLOSE: 420")],
            ),
            err("b.pdf", "Failed to convert PDF to image: bad xref"),
            ok("c.png", &[("bore_diameter", "63"), ("fluid", "AIR")], &[]),
        ]
    }

    #[test]
    fn pivots_parameters_by_file() {
        let table = ReportTable::from_records(&records());
        assert_eq!(table.files, vec!["a.pdf", "b.pdf", "c.png"]);
        let labels: Vec<&str> = table.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Bore Diameter",
                "Rod Diameter",
                "Fluid",
                "Close Length Reasoning [batch1]",
                ERROR_ROW
            ]
        );
        assert_eq!(table.row("Bore Diameter").unwrap().cells, vec!["50", "", "63"]);
        assert_eq!(table.row("Fluid").unwrap().cells, vec!["", "", "AIR"]);
        assert_eq!(
            table.row(ERROR_ROW).unwrap().cells[1],
            "Failed to convert PDF to image: bad xref"
        );
    }

    #[test]
    fn no_error_row_when_all_succeed() {
        let table = ReportTable::from_records(&[ok("a.pdf", &[("revision", "01")], &[])]);
        assert!(table.row(ERROR_ROW).is_none());
    }

    #[test]
    fn text_rendering_aligns_columns() {
        let text = ReportTable::from_records(&records()).render_text(20);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Parameter"));
        assert!(lines[1].contains('┼'));
        assert!(text.contains("Bore Diameter"));
        assert!(text.contains('…'));
    }

    #[test]
    fn writes_xlsx_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let table = ReportTable::from_records(&records());
        let xlsx = dir.path().join("report.xlsx");
        table.write_xlsx(&xlsx).unwrap();
        let bytes = std::fs::read(&xlsx).unwrap();
        assert!(bytes.starts_with(b"PK"));

        let json_path = dir.path().join("extracted_data.json");
        write_json(&records(), &json_path).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed[0]["filename"], "a.pdf");
        assert_eq!(parsed[0]["data"]["bore_diameter"], "50");
        assert!(parsed[1]["error"].as_str().unwrap().contains("bad xref"));
    }

    #[test]
    fn unwritable_path_is_reported() {
        let table = ReportTable::from_records(&records());
        let err = table
            .write_xlsx(Path::new("/nonexistent-dir/report.xlsx"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::ReportWriteFailed { .. }));
    }
}
