//! Table Extractor (§4.4): heuristic structured-table extraction from
//! page text.
//!
//! Detection is whitespace-column based: a run of consecutive lines that
//! each split into two or more cells on runs of 2+ spaces (or tab) is
//! treated as a table, with the first such line as the header. Failure
//! here is always non-fatal to the pipeline (§4.4): any error is caught
//! at the call site and degrades to an empty table list.

use crate::model::Table;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;

pub const NUMERICAL_CELL_THRESHOLD: f64 = 0.30;
const MIN_ROWS_FOR_TABLE: usize = 2;

static COLUMN_SEP: Lazy<regex::Regex> = Lazy::new(|| regex::Regex::new(r" {2,}").unwrap());

pub struct TableExtractor;

impl Default for TableExtractor {
    fn default() -> Self {
        Self
    }
}

impl TableExtractor {
    /// Extracts tables from every page of `path`. Never returns an error:
    /// any extraction failure yields an empty list, per §4.4.
    pub fn extract(&self, path: &Path) -> Vec<Table> {
        match pdf_extract::extract_text_by_pages(path) {
            Ok(page_texts) => page_texts
                .into_iter()
                .enumerate()
                .flat_map(|(i, text)| self.extract_from_page((i as u32) + 1, &text))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn extract_from_page(&self, page: u32, text: &str) -> Vec<Table> {
        let mut tables = Vec::new();
        let mut current_block: Vec<Vec<String>> = Vec::new();

        let flush = |block: &mut Vec<Vec<String>>, tables: &mut Vec<Table>, page: u32| {
            if block.len() >= MIN_ROWS_FOR_TABLE {
                if let Some(table) = build_table(page, tables.len(), std::mem::take(block)) {
                    tables.push(table);
                }
            } else {
                block.clear();
            }
        };

        for line in text.lines() {
            match split_into_cells(line) {
                Some(cells) if cells.len() >= 2 => current_block.push(cells),
                _ => flush(&mut current_block, &mut tables, page),
            }
        }
        flush(&mut current_block, &mut tables, page);
        tables
    }
}

fn split_into_cells(line: &str) -> Option<Vec<String>> {
    if line.trim().is_empty() {
        return None;
    }
    let normalized = line.replace('\t', "   ");
    let cells: Vec<String> = COLUMN_SEP
        .split(normalized.trim())
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if cells.is_empty() {
        None
    } else {
        Some(cells)
    }
}

/// First non-empty row with >= 2 cells is the header; every subsequent
/// row is aligned to it by position (§4.4). Empty tables are discarded.
fn build_table(page: u32, index_on_page: usize, rows: Vec<Vec<String>>) -> Option<Table> {
    let mut iter = rows.into_iter();
    let header = iter.next()?;
    let data_rows: Vec<Vec<String>> = iter.collect();
    if data_rows.is_empty() {
        return None;
    }

    let rows_as_records: Vec<HashMap<String, String>> = data_rows
        .iter()
        .map(|row| {
            header
                .iter()
                .enumerate()
                .filter_map(|(i, key)| row.get(i).map(|v| (key.clone(), v.clone())))
                .collect()
        })
        .collect();

    let mut numeric_cells = 0usize;
    let mut total_cells = 0usize;
    for row in &data_rows {
        for cell in row {
            total_cells += 1;
            if is_numeric_cell(cell) {
                numeric_cells += 1;
            }
        }
    }
    let is_numerical = total_cells > 0
        && (numeric_cells as f64 / total_cells as f64) >= NUMERICAL_CELL_THRESHOLD;

    Some(Table {
        page,
        index_on_page,
        column_count: header.len(),
        row_count: data_rows.len(),
        header,
        rows: data_rows,
        rows_as_records,
        is_numerical,
    })
}

fn is_numeric_cell(cell: &str) -> bool {
    let cleaned: String = cell
        .chars()
        .filter(|c| !matches!(c, ',' | '円' | '¥' | '%' | '(' | ')'))
        .collect();
    let cleaned = cleaned.trim();
    !cleaned.is_empty() && cleaned.parse::<f64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_simple_table_with_header() {
        let extractor = TableExtractor;
        let text = "売上高  利益  前年比\n1000  200  5%\n1100  210  6%\nSome trailing prose.";
        let tables = extractor.extract_from_page(1, text);
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.header, vec!["売上高", "利益", "前年比"]);
        assert_eq!(table.row_count, 2);
        assert_eq!(table.rows_as_records[0].get("売上高").unwrap(), "1000");
    }

    #[test]
    fn discards_single_row_blocks() {
        let extractor = TableExtractor;
        let text = "売上高  利益\nJust one line of narrative text follows.";
        let tables = extractor.extract_from_page(1, text);
        assert!(tables.is_empty());
    }

    #[test]
    fn flags_numerical_tables() {
        let extractor = TableExtractor;
        let text = "Item  Value\nA  100\nB  200\nC  300";
        let tables = extractor.extract_from_page(1, text);
        assert_eq!(tables.len(), 1);
        assert!(tables[0].is_numerical);
    }

    #[test]
    fn missing_file_yields_empty_list_not_error() {
        let extractor = TableExtractor;
        let tables = extractor.extract(Path::new("/no/such/file.pdf"));
        assert!(tables.is_empty());
    }
}
