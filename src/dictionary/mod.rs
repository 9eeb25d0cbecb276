//! Census data dictionary loading.
//!
//! Each release ships a spreadsheet describing the microdata fields. The
//! layout drifts year to year: the true header row sits a fixed number of
//! rows below the top of the sheet, and the columns of interest move around,
//! so they are located by fuzzy name match rather than fixed position. The
//! data region ends at the first row whose ordinal "N" column is
//! non-numeric or blank.

use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Range, Reader, Xlsx, open_workbook_auto};

use crate::domain::DictionaryField;
use crate::error::{PipelineError, Result};

/// Rows above the true header row in the school-census dictionary family.
pub const DEFAULT_HEADER_OFFSET: usize = 8;

/// Load the dictionary from a workbook on disk.
pub fn load_from_path(path: &Path, header_offset: usize) -> Result<Vec<DictionaryField>> {
    let label = path.display().to_string();
    let mut workbook =
        open_workbook_auto(path).map_err(|e| dictionary_error(&label, e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| dictionary_error(&label, "no worksheet found"))?
        .map_err(|e| dictionary_error(&label, e.to_string()))?;
    parse_range(&range, &label, header_offset)
}

/// Load the dictionary from workbook bytes (e.g. an archive entry read
/// without extraction).
pub fn load_from_bytes(
    bytes: Vec<u8>,
    source_label: &str,
    header_offset: usize,
) -> Result<Vec<DictionaryField>> {
    let mut workbook = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| dictionary_error(source_label, e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| dictionary_error(source_label, "no worksheet found"))?
        .map_err(|e| dictionary_error(source_label, e.to_string()))?;
    parse_range(&range, source_label, header_offset)
}

fn parse_range(
    range: &Range<Data>,
    source_label: &str,
    header_offset: usize,
) -> Result<Vec<DictionaryField>> {
    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();
    parse_rows(&rows, source_label, header_offset)
}

/// Parse already-stringified sheet rows into the ordered field list.
pub fn parse_rows(
    rows: &[Vec<String>],
    source_label: &str,
    header_offset: usize,
) -> Result<Vec<DictionaryField>> {
    let header = rows.get(header_offset).ok_or_else(|| {
        dictionary_error(
            source_label,
            format!("header row {header_offset} is beyond the sheet"),
        )
    })?;

    let ordinal_col = locate_exact(header, "n").unwrap_or(0);
    let name_col = locate(header, "nome").unwrap_or(1);
    let desc_col = locate(header, "descri").unwrap_or(2);
    let type_col = locate(header, "tipo");
    let category_col = locate(header, "categoria");

    let mut fields = Vec::new();
    for row in rows.iter().skip(header_offset + 1) {
        if !is_ordinal(cell(row, ordinal_col)) {
            break;
        }
        let name = cell(row, name_col);
        if name.trim().is_empty() {
            continue;
        }
        let category = cell(row, category_col.unwrap_or(usize::MAX));
        fields.push(DictionaryField {
            name: name.to_string(),
            description: cell(row, desc_col).to_string(),
            declared_type: type_col.map(|c| cell(row, c).to_string()).unwrap_or_default(),
            category: if category.trim().is_empty() {
                None
            } else {
                Some(category.to_string())
            },
        });
    }

    if fields.is_empty() {
        return Err(dictionary_error(
            source_label,
            "no dictionary fields found below the header row",
        ));
    }
    Ok(fields)
}

fn cell(row: &[String], col: usize) -> &str {
    row.get(col).map(String::as_str).unwrap_or("")
}

/// First header whose lowercased text contains `needle`.
fn locate(header: &[String], needle: &str) -> Option<usize> {
    header
        .iter()
        .position(|h| h.trim().to_lowercase().contains(needle))
}

fn locate_exact(header: &[String], needle: &str) -> Option<usize> {
    header
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(needle))
}

/// The data region runs while the ordinal column stays numeric.
fn is_ordinal(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok()
}

fn cell_to_string(cell: &Data) -> String {
    calamine::DataType::as_string(cell).unwrap_or_else(|| cell.to_string())
}

fn dictionary_error(source_label: &str, message: impl Into<String>) -> PipelineError {
    PipelineError::Dictionary {
        source_label: source_label.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn sheet() -> Vec<Vec<String>> {
        vec![
            row(&["Dicionário de Dados do Censo Escolar"]),
            row(&[]),
            row(&["N", "Nome da Variável", "Descrição da Variável", "Tipo", "Categoria"]),
            row(&["1", "NU_ANO_CENSO", "Ano do Censo", "Num", ""]),
            row(&["2", "QT_MAT_ESP ", "Matrículas da Educação Especial", "Num", "Escola"]),
            row(&["", "IGNORED", "past the data region", "Char", ""]),
            row(&["nota", "IGNORED_TOO", "also past it", "Char", ""]),
        ]
    }

    #[test]
    fn parses_fields_below_the_offset_header() {
        let fields = parse_rows(&sheet(), "test.xlsx", 2).unwrap();
        assert_eq!(fields.len(), 2);

        assert_eq!(fields[0].name, "NU_ANO_CENSO");
        assert_eq!(fields[0].description, "Ano do Censo");
        assert_eq!(fields[0].declared_type, "Num");
        assert_eq!(fields[0].category, None);

        // Raw names are preserved verbatim; normalization belongs to the
        // schema resolver.
        assert_eq!(fields[1].name, "QT_MAT_ESP ");
        assert_eq!(fields[1].category.as_deref(), Some("Escola"));
    }

    #[test]
    fn data_region_ends_at_first_non_numeric_ordinal() {
        let fields = parse_rows(&sheet(), "test.xlsx", 2).unwrap();
        assert!(fields.iter().all(|f| !f.name.starts_with("IGNORED")));
    }

    #[test]
    fn header_offset_beyond_sheet_is_a_dictionary_error() {
        let err = parse_rows(&sheet(), "test.xlsx", 40).unwrap_err();
        assert!(matches!(err, PipelineError::Dictionary { .. }));
    }

    #[test]
    fn float_ordinals_from_spreadsheet_cells_count_as_numeric() {
        let mut rows = sheet();
        rows[3][0] = "1.0".to_string();
        let fields = parse_rows(&rows, "test.xlsx", 2).unwrap();
        assert_eq!(fields[0].name, "NU_ANO_CENSO");
    }
}
