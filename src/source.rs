use crate::error::SourceError;
use calamine::{open_workbook_auto, Data, Reader};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Sheet holding the cut-off table in the published workbooks.
pub const DATA_SHEET_INDEX: usize = 1;

/// One spreadsheet cell as read from a source file.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Text rendering. Integral numbers lose their fractional part so codes
    /// read from numeric cells match codes read from text cells.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(text) if text.trim().is_empty() => None,
            Cell::Text(text) => Some(text.clone()),
            Cell::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                Some(format!("{}", *value as i64))
            }
            Cell::Number(value) => Some(value.to_string()),
        }
    }

    /// Numeric coercion; accepts a decimal comma.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Number(value) if value.is_finite() => Some(*value),
            Cell::Number(_) => None,
            Cell::Text(text) => text
                .trim()
                .replace(',', ".")
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite()),
        }
    }

    /// Non-negative integer coercion for seat and applicant counts. Text in
    /// pt-BR grouping (`1.200`, `12.345.678`) reads as a whole number.
    pub fn as_count(&self) -> Option<u32> {
        let value = match self {
            Cell::Text(text) if grouped_thousands().is_match(text.trim()) => {
                text.trim().replace('.', "").parse::<f64>().ok()
            }
            _ => self.as_number(),
        };
        value
            .filter(|value| *value >= 0.0 && value.fract() == 0.0 && *value <= u32::MAX as f64)
            .map(|value| value as u32)
    }
}

fn grouped_thousands() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{1,3}(\.\d{3})+$").unwrap())
}

/// Header row plus data rows of one source file.
#[derive(Debug, Clone, Default)]
pub struct RawSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawSheet {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { headers, rows }
    }

    /// Build a sheet from string literals, mostly for tests and CSV input.
    pub fn from_strings(headers: &[&str], rows: &[Vec<&str>]) -> Self {
        let headers = headers.iter().map(|h| h.to_string()).collect();
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|value| text_cell(value)).collect())
            .collect();
        Self { headers, rows }
    }
}

fn text_cell(value: &str) -> Cell {
    if value.is_empty() {
        Cell::Empty
    } else {
        Cell::Text(value.to_string())
    }
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(text) => text_cell(text),
        Data::Float(value) => Cell::Number(*value),
        Data::Int(value) => Cell::Number(*value as f64),
        Data::Bool(value) => Cell::Text(value.to_string()),
        other => Cell::Text(other.to_string()),
    }
}

/// Reads published cut-off files into raw sheets.
#[derive(Debug, Clone, Copy)]
pub struct SourceReader {
    sheet_index: usize,
}

impl Default for SourceReader {
    fn default() -> Self {
        Self::new(DATA_SHEET_INDEX)
    }
}

impl SourceReader {
    pub fn new(sheet_index: usize) -> Self {
        Self { sheet_index }
    }

    pub fn read_file(&self, path: &Path) -> Result<RawSheet, SourceError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("xlsx") | Some("xlsm") | Some("xls") | Some("ods") => self.read_workbook(path),
            Some("csv") => self.read_csv(path),
            _ => Err(SourceError::Unsupported(path.to_path_buf())),
        }
    }

    fn read_workbook(&self, path: &Path) -> Result<RawSheet, SourceError> {
        let mut workbook = open_workbook_auto(path).map_err(|e| SourceError::Workbook {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let range = workbook
            .worksheet_range_at(self.sheet_index)
            .ok_or_else(|| SourceError::MissingSheet {
                path: path.to_path_buf(),
                index: self.sheet_index,
            })?
            .map_err(|e| SourceError::Workbook {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut rows = range.rows();
        let headers: Vec<String> = match rows.next() {
            Some(header_row) => header_row
                .iter()
                .map(|cell| cell_from_data(cell).as_text().unwrap_or_default())
                .collect(),
            None => return Err(SourceError::Empty(path.to_path_buf())),
        };

        let rows = rows
            .map(|row| row.iter().map(cell_from_data).collect())
            .collect();

        Ok(RawSheet::new(headers, rows))
    }

    fn read_csv(&self, path: &Path) -> Result<RawSheet, SourceError> {
        let csv_error = |source: csv::Error| SourceError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let content = std::fs::read_to_string(path)
            .map_err(|e| csv_error(csv::Error::from(e)))?;
        let first_line = match content.lines().next() {
            Some(line) if !line.trim().is_empty() => line,
            _ => return Err(SourceError::Empty(path.to_path_buf())),
        };

        // Exports from spreadsheet tools in pt-BR locales use semicolons
        let delimiter = if first_line.matches(';').count() > first_line.matches(',').count() {
            b';'
        } else {
            b','
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            rows.push(record.iter().map(text_cell).collect());
        }

        Ok(RawSheet::new(headers, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn numeric_cells_render_codes_without_fraction() {
        assert_eq!(Cell::Number(123.0).as_text().as_deref(), Some("123"));
        assert_eq!(Cell::Number(1.5).as_text().as_deref(), Some("1.5"));
        assert_eq!(Cell::Text("   ".to_string()).as_text(), None);
    }

    #[test]
    fn number_coercion_accepts_decimal_comma() {
        assert_eq!(Cell::Text(" 650,5 ".to_string()).as_number(), Some(650.5));
        assert_eq!(Cell::Text("n/d".to_string()).as_number(), None);
        assert_eq!(Cell::Number(f64::NAN).as_number(), None);
    }

    #[test]
    fn counts_reject_negative_and_fractional_values() {
        assert_eq!(Cell::Number(20.0).as_count(), Some(20));
        assert_eq!(Cell::Text("-1".to_string()).as_count(), None);
        assert_eq!(Cell::Number(2.5).as_count(), None);
    }

    #[test]
    fn counts_accept_grouped_thousands() {
        assert_eq!(Cell::Text("1.200".to_string()).as_count(), Some(1200));
        assert_eq!(Cell::Text(" 12.345 ".to_string()).as_count(), Some(12345));
        assert_eq!(Cell::Text("1.234.567".to_string()).as_count(), Some(1_234_567));
        assert_eq!(Cell::Text("1.5".to_string()).as_count(), None);
        assert_eq!(Cell::Text("1.20".to_string()).as_count(), None);
    }

    #[test]
    fn reads_semicolon_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2023_notasdecorte.csv");
        fs::write(&path, "EDICAO;NU_NOTACORTE\n2023_1;700,5\n2023_1;\n").unwrap();

        let sheet = SourceReader::default().read_file(&path).unwrap();
        assert_eq!(sheet.headers, vec!["EDICAO", "NU_NOTACORTE"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0][1].as_number(), Some(700.5));
        assert_eq!(sheet.rows[1][1], Cell::Empty);
    }

    #[test]
    fn rejects_unknown_extensions() {
        let result = SourceReader::default().read_file(Path::new("notes.txt"));
        assert!(matches!(result, Err(SourceError::Unsupported(_))));
    }
}
