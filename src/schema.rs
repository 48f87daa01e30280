//! Versioned column mappings for the published cut-off sheets.
//!
//! The published layout changed over the years: older sheets carry the year and
//! the edition number in separate columns and name the seat count
//! `QT_VAGAS_OFERTADAS`, newer ones ship a ready `EDICAO` column. Each known
//! layout is a [`ColumnMapping`] entry; [`detect`] picks the entry matching a
//! sheet's headers so layout drift is reported instead of silently branched on.

use crate::error::SchemaError;
use crate::source::{Cell, RawSheet};

/// Columns dropped from every layout when present.
pub const DROPPED_COLUMNS: &[&str] = &[
    "NO_MUNICIPIO_CAMPUS",
    "NU_ANO",
    "TP_MODALIDADE",
    "DS_REGIAO_CAMPUS",
    "NU_PERCENTUAL_BONUS",
    "DS_ORGANIZACAO_ACADEMICA",
    "TP_MOD_CONCORRENCIA",
    "CO_CAMPUS",
    "TIPO_CONCORRENCIA",
    "NU_EDICAO",
    "SG_UF_CAMPUS",
    "DS_CATEGORIA_ADM",
];

/// Renames applied to the raw (upper-case) header names.
const RAW_RENAMES: &[(&str, &str)] = &[("QT_VAGAS_OFERTADAS", "qt_vagas_concorrencia")];

/// Renames applied once headers are lower-cased.
const CANONICAL_RENAMES: &[(&str, &str)] = &[("co_ies_curso", "co_curso")];

pub const EDITION_COLUMN: &str = "EDICAO";
pub const YEAR_COLUMN: &str = "NU_ANO";
pub const EDITION_NUMBER_COLUMN: &str = "NU_EDICAO";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaShape {
    /// Year and edition number in separate columns; no edition identifier.
    SplitEdition,
    /// Edition identifier shipped as its own column.
    EditionColumn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditionSource {
    Synthesized {
        year: &'static str,
        number: &'static str,
    },
    Column(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnMapping {
    pub version: u32,
    pub shape: SchemaShape,
    pub edition: EditionSource,
    pub raw_renames: &'static [(&'static str, &'static str)],
    pub dropped: &'static [&'static str],
    pub canonical_renames: &'static [(&'static str, &'static str)],
}

pub const COLUMN_MAPPINGS: &[ColumnMapping] = &[
    ColumnMapping {
        version: 1,
        shape: SchemaShape::SplitEdition,
        edition: EditionSource::Synthesized {
            year: YEAR_COLUMN,
            number: EDITION_NUMBER_COLUMN,
        },
        raw_renames: RAW_RENAMES,
        dropped: DROPPED_COLUMNS,
        canonical_renames: CANONICAL_RENAMES,
    },
    ColumnMapping {
        version: 2,
        shape: SchemaShape::EditionColumn,
        edition: EditionSource::Column(EDITION_COLUMN),
        raw_renames: RAW_RENAMES,
        dropped: DROPPED_COLUMNS,
        canonical_renames: CANONICAL_RENAMES,
    },
];

fn header_key(header: &str) -> String {
    header.trim().to_uppercase()
}

fn position(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| header_key(h) == name.to_uppercase())
}

/// Find the mapping whose layout matches the sheet headers.
pub fn detect(headers: &[String]) -> Result<&'static ColumnMapping, SchemaError> {
    let shape = if position(headers, EDITION_COLUMN).is_some() {
        SchemaShape::EditionColumn
    } else if position(headers, YEAR_COLUMN).is_some()
        && position(headers, EDITION_NUMBER_COLUMN).is_some()
    {
        SchemaShape::SplitEdition
    } else {
        return Err(SchemaError::MissingEdition);
    };

    COLUMN_MAPPINGS
        .iter()
        .find(|mapping| mapping.shape == shape)
        .ok_or(SchemaError::MissingEdition)
}

/// A sheet whose headers follow the canonical lower-case names.
#[derive(Debug, Clone)]
pub struct MappedSheet {
    pub version: u32,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl MappedSheet {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

impl ColumnMapping {
    /// Rewrite a raw sheet into canonical columns. The steps run in a fixed
    /// order: edition, raw renames, drops, case folding, canonical renames.
    pub fn apply(&self, sheet: RawSheet) -> Result<MappedSheet, SchemaError> {
        let RawSheet { mut headers, mut rows } = sheet;

        if let EditionSource::Synthesized { year, number } = self.edition {
            let year_idx = position(&headers, year).ok_or(SchemaError::MissingEdition)?;
            let number_idx = position(&headers, number).ok_or(SchemaError::MissingEdition)?;

            for row in rows.iter_mut() {
                let part = |idx: usize| {
                    row.get(idx)
                        .and_then(Cell::as_text)
                        .unwrap_or_default()
                        .trim()
                        .to_string()
                };
                let edition = format!("{}_{}", part(year_idx), part(number_idx)).replace('/', "_");
                row.insert(0, Cell::Text(edition));
            }
            headers.insert(0, EDITION_COLUMN.to_string());
        }

        for (legacy, canonical) in self.raw_renames {
            if position(&headers, canonical).is_some() {
                continue;
            }
            if let Some(idx) = position(&headers, legacy) {
                headers[idx] = canonical.to_string();
            }
        }

        let kept: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !self.dropped.contains(&header_key(h).as_str()))
            .map(|(idx, _)| idx)
            .collect();

        let mut headers: Vec<String> = kept
            .iter()
            .map(|&idx| headers[idx].trim().to_lowercase())
            .collect();

        for (legacy, canonical) in self.canonical_renames {
            if let Some(idx) = headers.iter().position(|h| h == legacy) {
                headers[idx] = canonical.to_string();
            }
        }

        let rows = rows
            .into_iter()
            .map(|row| {
                kept.iter()
                    .map(|&idx| row.get(idx).cloned().unwrap_or(Cell::Empty))
                    .collect()
            })
            .collect();

        Ok(MappedSheet {
            version: self.version,
            headers,
            rows,
        })
    }
}
