use crate::models::NormalizedRecord;
use std::cmp::Ordering;

/// A normalized record tagged with its cross-edition course key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRecord {
    pub chave_curso: String,
    pub record: NormalizedRecord,
}

impl KeyedRecord {
    pub fn new(record: NormalizedRecord) -> Self {
        Self {
            chave_curso: record.course_key(),
            record,
        }
    }

    /// Ordering used for lag computation: course key, modality, edition.
    pub fn lag_order(&self, other: &Self) -> Ordering {
        self.chave_curso
            .cmp(&other.chave_curso)
            .then_with(|| {
                self.record
                    .ds_mod_concorrencia
                    .cmp(&other.record.ds_mod_concorrencia)
            })
            .then_with(|| self.record.edicao.cmp(&other.record.edicao))
    }
}

/// Concatenate normalized sheets, key every row and sort for lag computation.
/// The sort is stable, so input order only breaks exact ties.
pub fn consolidate<I>(sheets: I) -> Vec<KeyedRecord>
where
    I: IntoIterator<Item = Vec<NormalizedRecord>>,
{
    let mut rows: Vec<KeyedRecord> = sheets
        .into_iter()
        .flatten()
        .map(KeyedRecord::new)
        .collect();

    rows.sort_by(KeyedRecord::lag_order);
    rows
}
