//! Option lists for the four serving filters.

use std::collections::BTreeSet;

use crate::models::TrainingConfig;
use crate::table::{HistoricalRecord, HistoricalTable};

/// Sorted, de-duplicated filter values over the serving population.
pub struct Catalog<'a> {
    table: &'a HistoricalTable,
    modality: &'a str,
    min_seats: u32,
}

impl<'a> Catalog<'a> {
    pub fn new(table: &'a HistoricalTable, config: &'a TrainingConfig) -> Self {
        Self {
            table,
            modality: &config.open_competition_modality,
            min_seats: config.min_seats,
        }
    }

    fn collect<F, G>(&self, keep: F, field: G) -> Vec<String>
    where
        F: Fn(&HistoricalRecord) -> bool,
        G: Fn(&'a HistoricalRecord) -> Option<&'a String>,
    {
        self.table
            .iter()
            .filter(|r| r.in_population(self.modality, self.min_seats) && keep(*r))
            .filter_map(field)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn institutions(&self) -> Vec<String> {
        self.collect(|_| true, |r| r.record.sg_ies.as_ref())
    }

    pub fn courses(&self, institution: &str) -> Vec<String> {
        self.collect(
            |r| r.record.sg_ies.as_deref() == Some(institution),
            |r| r.record.no_curso.as_ref(),
        )
    }

    fn offer(r: &HistoricalRecord, institution: &str, course: &str) -> bool {
        r.record.sg_ies.as_deref() == Some(institution)
            && r.record.no_curso.as_deref() == Some(course)
    }

    pub fn degrees(&self, institution: &str, course: &str) -> Vec<String> {
        self.collect(
            |r| Self::offer(r, institution, course),
            |r| r.record.ds_grau.as_ref(),
        )
    }

    pub fn shifts(&self, institution: &str, course: &str) -> Vec<String> {
        self.collect(
            |r| Self::offer(r, institution, course),
            |r| r.record.ds_turno.as_ref(),
        )
    }
}
