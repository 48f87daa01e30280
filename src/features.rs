//! Lag features per course/modality lineage.
//!
//! The input must already be sorted by [`KeyedRecord::lag_order`]. Lags are
//! shifted within each (`chave_curso`, `ds_mod_concorrencia`) window, so
//! "previous" is positional: a course that skipped an edition still takes its
//! last recorded edition as the previous one.

use polars::prelude::*;

use crate::consolidate::KeyedRecord;
use crate::error::FeatureError;
use crate::table::{HistoricalRecord, HistoricalTable, LagFeatures};

fn lineage() -> [Expr; 2] {
    [col("chave_curso"), col("ds_mod_concorrencia")]
}

fn skeleton_frame(skeleton: &[KeyedRecord]) -> PolarsResult<DataFrame> {
    let keys: Vec<&str> = skeleton.iter().map(|r| r.chave_curso.as_str()).collect();
    let modalities: Vec<Option<&str>> = skeleton
        .iter()
        .map(|r| r.record.ds_mod_concorrencia.as_deref())
        .collect();
    let scores: Vec<f64> = skeleton.iter().map(|r| r.record.nu_notacorte).collect();
    let seats: Vec<Option<u32>> = skeleton
        .iter()
        .map(|r| r.record.qt_vagas_concorrencia)
        .collect();
    let applicants: Vec<Option<u32>> = skeleton.iter().map(|r| r.record.qt_inscricao).collect();

    DataFrame::new(vec![
        Column::new("chave_curso".into(), keys),
        Column::new("ds_mod_concorrencia".into(), modalities),
        Column::new("nu_notacorte".into(), scores),
        Column::new("qt_vagas_concorrencia".into(), seats),
        Column::new("qt_inscricao".into(), applicants),
    ])
}

/// Shift score, seats and applicants within each lineage, then derive trend
/// and demand. Trend and demand fall back to 0; the plain lags stay null.
fn lag_frame(frame: DataFrame) -> PolarsResult<DataFrame> {
    frame
        .lazy()
        .with_columns([
            col("nu_notacorte")
                .shift(lit(1))
                .over(lineage())
                .alias("nota_edicao_anterior"),
            col("nu_notacorte")
                .shift(lit(2))
                .over(lineage())
                .alias("nota_segunda_anterior"),
            col("qt_vagas_concorrencia")
                .shift(lit(1))
                .over(lineage())
                .alias("vagas_edicao_anterior"),
            col("qt_inscricao")
                .shift(lit(1))
                .over(lineage())
                .alias("inscritos_edicao_anterior"),
        ])
        .with_columns([
            (col("nota_edicao_anterior") - col("nota_segunda_anterior"))
                .fill_null(lit(0.0))
                .alias("tendencia_nota"),
            (col("inscritos_edicao_anterior").cast(DataType::Float64)
                / (col("vagas_edicao_anterior").cast(DataType::Float64) + lit(1.0)))
            .fill_null(lit(0.0))
            .alias("demanda_anterior"),
        ])
        .select([
            col("nota_edicao_anterior"),
            col("vagas_edicao_anterior"),
            col("tendencia_nota"),
            col("inscritos_edicao_anterior"),
            col("demanda_anterior"),
        ])
        .collect()
}

fn floats<'a>(frame: &'a DataFrame, name: &str) -> PolarsResult<&'a Float64Chunked> {
    frame.column(name)?.as_materialized_series().f64()
}

fn counts<'a>(frame: &'a DataFrame, name: &str) -> PolarsResult<&'a UInt32Chunked> {
    frame.column(name)?.as_materialized_series().u32()
}

/// Compute lag features for a sorted skeleton and produce the historical table.
pub fn compute_lag_features(skeleton: Vec<KeyedRecord>) -> Result<HistoricalTable, FeatureError> {
    debug_assert!(
        skeleton
            .windows(2)
            .all(|pair| pair[0].lag_order(&pair[1]).is_le()),
        "lag features need the skeleton sorted by course key, modality and edition"
    );

    if skeleton.is_empty() {
        return Ok(HistoricalTable::default());
    }

    let lags = lag_frame(skeleton_frame(&skeleton)?)?;
    let previous_score = floats(&lags, "nota_edicao_anterior")?;
    let previous_seats = counts(&lags, "vagas_edicao_anterior")?;
    let trend = floats(&lags, "tendencia_nota")?;
    let previous_applicants = counts(&lags, "inscritos_edicao_anterior")?;
    let demand = floats(&lags, "demanda_anterior")?;

    let records = skeleton
        .into_iter()
        .zip(previous_score)
        .zip(previous_seats)
        .zip(trend)
        .zip(previous_applicants)
        .zip(demand)
        .map(
            |(((((row, nota), vagas), tendencia), inscritos), demanda)| HistoricalRecord {
                chave_curso: row.chave_curso,
                record: row.record,
                lags: LagFeatures {
                    nota_edicao_anterior: nota,
                    vagas_edicao_anterior: vagas,
                    tendencia_nota: tendencia.unwrap_or(0.0),
                    inscritos_edicao_anterior: inscritos,
                    demanda_anterior: demanda.unwrap_or(0.0),
                },
            },
        )
        .collect();

    Ok(HistoricalTable::new(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::consolidate;
    use crate::models::{Edition, NormalizedRecord};
    use approx::assert_relative_eq;

    fn record(edition: &str, course: &str, score: f64, seats: Option<u32>, applicants: Option<u32>) -> NormalizedRecord {
        NormalizedRecord {
            edicao: Edition::parse(edition),
            co_ies: Some("1".to_string()),
            no_ies: None,
            sg_ies: Some("UNI".to_string()),
            no_campus: None,
            co_curso: Some(course.to_string()),
            no_curso: Some("CURSO".to_string()),
            ds_grau: Some("BACHARELADO".to_string()),
            ds_turno: Some("INTEGRAL".to_string()),
            ds_mod_concorrencia: Some("AMPLA CONCORRÊNCIA".to_string()),
            qt_vagas_concorrencia: seats,
            qt_inscricao: applicants,
            nu_notacorte: score,
        }
    }

    #[test]
    fn previous_score_follows_position_within_lineage() {
        let table = compute_lag_features(consolidate(vec![vec![
            record("2021_1", "10", 600.0, Some(20), Some(900)),
            record("2022_1", "10", 650.0, Some(20), Some(1000)),
            record("2023_1", "10", 700.0, Some(20), Some(1200)),
            record("2023_1", "20", 500.0, Some(30), Some(90)),
        ]]))
        .unwrap();

        let rows = table.records();
        assert_eq!(rows[0].lags.nota_edicao_anterior, None);
        assert_eq!(rows[1].lags.nota_edicao_anterior, Some(600.0));
        assert_eq!(rows[2].lags.nota_edicao_anterior, Some(650.0));
        // A new lineage starts without history
        assert_eq!(rows[3].lags.nota_edicao_anterior, None);
        assert_eq!(rows[3].lags.vagas_edicao_anterior, None);
        assert_eq!(rows[3].lags.tendencia_nota, 0.0);
        assert_eq!(rows[3].lags.demanda_anterior, 0.0);
    }

    #[test]
    fn trend_needs_two_earlier_editions() {
        let table = compute_lag_features(consolidate(vec![vec![
            record("2021_1", "10", 600.0, Some(20), Some(900)),
            record("2022_1", "10", 650.0, Some(20), Some(1000)),
            record("2023_1", "10", 700.0, Some(20), Some(1200)),
        ]]))
        .unwrap();

        let trends: Vec<f64> = table.iter().map(|r| r.lags.tendencia_nota).collect();
        assert_eq!(trends, vec![0.0, 0.0, 50.0]);
    }

    #[test]
    fn demand_divides_by_seats_plus_one() {
        let table = compute_lag_features(consolidate(vec![vec![
            record("2022_1", "10", 650.0, Some(20), Some(1000)),
            record("2023_1", "10", 700.0, Some(20), Some(1200)),
        ]]))
        .unwrap();

        let second = &table.records()[1];
        assert_relative_eq!(second.lags.demanda_anterior, 1000.0 / 21.0);
        assert_eq!(second.lags.inscritos_edicao_anterior, Some(1000));
        assert_eq!(second.lags.vagas_edicao_anterior, Some(20));
    }

    #[test]
    fn zero_seats_never_divides_by_zero() {
        let table = compute_lag_features(consolidate(vec![vec![
            record("2022_1", "10", 650.0, Some(0), Some(40)),
            record("2023_1", "10", 700.0, Some(0), Some(50)),
        ]]))
        .unwrap();
        assert_relative_eq!(table.records()[1].lags.demanda_anterior, 40.0);
    }

    #[test]
    fn missing_counts_propagate_but_demand_defaults_to_zero() {
        let table = compute_lag_features(consolidate(vec![vec![
            record("2022_1", "10", 650.0, None, Some(1000)),
            record("2023_1", "10", 700.0, Some(20), None),
        ]]))
        .unwrap();

        let lags = table.records()[1].lags;
        assert_eq!(lags.nota_edicao_anterior, Some(650.0));
        assert_eq!(lags.vagas_edicao_anterior, None);
        assert_eq!(lags.inscritos_edicao_anterior, Some(1000));
        assert_eq!(lags.demanda_anterior, 0.0);
    }

    #[test]
    fn skipped_edition_still_counts_as_previous() {
        let table = compute_lag_features(consolidate(vec![vec![
            record("2019_1", "10", 610.0, Some(20), Some(500)),
            record("2023_1", "10", 700.0, Some(20), Some(1200)),
        ]]))
        .unwrap();
        assert_eq!(table.records()[1].lags.nota_edicao_anterior, Some(610.0));
    }

    #[test]
    fn modalities_of_the_same_course_do_not_share_lags() {
        let mut quota = record("2022_1", "10", 580.0, Some(5), Some(200));
        quota.ds_mod_concorrencia = Some("COTA".to_string());
        let mut quota_next = record("2023_1", "10", 590.0, Some(5), Some(210));
        quota_next.ds_mod_concorrencia = Some("COTA".to_string());

        let table = compute_lag_features(consolidate(vec![vec![
            record("2022_1", "10", 650.0, Some(20), Some(1000)),
            quota,
            record("2023_1", "10", 700.0, Some(20), Some(1200)),
            quota_next,
        ]]))
        .unwrap();

        for row in table.iter() {
            let expected = match (row.record.ds_mod_concorrencia.as_deref(), row.edition().to_string().as_str()) {
                (Some("COTA"), "2023_1") => Some(580.0),
                (_, "2023_1") => Some(650.0),
                _ => None,
            };
            assert_eq!(row.lags.nota_edicao_anterior, expected);
        }
    }

    #[test]
    fn empty_skeleton_gives_empty_table() {
        let table = compute_lag_features(Vec::new()).unwrap();
        assert!(table.is_empty());
    }
}
