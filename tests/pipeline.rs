use approx::assert_relative_eq;
use sisu_cutoff::dataset::TrainingDatasetBuilder;
use sisu_cutoff::error::{FileError, IngestError, PipelineError, PredictError, SchemaError};
use sisu_cutoff::ingest::FileIngestor;
use sisu_cutoff::pipeline::{build_historical_table, train_model, Consolidation};
use sisu_cutoff::regressor::{BoostedStumps, Regressor};
use sisu_cutoff::storage::{read_historical_table, write_historical_table};
use sisu_cutoff::{CourseQuery, CutoffPredictor, TrainingConfig};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const HEADER: &str = "EDICAO;CO_IES;NO_IES;SG_IES;NO_CAMPUS;CO_IES_CURSO;NO_CURSO;DS_GRAU;DS_TURNO;\
DS_MOD_CONCORRENCIA;QT_VAGAS_CONCORRENCIA;QT_INSCRICAO;NU_NOTACORTE;SG_UF_CAMPUS";

fn write_source(dir: &Path, name: &str, rows: &[&str]) {
    let mut content = String::from(HEADER);
    for row in rows {
        content.push('\n');
        content.push_str(row);
    }
    fs::write(dir.join(name), content).unwrap();
}

fn ingestor() -> FileIngestor {
    FileIngestor::new(vec!["_notasdecorte.csv".to_string()])
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_source(
        dir.path(),
        "2022_notasdecorte.csv",
        &[
            "2022_1;1;Universidade Federal ;uf;Sede;10;Medicina;Bacharelado;Integral;AMPLA CONCORRÊNCIA;20;1000;650,0;RJ",
            "2022_1;1;Universidade Federal;UF;Sede;10;Medicina;Bacharelado;Integral;Cota;20;300;600.0;RJ",
        ],
    );
    write_source(
        dir.path(),
        "2023_notasdecorte.csv",
        &[
            "2023_1;1;Universidade Federal;UF;Sede;10;Medicina;Bacharelado;Integral;AMPLA CONCORRÊNCIA;20;1200;700.0;RJ",
            "2023_1;1;Universidade Federal;UF;Sede;10;Medicina;Bacharelado;Integral;Cota;20;350;610.0;RJ",
            "2023_1;1;Universidade Federal;UF;Sede;20;Direito;Bacharelado;Noturno;AMPLA CONCORRÊNCIA;40;900;720.0;RJ",
            "2023_1;1;Universidade Federal;UF;Sede;30;Letras;Licenciatura;Noturno;AMPLA CONCORRÊNCIA;30;100;-;RJ",
        ],
    );
    dir
}

async fn consolidate_fixture(dir: &TempDir) -> Consolidation {
    build_historical_table(&ingestor(), dir.path()).await.unwrap()
}

#[tokio::test]
async fn two_editions_produce_previous_edition_features() {
    let dir = fixture();
    let consolidation = consolidate_fixture(&dir).await;

    let second = consolidation
        .table
        .iter()
        .find(|r| {
            r.edition().to_string() == "2023_1"
                && r.record.no_curso.as_deref() == Some("MEDICINA")
                && r.record.ds_mod_concorrencia.as_deref() == Some("AMPLA CONCORRÊNCIA")
        })
        .unwrap();

    assert_eq!(second.chave_curso, "1_10_BACHARELADO_INTEGRAL");
    assert_eq!(second.lags.nota_edicao_anterior, Some(650.0));
    assert_eq!(second.lags.vagas_edicao_anterior, Some(20));
    assert_eq!(second.lags.inscritos_edicao_anterior, Some(1000));
    assert_relative_eq!(second.lags.demanda_anterior, 1000.0 / 21.0);
    assert_eq!(second.lags.tendencia_nota, 0.0);
}

#[tokio::test]
async fn unparseable_scores_are_counted_and_kept_out() {
    let dir = fixture();
    let consolidation = consolidate_fixture(&dir).await;
    let report = &consolidation.report;

    assert_eq!(report.ingested.len(), 2);
    assert!(report.failed.is_empty());
    assert_eq!(report.rows_read(), 6);
    assert_eq!(report.rows_kept(), 5);
    assert_eq!(report.rows_rejected(), 1);

    let rejected = &report.ingested[1].sheet.rejected;
    assert_eq!(rejected.samples[0].line, 5);
    assert_eq!(rejected.samples[0].raw_score, "-");
    assert!(consolidation
        .table
        .iter()
        .all(|r| r.record.no_curso.as_deref() != Some("LETRAS")));
}

#[tokio::test]
async fn single_edition_course_is_displayed_but_not_trained_on() {
    let dir = fixture();
    let table = consolidate_fixture(&dir).await.table;

    assert!(table
        .iter()
        .any(|r| r.record.no_curso.as_deref() == Some("DIREITO")));

    let dataset = TrainingDatasetBuilder::from_config(&TrainingConfig::default())
        .build(&table)
        .unwrap();
    assert_eq!(dataset.len(), 1);
    assert_eq!(dataset.targets, vec![700.0]);
}

#[tokio::test]
async fn file_without_score_column_is_skipped() {
    let dir = fixture();
    fs::write(
        dir.path().join("2024_notasdecorte.csv"),
        "EDICAO;CO_IES;QT_VAGAS_CONCORRENCIA\n2024_1;1;20",
    )
    .unwrap();

    let report = consolidate_fixture(&dir).await.report;
    assert_eq!(report.ingested.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].file_name, "2024_notasdecorte.csv");
    assert!(matches!(
        report.failed[0].error,
        FileError::Schema(SchemaError::MissingColumn("nu_notacorte"))
    ));
}

#[tokio::test]
async fn directory_where_every_file_fails_builds_no_table() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("2024_notasdecorte.csv"),
        "EDICAO;CO_IES;QT_VAGAS_CONCORRENCIA\n2024_1;1;20",
    )
    .unwrap();

    let result = build_historical_table(&ingestor(), dir.path()).await;
    match result {
        Err(PipelineError::Ingest(IngestError::NoUsableFiles { failed, .. })) => {
            assert_eq!(failed, vec!["2024_notasdecorte.csv"]);
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(consolidation) => panic!(
            "expected a failed run, got a table with {} rows",
            consolidation.table.len()
        ),
    }
}

#[tokio::test]
async fn directory_without_sources_aborts_the_run() {
    let dir = TempDir::new().unwrap();
    let result = build_historical_table(&ingestor(), dir.path()).await;
    assert!(matches!(
        result,
        Err(PipelineError::Ingest(IngestError::NoSourceFiles { .. }))
    ));
}

#[tokio::test]
async fn stored_table_trains_and_serves() {
    let dir = fixture();
    let table = consolidate_fixture(&dir).await.table;

    let table_path = dir.path().join("processed").join("final_data.parquet");
    write_historical_table(&table, &table_path).unwrap();
    let table = read_historical_table(&table_path).unwrap();

    let config = TrainingConfig {
        n_estimators: 10,
        min_samples_leaf: 1,
        ..TrainingConfig::default()
    };
    let (model, summary) = train_model(&table, &config).unwrap();
    assert_eq!(summary.rows, 1);
    assert_eq!(summary.features, 10);

    let model_path = dir.path().join("saved_models").join("sisu_predictor.json");
    model.save_json(&model_path).unwrap();
    let model = BoostedStumps::from_json(&model_path).unwrap();
    assert_eq!(model.name(), "sisu_predictor");

    let predictor = CutoffPredictor::new(Arc::new(table), Arc::new(model), &config).unwrap();
    let prediction = predictor
        .predict(&CourseQuery::new("UF", "Medicina", "Bacharelado", "Integral"))
        .unwrap();

    // One training row: the model can only learn its target
    assert_relative_eq!(prediction.predicted_score, 700.0, epsilon = 1e-6);
    assert_relative_eq!(prediction.last_score, 700.0);
    assert_eq!(prediction.history.len(), 2);

    let missing = predictor.predict(&CourseQuery::new("UF", "Odontologia", "Bacharelado", "Integral"));
    assert!(matches!(missing, Err(PredictError::NoHistory(_))));
}
