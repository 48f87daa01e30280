use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use sisu_cutoff::catalog::Catalog;
use sisu_cutoff::error::PredictError;
use sisu_cutoff::ingest::{FileIngestor, IngestReport};
use sisu_cutoff::pipeline::{build_historical_table, train_model, TrainingSummary};
use sisu_cutoff::regressor::BoostedStumps;
use sisu_cutoff::storage::{read_historical_table, write_historical_table};
use sisu_cutoff::{Config, CourseQuery, CutoffPredictor};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("sisu-cutoff")
        .version("0.1")
        .about("Consolidates SISU cut-off scores and estimates the next edition's cut-off")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("consolidate")
                .about("Ingest raw cut-off files and write the historical table"),
        )
        .subcommand(Command::new("train").about("Train the cut-off regressor"))
        .subcommand(
            Command::new("predict")
                .about("Estimate the next cut-off for one offer")
                .arg(Arg::new("ies").long("ies").required(true).help("Institution acronym"))
                .arg(Arg::new("course").long("course").required(true).help("Course name"))
                .arg(Arg::new("degree").long("degree").required(true).help("Degree"))
                .arg(Arg::new("shift").long("shift").required(true).help("Shift")),
        )
        .subcommand(
            Command::new("options")
                .about("List the values available for the prediction filters")
                .arg(Arg::new("ies").long("ies").help("Institution acronym"))
                .arg(
                    Arg::new("course")
                        .long("course")
                        .requires("ies")
                        .help("Course name"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    // Load or create configuration
    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        Config::default().save_to_file(config_file)?;
        println!(
            "⚠️  Please review the data paths in {}, then run the program again.",
            config_file
        );
        return Ok(());
    };

    match matches.subcommand() {
        Some(("consolidate", _)) => run_consolidate(&config).await,
        Some(("train", _)) => run_train(&config),
        Some(("predict", args)) => run_predict(&config, args),
        Some(("options", args)) => run_options(&config, args),
        _ => unreachable!("clap requires a subcommand"),
    }
}

async fn run_consolidate(config: &Config) -> Result<()> {
    println!("📂 Reading cut-off files from: {}", config.raw_data_directory);
    println!("🔎 File suffixes: {}", config.file_suffixes.join(", "));

    let ingestor = FileIngestor::new(config.file_suffixes.clone());
    let consolidation =
        build_historical_table(&ingestor, Path::new(&config.raw_data_directory)).await?;
    let report = &consolidation.report;

    for file in &report.ingested {
        println!(
            "📄 {}: {} rows kept, {} rejected (layout v{})",
            file.file_name,
            file.sheet.records.len(),
            file.sheet.rejected.count,
            file.sheet.mapping_version
        );
    }
    for file in &report.failed {
        println!("❌ {}: {}", file.file_name, file.error);
    }

    write_historical_table(&consolidation.table, &config.historical_table_path)
        .with_context(|| format!("failed to write {}", config.historical_table_path))?;

    if let Some(output_dir) = &config.output_directory {
        fs::create_dir_all(output_dir)?;
        generate_ingest_summary_csv(report, output_dir)?;
        generate_rejected_rows_csv(report, output_dir)?;
    }

    println!("\n📊 SUMMARY");
    println!("==========\n");
    println!("Files ingested: {}", report.ingested.len());
    println!("Files skipped: {}", report.failed.len());
    println!("Rows read: {}", report.rows_read());
    println!("Rows kept: {}", report.rows_kept());
    println!("Rows rejected (non-numeric cut-off): {}", report.rows_rejected());
    println!("\n✅ Historical table written to: {}", config.historical_table_path);
    if let Some(output_dir) = &config.output_directory {
        println!("📂 Ingestion reports: {}", output_dir);
    }
    Ok(())
}

fn run_train(config: &Config) -> Result<()> {
    println!("📂 Loading historical table: {}", config.historical_table_path);
    let table = read_historical_table(&config.historical_table_path)
        .with_context(|| format!("failed to read {}", config.historical_table_path))?;

    println!(
        "🎯 Training on modality {} with at least {} seats",
        config.training.open_competition_modality, config.training.min_seats
    );
    let (model, summary) = train_model(&table, &config.training)?;
    model.save_json(&config.model_path)?;

    if let Some(output_dir) = &config.output_directory {
        fs::create_dir_all(output_dir)?;
        generate_training_summary_csv(&summary, output_dir)?;
    }

    println!("\n📊 TRAINING SUMMARY");
    println!("===================\n");
    println!("Training rows: {}", summary.rows);
    println!("Features: {}", summary.features);
    println!("Stumps: {}", summary.stumps);
    println!("In-sample MAE: {:.2}", summary.in_sample_mae);
    println!("\n✅ Model saved to: {}", config.model_path);
    Ok(())
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> &'a str {
    args.get_one::<String>(name).map(String::as_str).unwrap_or_default()
}

fn run_predict(config: &Config, args: &ArgMatches) -> Result<()> {
    let query = CourseQuery::new(
        required(args, "ies"),
        required(args, "course"),
        required(args, "degree"),
        required(args, "shift"),
    );

    let table = read_historical_table(&config.historical_table_path)
        .with_context(|| format!("failed to read {}", config.historical_table_path))?;
    let model = BoostedStumps::from_json(&config.model_path)
        .with_context(|| format!("failed to load model {}", config.model_path))?;
    let predictor = CutoffPredictor::new(Arc::new(table), Arc::new(model), &config.training)?;

    let prediction = match predictor.predict(&query) {
        Ok(prediction) => prediction,
        Err(PredictError::NoHistory(_)) => {
            println!("❌ No historical data found for {}.", query);
            println!("   A prediction is not possible for this combination.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("\n🔮 Estimate for {}", query);
    println!("==========================================\n");
    println!("Last recorded cut-off ({}): {:.2}", prediction.edition, prediction.last_score);
    println!(
        "Estimate for the next edition: {:.2} ({:+.2})",
        prediction.predicted_score, prediction.delta
    );

    if prediction.has_trend() {
        println!("\n📈 Cut-off history:");
        for point in &prediction.history {
            println!("   {}: {:.2}", point.edition, point.cutoff);
        }
    } else {
        println!("\n⚠️  Only one edition on record, not enough history for a trend.");
    }
    Ok(())
}

fn run_options(config: &Config, args: &ArgMatches) -> Result<()> {
    let table = read_historical_table(&config.historical_table_path)
        .with_context(|| format!("failed to read {}", config.historical_table_path))?;
    let catalog = Catalog::new(&table, &config.training);

    match (args.get_one::<String>("ies"), args.get_one::<String>("course")) {
        (Some(ies), Some(course)) => {
            let query = CourseQuery::new(ies, course, "", "");
            println!("🎓 Degrees for {} at {}:", query.course, query.institution);
            print_list(&catalog.degrees(&query.institution, &query.course));
            println!("\n🕒 Shifts for {} at {}:", query.course, query.institution);
            print_list(&catalog.shifts(&query.institution, &query.course));
        }
        (Some(ies), None) => {
            let query = CourseQuery::new(ies, "", "", "");
            println!("📚 Courses at {}:", query.institution);
            print_list(&catalog.courses(&query.institution));
        }
        _ => {
            println!("🏛️  Institutions:");
            print_list(&catalog.institutions());
        }
    }
    Ok(())
}

fn print_list(values: &[String]) {
    if values.is_empty() {
        println!("   (none)");
    }
    for value in values {
        println!("   - {}", value);
    }
}

fn generate_ingest_summary_csv(report: &IngestReport, output_dir: &str) -> Result<()> {
    use csv::Writer;

    let csv_path = Path::new(output_dir).join("ingest_summary.csv");
    let mut writer = Writer::from_path(csv_path)?;

    writer.write_record([
        "File",
        "Status",
        "Layout Version",
        "Rows Read",
        "Rows Kept",
        "Rows Rejected",
        "Error",
    ])?;

    for file in &report.ingested {
        writer.write_record([
            file.file_name.clone(),
            "ingested".to_string(),
            file.sheet.mapping_version.to_string(),
            file.sheet.rows_read.to_string(),
            file.sheet.records.len().to_string(),
            file.sheet.rejected.count.to_string(),
            String::new(),
        ])?;
    }
    for file in &report.failed {
        writer.write_record([
            file.file_name.clone(),
            "failed".to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            file.error.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn generate_rejected_rows_csv(report: &IngestReport, output_dir: &str) -> Result<()> {
    use csv::Writer;

    let csv_path = Path::new(output_dir).join("rejected_rows.csv");
    let mut writer = Writer::from_path(csv_path)?;

    writer.write_record(["File", "Line", "Edition", "Raw Cut-off"])?;

    for file in &report.ingested {
        for row in &file.sheet.rejected.samples {
            writer.write_record([
                file.file_name.clone(),
                row.line.to_string(),
                row.edition.clone(),
                row.raw_score.clone(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

fn generate_training_summary_csv(summary: &TrainingSummary, output_dir: &str) -> Result<()> {
    let csv_path = Path::new(output_dir).join("training_summary.csv");
    let mut writer = csv::Writer::from_path(csv_path)?;
    writer.serialize(summary)?;
    writer.flush()?;
    Ok(())
}
