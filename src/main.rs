use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use querypilot::{
    PipelineConfig, PipelineContext, QueryPipeline, SafetyValidator, SchemaCatalog,
    SqliteDatabase,
};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Natural-language questions to validated SQL over a SQLite database
#[derive(Parser)]
#[command(name = "querypilot")]
#[command(about = "Translate questions into safe SELECT statements and run them")]
struct Args {
    /// SQLite database file
    #[arg(short, long)]
    database: PathBuf,

    /// Use a JSON catalog snapshot instead of introspecting the database
    #[arg(long)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a question
    Ask {
        question: String,

        /// Stop after validation, do not execute
        #[arg(long)]
        dry_run: bool,
    },
    /// List catalog tables
    Tables,
    /// Show the columns and relations of one table
    Describe { table: String },
    /// Run the safety validator on a SQL string
    Validate { sql: String },
    /// Write the introspected catalog as a JSON snapshot
    Snapshot { output: PathBuf },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("querypilot=info")),
        )
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = PipelineConfig::from_env().context("invalid QUERYPILOT_* configuration")?;

    let database = SqliteDatabase::open(&args.database)
        .with_context(|| format!("failed to open {}", args.database.display()))?
        .with_timeout(Duration::from_millis(config.execution_timeout_ms));

    let catalog = match &args.catalog {
        Some(path) => SchemaCatalog::load_json(path)
            .with_context(|| format!("failed to load catalog {}", path.display()))?,
        None => SchemaCatalog::introspect(&database)?,
    };
    info!("Catalog loaded: {} tables", catalog.tables().len());

    let output = match args.command {
        Command::Ask { question, dry_run } => {
            let pipeline = QueryPipeline::new(config)?;
            let ctx = PipelineContext::new(&catalog, &database).with_probe(&database);
            let outcome = if dry_run {
                pipeline.plan(&question, &ctx)
            } else {
                pipeline.handle(&question, &ctx)
            };
            json!({
                "sql": outcome.sql,
                "confidence": outcome.confidence,
                "error": outcome.reason(),
                "rows": outcome.rows,
                "corrections": outcome.corrections,
                "intent": outcome.intent,
            })
        }
        Command::Tables => json!(catalog.tables()),
        Command::Describe { table } => {
            let schema = catalog
                .table(&table)
                .with_context(|| format!("table not in catalog: {}", table))?;
            json!({
                "name": schema.name,
                "columns": schema.columns,
                "relations": catalog
                    .relations()
                    .iter()
                    .filter(|fk| {
                        fk.from_table.eq_ignore_ascii_case(&schema.name)
                            || fk.to_table.eq_ignore_ascii_case(&schema.name)
                    })
                    .collect::<Vec<_>>(),
            })
        }
        Command::Validate { sql } => match SafetyValidator::new().validate(&sql, &catalog) {
            Ok(()) => json!({ "accepted": true }),
            Err(reason) => json!({ "accepted": false, "reason": reason.to_string() }),
        },
        Command::Snapshot { output } => {
            catalog.save_json(&output)?;
            json!({ "written": output })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
