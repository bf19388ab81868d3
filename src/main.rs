use spts::config::SptsConfig;
use spts::embedding::OpenAiEmbedder;
use spts::executor::QueryOutcome;
use spts::grounding::GroundingStrategy;
use spts::llm::LlmClient;
use spts::mapping::AliasMapping;
use spts::pipeline::{build_grounder, ComparisonReport, Pipeline};
use spts::scanner;
use spts::synonyms::{CanonicalValue, SynonymGraphBuilder};
use spts::vector_store::AliasIndex;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spts")]
#[command(about = "Value-level grounding for text-to-SQL: baseline vs. grounded generation")]
#[command(version)]
struct Args {
    /// SQLite database (or set SPTS_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Alias mapping artifact (or set SPTS_MAPPING_PATH)
    #[arg(long, global = true)]
    mapping: Option<PathBuf>,

    /// Alias vector index artifact (or set SPTS_INDEX_PATH)
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the most frequent values of one column to CSV
    Scan {
        /// Column to profile
        column: String,

        /// Table to profile (or set SPTS_TABLE)
        #[arg(long)]
        table: Option<String>,

        #[arg(long, default_value_t = 100)]
        limit: usize,

        #[arg(short, long, default_value = "dirty_values.csv")]
        output: PathBuf,
    },
    /// Build the alias mapping from distinct column values
    BuildGraph {
        /// Table to scan (or set SPTS_TABLE)
        #[arg(long)]
        table: Option<String>,

        /// Columns to scan; defaults to every text column
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,

        /// Distinct values per column
        #[arg(long, default_value_t = 15)]
        limit: usize,

        /// Read values from the first column of this CSV instead of the database
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Extend the existing mapping instead of replacing it
        #[arg(long)]
        merge: bool,
    },
    /// Embed every alias of the mapping into a vector index
    BuildIndex,
    /// Ground a question and print the result as JSON
    Ground {
        question: String,

        /// lexical or semantic (or set SPTS_GROUNDING)
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Generate and run baseline and grounded SQL side by side
    Ask {
        question: String,

        /// lexical or semantic (or set SPTS_GROUNDING)
        #[arg(long)]
        strategy: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = SptsConfig::from_env().context("Invalid configuration")?;
    if let Some(db) = args.db {
        config.db_path = db;
    }
    if let Some(mapping) = args.mapping {
        config.mapping_path = mapping;
    }
    if let Some(index) = args.index {
        config.index_path = index;
    }

    match args.command {
        Commands::Scan { column, table, limit, output } => {
            let table = table.unwrap_or_else(|| config.table.clone());
            scan(&config, &table, &column, limit, output)
        }
        Commands::BuildGraph { table, columns, limit, csv, merge } => {
            let table = table.unwrap_or_else(|| config.table.clone());
            build_graph(&config, &table, columns, limit, csv, merge).await
        }
        Commands::BuildIndex => build_index(&config).await,
        Commands::Ground { question, strategy } => {
            apply_strategy(&mut config, strategy)?;
            ground(&config, &question).await
        }
        Commands::Ask { question, strategy, json } => {
            apply_strategy(&mut config, strategy)?;
            ask(&config, &question, json).await
        }
    }
}

fn apply_strategy(config: &mut SptsConfig, strategy: Option<String>) -> Result<()> {
    if let Some(strategy) = strategy {
        config.strategy = strategy.parse::<GroundingStrategy>()?;
    }
    Ok(())
}

fn scan(config: &SptsConfig, table: &str, column: &str, limit: usize, output: PathBuf) -> Result<()> {
    let conn = scanner::open_read_only(&config.db_path)?;
    let rows = scanner::value_frequencies(&conn, table, column, limit)?;
    scanner::write_frequencies_csv(&output, column, &rows)?;
    println!("Scanned top {} values from '{}.{}' into {}", rows.len(), table, column, output.display());
    Ok(())
}

async fn build_graph(
    config: &SptsConfig,
    table: &str,
    columns: Vec<String>,
    limit: usize,
    csv: Option<PathBuf>,
    merge: bool,
) -> Result<()> {
    if !config.has_api_key() {
        bail!("Set API_KEY (or OPENAI_API_KEY) to generate aliases");
    }

    let values: Vec<CanonicalValue> = match csv {
        Some(path) => {
            let column = columns.first().cloned().unwrap_or_else(|| "value".to_string());
            info!("Reading canonical values from {:?}", path);
            scanner::read_values_csv(&path, table, &column, Some(limit))?
        }
        None => {
            let conn = scanner::open_read_only(&config.db_path)?;
            let columns = if columns.is_empty() {
                scanner::text_columns(&conn, table)?
            } else {
                columns
            };
            let mut values = Vec::new();
            for column in &columns {
                info!("Profiling {}.{}...", table, column);
                values.extend(scanner::scan_distinct_values(&conn, table, column, limit)?);
            }
            values
        }
    };

    let oracle = Arc::new(LlmClient::new(
        config.api_key.clone(),
        config.llm_model.clone(),
        config.llm_base_url.clone(),
        config.oracle_timeout,
    )?);
    let builder = SynonymGraphBuilder::new(oracle);

    let mut mapping = if merge {
        AliasMapping::load_or_empty(&config.mapping_path)
    } else {
        AliasMapping::new()
    };
    let stats = builder.extend(&mut mapping, &values).await;
    mapping.save(&config.mapping_path)?;

    println!(
        "Value-Level Knowledge Graph saved to {} ({} aliases, {} values, {} oracle failures)",
        config.mapping_path.display(),
        mapping.len(),
        stats.values,
        stats.oracle_failures
    );
    Ok(())
}

async fn build_index(config: &SptsConfig) -> Result<()> {
    let mapping = AliasMapping::load(&config.mapping_path)?;
    let embedder = OpenAiEmbedder::new(
        config.embedding_api_key.clone(),
        config.embedding_base_url.clone(),
        config.embedding_model.clone(),
        config.oracle_timeout,
    )?;

    let index = AliasIndex::build(&mapping, &embedder).await;
    if index.is_empty() && !mapping.is_empty() {
        bail!("No alias could be embedded; check EMBEDDING_API_KEY and EMBEDDING_BASE_URL");
    }
    index.save(&config.index_path)?;
    println!(
        "Alias index saved to {} ({} documents, dimension {}, built {})",
        config.index_path.display(),
        index.len(),
        index.dimension(),
        index.built_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

async fn ground(config: &SptsConfig, question: &str) -> Result<()> {
    let grounder = build_grounder(config)?;
    let result = grounder.ground(question).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn ask(config: &SptsConfig, question: &str, json: bool) -> Result<()> {
    if !config.has_api_key() {
        bail!("Set API_KEY (or OPENAI_API_KEY) to generate SQL");
    }

    let pipeline = Pipeline::from_config(config)?;
    let report = pipeline.compare(question).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &ComparisonReport) {
    println!("\n{}", "=".repeat(80));
    println!(" Question: {}", report.question);
    println!(" Grounding: {}", report.strategy);
    println!("{}", "=".repeat(80));

    if let Some(ref error) = report.grounding_error {
        println!("\n Grounding unavailable: {}", error);
    }
    if report.grounding.applied_mappings.is_empty() {
        println!("\n No mappings applied");
    } else {
        println!("\n Applied mappings:");
        for mapping in &report.grounding.applied_mappings {
            match mapping.similarity_distance {
                Some(distance) => println!(
                    "   '{}' -> '{}' ({:?}, distance {:.3})",
                    mapping.original, mapping.grounded, mapping.kind, distance
                ),
                None => println!("   '{}' -> '{}' ({:?})", mapping.original, mapping.grounded, mapping.kind),
            }
        }
    }
    if report.grounding.grounded_text != report.question {
        println!("\n Grounded question: {}", report.grounding.grounded_text);
    }

    for (label, run) in [("Baseline", &report.baseline), ("Grounded", &report.grounded)] {
        println!("\n{}", "-".repeat(80));
        println!(" {}", label);
        println!("{}", "-".repeat(80));
        println!("{}", run.sql.sql);
        match &run.result {
            QueryOutcome::Rows { columns, rows } => {
                println!("\n {} row(s)", rows.len());
                println!("   {}", columns.join(" | "));
                for row in rows.iter().take(20) {
                    let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                    println!("   {}", cells.join(" | "));
                }
            }
            QueryOutcome::Error { message } => println!("\n Error: {}", message),
        }
    }
    println!();
}
