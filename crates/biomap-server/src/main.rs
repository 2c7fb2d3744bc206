//! `biomap` binary.
//!
//! Reads `biomap.toml` (or the path given with `--config`) merged with
//! `BIOMAP_*` environment variables, opens the TSV store directory, and runs
//! one of the subcommands below.

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use biomap_api::ApiState;
use biomap_core::{
  MappingStore,
  check::{self, Severity},
  query::PredictionQuery,
};
use biomap_server::{ServerConfig, open_engine, resolve_curator, router};
use biomap_store_tsv::read_table;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Biomedical mapping curation store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "biomap.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the review API over HTTP.
  Serve,
  /// Check all four stores; exits non-zero on any error-severity violation.
  Check {
    /// Fail on warnings too.
    #[arg(long)]
    strict: bool,
  },
  /// Append a TSV batch of predictions, skipping rows already known.
  Import { file: PathBuf },
  /// Drop predictions on already curated pairs and repeated prediction rows.
  Lint,
  /// Pending predictions per prefix pair.
  Summary {
    /// Only count predictions matching this text.
    #[arg(short, long)]
    query: Option<String>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("BIOMAP"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let engine = open_engine(&server_cfg)?;

  match cli.command {
    Command::Serve => {
      let user = std::env::var("USER").ok();
      let curator = resolve_curator(&server_cfg, user.as_deref())?;
      tracing::info!(%curator, store = %server_cfg.store_dir().display(), "curating");

      let app = router(ApiState::new(engine, curator));
      let address = server_cfg.address();

      tracing::info!("Listening on http://{address}");
      let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

      axum::serve(listener, app).await.context("server error")?;
      Ok(ExitCode::SUCCESS)
    }

    Command::Check { strict } => {
      let violations = engine.check().context("failed to read the stores")?;
      for v in &violations {
        let label = match v.severity {
          Severity::Error => "error",
          Severity::Warning => "warning",
        };
        println!("{label}: {}", v.message);
        for located in &v.records {
          // Header is line 1; positions are zero-based.
          let location = engine.store().location(located.store);
          println!("  {location}:{}", located.position + 2);
        }
      }

      let failed = if strict { !violations.is_empty() } else { !check::is_clean(&violations) };
      println!("{} violation(s)", violations.len());
      Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
    }

    Command::Import { file } => {
      let records = read_table(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
      let report = engine.import_predictions(records)?;
      println!("{report}");
      Ok(ExitCode::SUCCESS)
    }

    Command::Lint => {
      let report = engine.prune_predictions()?;
      println!("{report}");
      Ok(ExitCode::SUCCESS)
    }

    Command::Summary { query } => {
      let query = PredictionQuery { query, ..Default::default() };
      for row in engine.summarize(&query)? {
        println!("{}\t{}\t{}", row.source_prefix, row.target_prefix, row.count);
      }
      println!("{} pending", engine.count(&query)?);
      Ok(ExitCode::SUCCESS)
    }
  }
}
