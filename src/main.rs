//! rustsds - multi-source Safety Data Sheet generator
//!
//! Builds a 16-section SDS for a SMILES structure from a compound database,
//! scraped regulatory sources, structural rules, property predictions and an
//! optional generative model.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! rustsds generate "CCO" --format pdf --output ethanol.pdf
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! rustsds serve --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::{Parser, Subcommand};
use rustsds::{
    render::{render_document, OutputFormat},
    schema::SectionKey,
    LlmConfig, PipelineConfig, SdsDocument, SdsError, SdsGenerator,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Multi-source Safety Data Sheet generator
#[derive(Parser)]
#[command(name = "rustsds")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Log output format
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    log_format: String,

    /// Skip every external source (structure-only document)
    #[arg(long, global = true)]
    offline: bool,

    /// OpenAI-compatible API base URL (enables generative backfill)
    #[arg(long, global = true, env = "SDS_LLM_BASE_URL")]
    llm_base_url: Option<String>,

    /// API key for the generative service
    #[arg(long, global = true, env = "SDS_LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Model name for the generative service
    #[arg(long, global = true, env = "SDS_LLM_MODEL", default_value = "gpt-4o-mini")]
    llm_model: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an SDS for one SMILES structure
    Generate {
        /// SMILES string
        smiles: String,

        /// Output format: json, csv, docx or pdf
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,

        /// Output file (json and csv print to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// List the SDS sections and their fields
    Sections,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --debug
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.log_format == "json" {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    let config = build_config(&cli);

    match cli.command {
        Commands::Generate {
            smiles,
            format,
            output,
        } => run_generate(config, smiles, format, output).await,
        Commands::Serve { port, host } => run_server(config, host, port).await,
        Commands::Sections => {
            print_sections();
            Ok(())
        }
    }
}

fn build_config(cli: &Cli) -> PipelineConfig {
    let mut config = if cli.offline {
        PipelineConfig::offline()
    } else {
        PipelineConfig::default()
    };

    match (&cli.llm_base_url, &cli.llm_api_key) {
        (Some(base_url), Some(api_key)) => {
            config.llm = Some(LlmConfig::new(base_url, api_key, &cli.llm_model));
        }
        (Some(_), None) => {
            warn!("LLM base URL set without an API key, generative backfill disabled");
        }
        _ => {}
    }
    config
}

// ============================================================================
// Generate
// ============================================================================

async fn run_generate(
    config: PipelineConfig,
    smiles: String,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let generator = SdsGenerator::from_config(config).context("Failed to configure generator")?;

    let document = tokio::select! {
        result = generator.generate(&smiles) => result.context("SDS generation failed")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning generation");
            anyhow::bail!("interrupted");
        }
    };

    print_summary(&document);

    let rendered = render_document(&document, format).context("Failed to render document")?;
    match output {
        Some(path) => {
            std::fs::write(&path, &rendered.bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Saved: {}", path.display());
        }
        None if matches!(format, OutputFormat::Json | OutputFormat::Csv) => {
            println!("{}", String::from_utf8_lossy(&rendered.bytes));
        }
        None => {
            std::fs::write(&rendered.filename, &rendered.bytes)
                .with_context(|| format!("Failed to write {}", rendered.filename))?;
            println!("Saved: {}", rendered.filename);
        }
    }
    Ok(())
}

fn print_summary(document: &SdsDocument) {
    eprintln!("Compound: {}", document.compound_name);
    eprintln!(
        "Toxicity: {} | structural hazards: {}",
        document.toxicity.class,
        document.hazards.len()
    );
    eprintln!(
        "Unresolved fields: {} | generated: {} | standard text: {}",
        document.unresolved_fields.len(),
        document.backfill.accepted,
        document.backfill.canned
    );
    for err in &document.source_errors {
        eprintln!("  source error - {}: {}", err.source, err.message);
    }
}

fn print_sections() {
    for key in SectionKey::ALL {
        println!("{:>2}. {} ({})", key.number(), key.title(), key);
        for field in key.fields() {
            println!("      - {}", field);
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(config: PipelineConfig, host: String, port: u16) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let generator = SdsGenerator::from_config(config).context("Failed to configure generator")?;
    let app_state = Arc::new(generator);

    let app = Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/sds", get(sds_handler))
        .route("/api/sds/{format}", get(download_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
}

/// Health check endpoint
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "rustsds",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Deserialize)]
struct SdsQuery {
    smiles: Option<String>,
}

type ApiError = (StatusCode, String);

fn required_smiles(query: SdsQuery) -> Result<String, ApiError> {
    query
        .smiles
        .filter(|s| !s.trim().is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "Missing 'smiles' query parameter".to_string()))
}

fn api_error(err: SdsError) -> ApiError {
    match err {
        SdsError::InvalidStructure(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        other => {
            error!(error = %other, "SDS request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

/// Full document as JSON
async fn sds_handler(
    State(generator): State<Arc<SdsGenerator>>,
    Query(query): Query<SdsQuery>,
) -> Result<Json<SdsDocument>, ApiError> {
    let smiles = required_smiles(query)?;
    info!(smiles = %smiles, "SDS request");
    let document = generator.generate(&smiles).await.map_err(api_error)?;
    Ok(Json(document))
}

/// Rendered document as a download
async fn download_handler(
    State(generator): State<Arc<SdsGenerator>>,
    Path(format): Path<String>,
    Query(query): Query<SdsQuery>,
) -> Result<Response, ApiError> {
    let format: OutputFormat = format
        .parse()
        .map_err(|e: SdsError| (StatusCode::NOT_FOUND, e.to_string()))?;
    let smiles = required_smiles(query)?;
    info!(smiles = %smiles, format = %format, "SDS download request");

    let rendered = generator
        .generate_rendered(&smiles, format)
        .await
        .map_err(api_error)?;
    let disposition = format!("attachment; filename=\"{}\"", rendered.filename);
    Ok((
        [
            (header::CONTENT_TYPE, rendered.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        rendered.bytes,
    )
        .into_response())
}
