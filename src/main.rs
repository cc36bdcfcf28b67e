mod frame;
mod llm;
mod routes;
mod services;
mod state;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};

use crate::llm::VisionModel;
use crate::services::analysis::{AnalysisError, AnalysisPipeline, DEFAULT_ANALYSIS_TIMEOUT_SECS};
use crate::services::redirect::{Navigator, PrintUrl, SystemBrowser, WebOnly};
use crate::services::session::Session;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid bind address {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },
    #[error("server failed: {0}")]
    Serve(std::io::Error),
    #[error("failed to read {path}: {source}")]
    ReadImage { path: PathBuf, source: std::io::Error },
    #[error("failed to load image: {0}")]
    Image(#[from] canvas::SnapshotError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

#[derive(Parser, Debug)]
#[command(name = "sketchcall", about = "Draw something, get a reply or a redirect")]
struct Cli {
    /// Upper bound on one analysis, in seconds.
    #[arg(long, global = true, env = "ANALYSIS_TIMEOUT_SECS", default_value_t = DEFAULT_ANALYSIS_TIMEOUT_SECS)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the drawing session over websocket.
    Serve(ServeCommand),
    /// Analyze a PNG file once and print the reply.
    Analyze(AnalyzeCommand),
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    bind: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
}

#[derive(Args, Debug)]
struct AnalyzeCommand {
    /// PNG image to send.
    image: PathBuf,

    /// Print redirect targets instead of opening a browser.
    #[arg(long)]
    no_open: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt::init();
    if let Err(e) = dotenv {
        debug!(error = %e, "no .env loaded");
    }

    let cli = Cli::parse();
    let pipeline = build_pipeline(Duration::from_secs(cli.timeout_secs));

    let result = match cli.command {
        Command::Serve(cmd) => run_serve(pipeline, cmd).await,
        Command::Analyze(cmd) => run_analyze(&pipeline, cmd).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Model client is optional: without a credential every analysis fails its
/// precondition, but drawing still works.
fn build_pipeline(timeout: Duration) -> AnalysisPipeline {
    let model: Option<Arc<dyn VisionModel>> = match llm::GeminiClient::from_env() {
        Ok(client) => {
            info!(model = client.model(), "vision model initialized");
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!(error = %e, "vision model not configured; analysis disabled");
            None
        }
    };
    AnalysisPipeline::new(model, timeout)
}

async fn run_serve(pipeline: AnalysisPipeline, cmd: ServeCommand) -> Result<(), CliError> {
    let state = state::AppState::new(pipeline);
    let app = routes::app(state);

    let addr = format!("{}:{}", cmd.bind, cmd.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| CliError::Bind { addr: addr.clone(), source })?;

    info!(%addr, "sketchcall listening");
    axum::serve(listener, app).await.map_err(CliError::Serve)
}

async fn run_analyze(pipeline: &AnalysisPipeline, cmd: AnalyzeCommand) -> Result<(), CliError> {
    let mut session = Session::new(load_surface(&cmd.image)?);
    let mut navigator: Box<dyn Navigator> =
        if cmd.no_open { Box::new(WebOnly(PrintUrl)) } else { Box::new(WebOnly(SystemBrowser)) };

    let result = session.analyze(pipeline, navigator.as_mut()).await;
    println!("{}", session.analysis.result_text);
    result.map(|_| ()).map_err(CliError::from)
}

fn load_surface(path: &Path) -> Result<canvas::DrawSurface, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::ReadImage { path: path.to_path_buf(), source })?;
    let raster = canvas::snapshot::decode_png(&bytes)?;
    Ok(canvas::DrawSurface::from_raster(raster))
}
