// CLI entry point for the manhwa chapter translation pipeline

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use manhwa_translate::orchestration::{Pipeline, RunInput, RunStatus};
use manhwa_translate::services::{
    AnthropicChat, CosmicTextRenderer, NeighborFillInpainter, RemoteOcrClient,
};
use manhwa_translate::Config;

/// Translate a manhwa chapter: fetch panels, read the text, translate it,
/// and write re-lettered panels back out.
#[derive(Parser, Debug)]
#[command(name = "manhwa-translate", version, about)]
struct Cli {
    /// Chapter page URL to scrape panels from
    #[arg(long, conflicts_with = "dir")]
    url: Option<String>,

    /// Local directory of panel images, ordered by file name
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Output directory for translated panels and region records
    #[arg(long, short, default_value = "out")]
    out: PathBuf,

    /// Target language (overrides TARGET_LANGUAGE)
    #[arg(long)]
    language: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::new() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(language) = cli.language {
        config.agent.target_language = language;
    }

    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::new(format!(
        "manhwa_translate={}",
        match config.log_level {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Arc::new(config);

    let chat = match AnthropicChat::new(config.llm.clone()) {
        Ok(chat) => Arc::new(chat),
        Err(e) => {
            error!("chat model setup failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    let renderer = match CosmicTextRenderer::new(&config.render) {
        Ok(renderer) => Arc::new(renderer),
        Err(e) => {
            error!("renderer setup failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    let ocr = Arc::new(RemoteOcrClient::new(config.ocr.clone()));
    let inpainter = Arc::new(NeighborFillInpainter::new(config.inpaint.fill_passes));

    let pipeline = Pipeline::new(Arc::clone(&config), ocr, chat, inpainter, renderer)
        .with_progress(Box::new(|stage, percent, detail| {
            println!("[{percent:>5.1}%] {:<10} {detail}", stage.name());
        }));

    let input = RunInput {
        chapter_url: cli.url,
        document: cli.dir,
        output_dir: cli.out,
    };

    let outcome = pipeline.run(input).await;
    match outcome.status {
        RunStatus::Complete => {
            info!(
                regions = outcome.artifacts.regions().len(),
                "chapter translated successfully"
            );
            ExitCode::SUCCESS
        }
        RunStatus::Failed => {
            if let Some(e) = outcome.error {
                error!("run failed: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}
