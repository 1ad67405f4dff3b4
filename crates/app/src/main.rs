mod server;
mod settings;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use grounded_answer_core::{AnswerResponse, ImagePayload, Query};
use server::{create_router, AppState};
use settings::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "grounded-answer", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one question from live web sources and print it.
    Ask {
        /// The question to answer
        query: String,
        /// Number of search results to ground on
        #[arg(long)]
        top_k: Option<usize>,
        /// Image file attached to the question
        #[arg(long)]
        image: Option<PathBuf>,
        /// Print the full response as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Serve the answering pipeline over HTTP.
    Serve {
        /// Address to listen on
        #[arg(long, env = "GROUNDED_BIND", default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let pipeline = cli.settings.build_pipeline()?;
    info!(
        version = app_version,
        model = %cli.settings.model,
        started_at = %Utc::now().to_rfc3339(),
        "grounded-answer boot"
    );

    match cli.command {
        Command::Ask {
            query,
            top_k,
            image,
            json,
        } => {
            let image = match image {
                Some(path) => {
                    let bytes = tokio::fs::read(&path)
                        .await
                        .with_context(|| format!("failed to read image {}", path.display()))?;
                    Some(ImagePayload::new(bytes))
                }
                None => None,
            };
            let query = Query::new(query, top_k.unwrap_or(cli.settings.default_top_k), image)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let response = pipeline
                .answer(&query)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_answer(&response);
            }
        }
        Command::Serve { bind } => {
            let router = create_router(AppState {
                pipeline: Arc::new(pipeline),
                default_top_k: cli.settings.default_top_k,
            });
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            info!(address = %bind, "listening");

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    Ok(())
}

fn print_answer(response: &AnswerResponse) {
    println!("{}", response.answer);

    if !response.sources.is_empty() {
        println!("\nSources:");
        for source in &response.sources {
            println!("[{}] {} — {}", source.citation, source.title, source.url);
        }
    }

    if !response.omitted.is_empty() {
        println!("\nNot used:");
        for omitted in &response.omitted {
            println!("- {} ({})", omitted.url, omitted.reason.as_str());
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
