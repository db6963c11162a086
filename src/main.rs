use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pipewright::backend::HttpBackend;
use pipewright::config::AppConfig;
use pipewright::report;
use pipewright::server::{create_router, AppState};
use pipewright::shutdown::{graceful_shutdown, wait_for_shutdown};
use pipewright::workflow::{PollPolicy, WorkflowEvent, WorkflowOrchestrator, WorkflowRequest};

#[derive(Parser)]
#[command(
    name = "pipewright",
    about = "Repository analysis, CI/CD pipeline generation and code review"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full workflow for one repository and print the report
    Run {
        /// Repository URL (http or https)
        repository_url: String,
        /// Branch to analyze
        #[arg(short, long, default_value = "main")]
        branch: String,
        /// Code review focus area (security, performance, best-practices); repeatable
        #[arg(short, long = "focus")]
        focus_areas: Vec<String>,
        /// Print the final workflow state as JSON instead of the text report
        #[arg(long)]
        json: bool,
    },
    /// Serve the workflow control API
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            repository_url,
            branch,
            focus_areas,
            json,
        } => {
            let request = WorkflowRequest::new(repository_url)
                .with_branch(branch)
                .with_focus_areas(focus_areas);
            run_once(&config, request, json).await
        }
        Command::Serve => serve(config).await,
    }
}

async fn run_once(config: &AppConfig, request: WorkflowRequest, json: bool) -> anyhow::Result<()> {
    tracing::info!(backend = %config.backend.base_url, "Running workflow");

    let backend = Arc::new(HttpBackend::new(config)?);
    let orchestrator = WorkflowOrchestrator::new(backend, PollPolicy::from(&config.polling));

    let mut events = orchestrator.events();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                WorkflowEvent::StageStarted(stage) => {
                    tracing::info!(
                        progress = stage.progress_percent(),
                        "{}...",
                        stage.label()
                    );
                }
                WorkflowEvent::FallbackDetected { message, .. } => {
                    tracing::warn!("{message}");
                }
                WorkflowEvent::Completed | WorkflowEvent::Failed { .. } => break,
                _ => {}
            }
        }
    });

    let outcome = orchestrator.start_workflow(request).await;
    match outcome {
        // Rejected before any event was emitted.
        Err(ref e) if e.is_precondition() => progress.abort(),
        _ => {
            let _ = progress.await;
        }
    }

    let state = orchestrator.state();
    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        print!("{}", report::render(&state));
    }

    outcome?;
    Ok(())
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        backend = %config.backend.base_url,
        "Starting Pipewright server"
    );

    let state = Arc::new(AppState::new(&config)?);
    let app = create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        config.server.host, config.server.port
    ))
    .await?;

    tracing::info!("Listening on {}", listener.local_addr()?);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    graceful_shutdown(&state).await;

    Ok(())
}
