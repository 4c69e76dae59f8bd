use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use talent_intake::config::{AppConfig, IntakeConfig};
use talent_intake::error::AppError;
use talent_intake::telemetry;
use talent_intake::workflows::candidates::{
    candidate_router, ArbitrationDecision, CandidateCsvImporter, CandidateIntakeService,
    ImportSummary, InMemoryCandidateStore, SystemIdentity,
};
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "talent-intake",
    about = "Reconcile candidate profiles against the staffing record store",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Import candidates from a CSV file without operator prompts
    Import(ImportArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// CSV export whose headers are candidate field names
    csv: PathBuf,
    /// Decision applied to probable duplicates (accept or decline)
    #[arg(long, value_parser = parse_decision)]
    on_match: Option<ArbitrationDecision>,
    /// JSON snapshot to load before and save after the import
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Import(args) => run_import(args),
    }
}

fn parse_decision(raw: &str) -> Result<ArbitrationDecision, String> {
    raw.parse().map_err(|err| format!("{err}"))
}

fn load_store(intake: &IntakeConfig) -> Result<InMemoryCandidateStore, AppError> {
    match &intake.snapshot_path {
        Some(path) => Ok(InMemoryCandidateStore::load_snapshot(path)?),
        None => Ok(InMemoryCandidateStore::new()),
    }
}

fn build_service(
    intake: &IntakeConfig,
    store: Arc<InMemoryCandidateStore>,
) -> CandidateIntakeService<InMemoryCandidateStore, SystemIdentity> {
    CandidateIntakeService::new(store, Arc::new(SystemIdentity), intake.defaults.clone())
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let store = Arc::new(load_store(&config.intake)?);
    let service = Arc::new(build_service(&config.intake, store.clone()));

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(candidate_router(service))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "candidate intake service ready");

    serve_until(
        listener,
        app,
        &store,
        config.intake.snapshot_path.as_deref(),
        shutdown_signal(),
    )
    .await
}

/// Serve until `shutdown` resolves, then persist the store snapshot.
async fn serve_until<F>(
    listener: tokio::net::TcpListener,
    app: Router,
    store: &InMemoryCandidateStore,
    snapshot: Option<&Path>,
    shutdown: F,
) -> Result<(), AppError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    if let Some(path) = snapshot {
        store.save_snapshot(path)?;
        info!(path = %path.display(), records = store.len(), "store snapshot saved");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
}

fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    if let Some(path) = args.snapshot {
        config.intake.snapshot_path = Some(path);
    }
    let on_match = args.on_match.unwrap_or(config.intake.import_on_match);

    let store = Arc::new(load_store(&config.intake)?);
    let service = build_service(&config.intake, store.clone());
    let summary = CandidateCsvImporter::from_path(&args.csv, &service, on_match)?;

    if let Some(path) = &config.intake.snapshot_path {
        store.save_snapshot(path)?;
    }

    render_import_summary(&summary, on_match);
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

fn render_import_summary(summary: &ImportSummary, on_match: ArbitrationDecision) {
    println!("Candidate import");
    println!(
        "Rows: {} (duplicates: {})",
        summary.rows,
        on_match.label()
    );
    println!("- created: {}", summary.created);
    println!("- updated: {}", summary.updated);
    println!("- cancelled: {}", summary.cancelled);

    if summary.failed.is_empty() {
        println!("- failed: none");
    } else {
        println!("- failed: {}", summary.failed.len());
        for failure in &summary.failed {
            println!("  row {}: {}", failure.row, failure.reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_import_arguments() {
        let cli = Cli::try_parse_from([
            "talent-intake",
            "import",
            "candidates.csv",
            "--on-match",
            "accept",
        ])
        .expect("cli parses");

        match cli.command {
            Some(Command::Import(args)) => {
                assert_eq!(args.csv, PathBuf::from("candidates.csv"));
                assert_eq!(args.on_match, Some(ArbitrationDecision::Accept));
                assert!(args.snapshot.is_none());
            }
            other => panic!("expected import command, got {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_unknown_decisions() {
        let result = Cli::try_parse_from([
            "talent-intake",
            "import",
            "candidates.csv",
            "--on-match",
            "maybe",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn shutdown_persists_the_store_snapshot() {
        let dir = std::env::temp_dir().join(format!("talent-intake-serve-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("candidates.json");

        let store = Arc::new(InMemoryCandidateStore::new());
        let intake = IntakeConfig {
            defaults: Default::default(),
            import_on_match: ArbitrationDecision::Decline,
            snapshot_path: Some(path.clone()),
        };
        let service = build_service(&intake, store.clone());
        let summary = CandidateCsvImporter::from_reader(
            "full_name,government_id\nAli,900101015555\n".as_bytes(),
            &service,
            ArbitrationDecision::Decline,
        )
        .expect("seed import");
        assert_eq!(summary.created, 1);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        serve_until(
            listener,
            candidate_router(Arc::new(service)),
            &store,
            Some(path.as_path()),
            async {},
        )
        .await
        .expect("server stops cleanly");

        let restored = InMemoryCandidateStore::load_snapshot(&path).expect("snapshot written");
        assert_eq!(restored.snapshot(), store.snapshot());
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn readiness_reports_initializing_until_bound() {
        let (_, handle) = PrometheusMetricLayer::pair();
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(false)),
            metrics: handle,
        };

        let response = readiness_endpoint(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.readiness.store(true, Ordering::Release);
        let response = readiness_endpoint(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
