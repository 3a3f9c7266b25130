use std::process::ExitCode;

use common::utils::logging::init_logging_json;
use dotenvy::dotenv;
use gateway::bootstrap;
use tracing::{error, info, warn};
use uuid::Uuid;

fn init_logging() {
    // .env first so RUST_LOG applies
    dotenv().ok();
    init_logging_json();
    info!(service = "gateway", event = "logger_init", "tracing subscriber initialized");
}

fn main() -> ExitCode {
    init_logging();

    let service_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    std::panic::set_hook(Box::new(move |info| {
        error!(
            service = "gateway",
            event = "panic",
            %service_id,
            pid,
            message = %info,
            "unhandled panic occurred"
        );
    }));

    let config_path = configs::config_path();
    if !std::path::Path::new(&config_path).exists() {
        warn!(service = "gateway", event = "config_missing", %config_path, "config file not found, using defaults");
    }
    let cfg = match configs::AppConfig::load_and_validate() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(service = "gateway", event = "config_invalid", %config_path, error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(w) = cfg.server.worker_threads {
        builder.worker_threads(w);
    }
    let rt = match builder.build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "gateway", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    info!(
        service = "gateway",
        event = "start",
        %service_id,
        pid,
        version,
        threads = cfg.server.worker_threads.unwrap_or_default(),
        "gateway service starting"
    );

    let code = match rt.block_on(bootstrap::run(cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(service = "gateway", event = "run_failed", error = %e, "gateway::bootstrap::run returned error");
            ExitCode::FAILURE
        }
    };

    info!(service = "gateway", event = "stop", %service_id, pid, "gateway service stopped");
    code
}
