//! esprov - Entry Point
//!
//! Provisions ESP-family pixel controllers over a serial link by
//! orchestrating the bundled flasher and filesystem tools.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use esprov::app::options::AppOptions;
use esprov::app::run::run;
use esprov::logs::{init_logging, LogLevel, LogOptions};
use esprov::pipeline::action::PipelineAction;
use esprov::pipeline::task::FailurePolicy;
use esprov::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version).unwrap());
        return;
    }

    let action = match cli_args.get("action").map(|s| s.parse::<PipelineAction>()) {
        Some(Ok(action)) => action,
        Some(Err(e)) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
        None => {
            eprintln!("Usage: esprov --action=<action> --port=<port> [--board=<name>]");
            eprintln!("       [--base-dir=<dir>] [--policy=fail-fast|best-effort] [--log-level=<level>]");
            eprintln!();
            eprintln!("Actions: erase_flash, download_filesystem, unpack_filesystem,");
            eprintln!("         create_filesystem, build_offline_package, upload_firmware,");
            eprintln!("         create_and_upload_all");
            std::process::exit(2);
        }
    };

    let log_level = cli_args
        .get("log-level")
        .and_then(|s| s.parse::<LogLevel>().ok())
        .unwrap_or_default();

    let policy = match cli_args.get("policy").map(String::as_str) {
        Some("fail-fast") => FailurePolicy::FailFast,
        Some("best-effort") | None => FailurePolicy::BestEffort,
        Some(other) => {
            eprintln!("Invalid policy: {}", other);
            std::process::exit(2);
        }
    };

    let options = AppOptions {
        base_dir: cli_args
            .get("base-dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
        board: cli_args.get("board").cloned(),
        port: cli_args.get("port").cloned().unwrap_or_default(),
        action,
        policy,
        log_level: log_level.clone(),
    };

    if let Err(e) = init_logging(LogOptions { log_level }) {
        println!("Failed to initialize logging: {e}");
    }

    info!("Running esprov {} ({:?})", version.version, options.action);
    match run(options, await_shutdown_signal()).await {
        Ok(report) => {
            if !report.succeeded() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Provisioning failed: {e}");
            std::process::exit(1);
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).unwrap();

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, cancelling...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, cancelling...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, cancelling...");
    }
}
