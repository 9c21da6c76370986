//! Pushdeploy Agent - Entry Point
//!
//! A single-node deployment agent: receives push webhooks, deploys and
//! supervises a target application, and can rebuild and replace its own
//! executable.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use pushdeploy::app::options::{AppOptions, ServerOptions};
use pushdeploy::app::run::run;
use pushdeploy::logs::{init_logging, LogOptions};
use pushdeploy::server::state::GatewayOptions;
use pushdeploy::settings::Settings;
use pushdeploy::utils::version_info;

use tracing::{error, info};

const DEFAULT_SETTINGS_PATH: &str = "/etc/pushdeploy/settings.json";

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
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    // Load the settings file
    let settings_path = cli_args
        .get("config")
        .cloned()
        .unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string());
    let settings = match tokio::fs::read_to_string(&settings_path).await {
        Ok(content) => match serde_json::from_str::<Settings>(&content) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Invalid settings file {}: {}", settings_path, e);
                return;
            }
        },
        Err(e) => {
            eprintln!("Unable to read settings file {}: {}", settings_path, e);
            eprintln!("Provide one with --config=<path>");
            return;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    // Run the agent
    let options = AppOptions {
        server: ServerOptions {
            host: settings.server.host.clone(),
            port: settings.server.port,
        },
        gateway: GatewayOptions {
            webhook_secret: settings.webhook_secret.clone(),
            allowed_branches: settings.allowed_branches.clone(),
            self_update_url: settings.self_update.repo_url.clone(),
            target_url: settings.deploy.repo_url.clone(),
        },
        deploy_target_dir: PathBuf::from(&settings.deploy.target_dir),
        ..Default::default()
    };

    info!(
        "Running pushdeploy agent {} on {}:{}",
        version.version, options.server.host, options.server.port
    );
    let result = run(options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the agent: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
