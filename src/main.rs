//! term-gateway binary entry point.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use term_gateway::api::{self, AppState, ServerConfig};
use term_gateway::config::Config;
use term_gateway::remote::SshConnector;
use term_gateway::{cli, logging};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("term-gateway: {}", e);
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let mut config = match &args.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("term-gateway: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    config.apply_env();
    config.apply_args(&args);

    logging::init(&config.logging.level);
    info!("term-gateway v{}", env!("CARGO_PKG_VERSION"));

    let connector = SshConnector {
        connect_timeout: Duration::from_secs(config.ssh.connect_timeout_secs),
        accept_unverified_hosts: config.ssh.accept_unverified_hosts,
    };
    let state = AppState::with_connector(Arc::new(connector));
    let server = ServerConfig::new(config.server.host.clone(), config.server.port);

    if let Err(e) = api::serve_with_state(server, state).await {
        error!("server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
