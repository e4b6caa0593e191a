use std::process::ExitCode;
use std::sync::Arc;

use tracing::{debug, error, info};
use verifier_gateway::config::GatewayConfig;
use verifier_gateway::device::SimulatedDevice;
use verifier_gateway::error::{constants, GatewayError};
use verifier_gateway::protocol::dispatcher::CommandDispatcher;
use verifier_gateway::transport::GatewayServer;
use verifier_gateway::utils::{logging, LogLevel, Metrics};

/// Positional arguments: `<port> [log level]`.
#[derive(Debug, PartialEq, Eq)]
struct Args {
    port: u16,
    log_level: Option<LogLevel>,
}

fn parse_args(args: &[String]) -> Result<Args, GatewayError> {
    let usage = || GatewayError::InvalidArguments(constants::ERR_USAGE.to_string());

    let (port, level) = match args {
        [port] => (port, None),
        [port, level] => (port, Some(level)),
        _ => return Err(usage()),
    };

    let log_level = level
        .map(|level| level.parse::<LogLevel>())
        .transpose()
        .map_err(|_| usage())?;
    let port = port.parse::<u16>().map_err(|_| usage())?;

    Ok(Args { port, log_level })
}

fn usage_and_exit() -> ExitCode {
    error!("{}", constants::ERR_USAGE);
    error!("{}", constants::ERR_LOG_LEVELS);
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let mut config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init(&GatewayConfig::default().logging);
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(_) => {
            logging::init(&config.logging);
            return usage_and_exit();
        }
    };

    if let Some(level) = args.log_level {
        config.logging.log_level = level;
    }
    config.server = config.server.with_port(args.port);
    logging::init(&config.logging);

    if let Err(e) = config.validate_strict() {
        error!(error = %e, "Invalid configuration");
        return ExitCode::FAILURE;
    }

    debug!(version = env!("CARGO_PKG_VERSION"), "Verifier gateway build");

    let metrics = Arc::new(Metrics::new());
    let device = Arc::new(SimulatedDevice::new());
    let dispatcher = CommandDispatcher::with_metrics(device, Arc::clone(&metrics));

    let server =
        match GatewayServer::bind_with_metrics(config.server.clone(), dispatcher, metrics).await {
            Ok(server) => server,
            Err(e) => {
                error!(error = %e, "Server startup failed");
                return ExitCode::FAILURE;
            }
        };

    info!(
        app = %config.logging.app_name,
        address = %server.local_addr(),
        "Server started on port {}",
        args.port
    );

    match server.run().await {
        Ok(()) => {
            server.metrics().log_metrics();
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server terminated with error");
            ExitCode::FAILURE
        }
    }
}
