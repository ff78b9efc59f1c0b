use agentchat_cli::Cli;
use agentchat_core::ChatConfig;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ChatConfig::load_from_home() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("agentchat: {err}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    let stdout = std::io::stdout();
    match agentchat_cli::run(cli, &config, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("agentchat: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over the configured filter.
fn init_logging(config: &ChatConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter)
        .init();
}
