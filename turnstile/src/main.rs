use std::process::ExitCode;

use args::Args;
use clap::Parser;
use server::ServeConfig;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    logger::init(args.log_filter()?, args.log_style.resolve());

    match run(&args).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            log::error!("{e:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let config = args.load_config()?;
    let _telemetry = telemetry::init(&config.telemetry)?;

    let serve_config = ServeConfig {
        listen_address: args.listen_address(&config),
        config,
    };

    tokio::select! {
        result = server::serve(serve_config) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received Ctrl-C, shutting down");
            Ok(())
        }
    }
}
