use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    sitescope::logging::init().context("init logging")?;

    let cli = sitescope::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        sitescope::cli::Command::Analyze(args) => {
            sitescope::cli::analyze(args).await.context("analyze")?;
        }
    }

    Ok(())
}
