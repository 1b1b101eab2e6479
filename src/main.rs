use anyhow::Result;
use clap::Parser;
use deepaper_rs::cli::Args;
use deepaper_rs::generator::outlet::compiler::RecoveryOutcome;
use deepaper_rs::launch;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let request = args.paper_request();
    let state_path = args.state.clone();
    let output_dir = args.output.clone();
    let config = args.into_config()?;

    let artifacts = launch(&config, &state_path, &request, output_dir.as_deref()).await?;

    println!("📄 PDF: {}", artifacts.pdf_url);
    println!("📝 Source: {}", artifacts.source_url);
    match &artifacts.recovery {
        RecoveryOutcome::Clean => {}
        RecoveryOutcome::CitationsRemoved(keys) => {
            println!("⚠️ Removed undefined citations: {}", keys.join(", "))
        }
        RecoveryOutcome::CitationsStripped => {
            println!("⚠️ Compiled without citations or bibliography")
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    let filter = tracing_subscriber::EnvFilter::try_from_env("DEEPAPER_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
