use anyhow::Result;
use clap::{Parser, Subcommand};

use scout402::{cli, config};

#[derive(Parser)]
#[command(name = "scout402")]
#[command(version)]
#[command(about = "x402-paid startup opportunity scout")]
#[command(long_about = "\
x402-paid startup opportunity scout

scout402 buys today's business news from an x402-gated MCP server, asks a
language model for one startup opportunity, and returns a structured report.
It can sell that report as a paid MCP tool or produce one on demand.

TYPICAL WORKFLOWS:

  Serve the paid tool to an MCP client (stdio):
    EVM_PAY_TO=0x... NEWS_MCP_URL=https://... scout402 serve

  Produce one report locally:
    OPENAI_API_KEY=... EVM_PRIVATE_KEY=... SOLANA_PRIVATE_KEY=... scout402 run
")]
struct Cli {
    #[command(flatten)]
    config: config::ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the `startup_opportunity` tool over stdio, paid per call
    ///
    /// Example:
    ///
    ///  $ scout402 serve --testnet --evm-pay-to 0x...
    ///
    Serve,

    /// Run the pipeline once and print the result JSON
    ///
    /// Example:
    ///
    ///  $ scout402 run --max-payment 0.10
    ///
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    scout402::install_crypto_provider();

    let cli = Cli::parse();

    let global_config = config::GlobalConfig::from_args(&cli.config)?;
    global_config.init_tracing();

    tracing::debug!("scout402 starting");

    match cli.command {
        Commands::Serve => cli::serve(&global_config).await?,
        Commands::Run => cli::run_once(&global_config).await?,
    }

    tracing::debug!("scout402 shutting down");
    Ok(())
}
