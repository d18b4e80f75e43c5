use anyhow::Result;
use clap::Parser;

mod cli;

use log_gateway::{config::load_config, init_tracing, server};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    match args.command.unwrap_or(cli::Commands::Start) {
        cli::Commands::Start => {
            let config = load_config(&args.config)?;
            init_tracing(&config.server.log_level, &config.server.log_format);
            server::start_server(config).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => {
                let config = load_config(&args.config)?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            cli::ConfigCommands::Validate => {
                load_config(&args.config)?;
                println!("Configuration OK: {}", args.config.display());
            }
        },
        cli::Commands::Version => {
            println!("Log Gateway v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
