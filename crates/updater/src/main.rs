//! `parldata`: scrapes, updates and checks parliament data.

use clap::Parser;
use parldata_updater::{Command, HandlerRegistry, Stores, UpdaterConfig, init_logging};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = UpdaterConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let registry = HandlerRegistry::from_data_dir(&config.data_dir)?;

    match &config.command {
        Command::List => {
            for code in registry.codes() {
                println!("{}", code);
            }
        }
        Command::Scrape { parliament } => {
            let dataset = registry.get(parliament)?.scrape().await?;
            println!("{}", serde_json::to_string_pretty(&dataset)?);
        }
        Command::Update { parliament } => {
            let handler = registry.get(parliament)?;
            let stores = Stores::from_config(&config).await?;
            let summary = handler.update(&stores).await?;
            info!(parliament = %parliament, ?summary, "Update finished");
        }
        Command::Check { parliament } => {
            let handler = registry.get(parliament)?;
            let stores = Stores::from_config(&config).await?;
            let report = handler.check(&stores).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
