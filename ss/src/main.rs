use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use sessionstore::cli::{Cli, Command};
use sessionstore::config::Config;
use sessionstore::{FileStore, KeyValueStore};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let root = cli.root.unwrap_or(config.store_path);

    info!("sessionstore opening {}", root.display());
    let store = FileStore::open(&root).context(format!("Failed to open store at {}", root.display()))?;

    match cli.command {
        Command::Get { key } => match store.get(&key).await? {
            Some(value) => println!("{}", value),
            None => {
                eprintln!("{} No value for key: {}", "✗".red(), key.yellow());
                std::process::exit(1);
            }
        },
        Command::Put { key, value } => {
            store.put(&key, &value).await?;
            println!("{} Stored {}", "✓".green(), key.cyan());
        }
        Command::Remove { key } => {
            store.remove(&key).await?;
            println!("{} Removed {}", "✓".green(), key.cyan());
        }
        Command::Keys => {
            let keys = store.keys().await?;
            if keys.is_empty() {
                println!("{}", "No keys.".dimmed());
            }
            for key in keys {
                println!("{}", key);
            }
        }
    }

    Ok(())
}
