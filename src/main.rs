mod cli;

use clap::Parser;
use cli::{Cli, Commands, ConfigArgs};
use novelbox::config::Config;
use novelbox::ledger::{FjallStore, PersistenceStore, snapshot};
use novelbox::observability::init_tracing;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let config = load_config(&args.config)?;
            let address = args.address.unwrap_or(config.server.bind_addr);
            novelbox::api::run(address, config).await?;
        }
        Commands::List(args) => list_tasks(&load_config(&args)?)?,
        Commands::Config(args) => {
            let config = load_config(&args)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load_config(args: &ConfigArgs) -> Result<Config, AnyError> {
    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

fn list_tasks(config: &Config) -> Result<(), AnyError> {
    let store = FjallStore::open(&config.server.ledger_path)?;
    let Some(blob) = store.load()? else {
        println!("No tasks stored in {}", config.server.ledger_path.display());
        return Ok(());
    };

    let mut tasks = snapshot::decode(&blob)?;
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    for task in &tasks {
        println!(
            "{}  {:<11}  {:>3}%  {}/{} chapters  {}",
            task.id,
            task.status,
            task.progress.progress_percent,
            task.progress.completed_count,
            task.total_chapters(),
            task.title
        );
    }
    println!("{} task(s)", tasks.len());

    if let Some(saved) = store
        .last_saved()?
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
    {
        println!("Last saved {}", saved.to_rfc3339());
    }
    Ok(())
}
