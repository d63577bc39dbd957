use clap::{Parser, Subcommand};
use libra_catalog::cli as prog_cli;
use libra_catalog::config::{AppConfig, BackendKind};
use libra_catalog::{Connection, logger};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "libra-catalog", version, about = "Book catalog query and rating tool", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML). Falls back to $LIBRA_CONFIG, then ./libra.toml")]
    config: Option<PathBuf>,
    #[arg(long, help = "Store backend override: mongo|memory")]
    backend: Option<BackendKind>,
    #[arg(long, help = "MongoDB connection string override")]
    uri: Option<String>,
    #[arg(long, help = "Database name override")]
    database: Option<String>,
    #[arg(long, help = "Directory for app.log and audit.log")]
    log_dir: Option<PathBuf>,
    #[arg(long, help = "log4rs YAML file; replaces the built-in app.log/audit.log layout")]
    log_config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Find documents; prints NDJSON to stdout")]
    Find {
        #[arg(help = "Collection name (book, author, genres, news, user, user-books, reviews)")]
        collection: String,
        #[arg(long, help = "Filter JSON, e.g. {\"rating\": {\"$gte\": 4}}")]
        filter: Option<String>,
        #[arg(long, help = "Sort spec, e.g. createdAt:desc,title:asc")]
        sort: Option<String>,
        #[arg(long, help = "Maximum number of documents; omitted means unbounded")]
        limit: Option<u64>,
        #[arg(long, help = "Projection, e.g. title,author or -passwordHash")]
        project: Option<String>,
        #[arg(long, help = "Join from:localField:foreignField:as; repeatable")]
        populate: Vec<String>,
    },
    #[command(name = "find-one", about = "Find one document by its 24-hex id")]
    FindOne {
        collection: String,
        id: String,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        populate: Vec<String>,
    },
    #[command(about = "Recalculate the rating of one book")]
    Recalc {
        book_id: String,
    },
    #[command(name = "recalc-all", about = "Recalculate the rating of every book")]
    RecalcAll,
    #[command(about = "Check that the store answers")]
    Ping,
}

impl From<Commands> for prog_cli::Command {
    fn from(c: Commands) -> Self {
        match c {
            Commands::Find { collection, filter, sort, limit, project, populate } => {
                Self::Find { collection, filter_json: filter, sort, limit, project, populate }
            }
            Commands::FindOne { collection, id, project, populate } => {
                Self::FindOne { collection, id, project, populate }
            }
            Commands::Recalc { book_id } => Self::Recalc { book_id },
            Commands::RecalcAll => Self::RecalcAll,
            Commands::Ping => Self::Ping,
        }
    }
}

fn load_config(cli: &Cli) -> libra_catalog::Result<AppConfig> {
    // Precedence: CLI > env > config files > defaults
    let mut cfg = AppConfig::load(cli.config.as_deref())?;
    if let Some(b) = cli.backend {
        cfg.store.backend = b;
    }
    if let Some(u) = &cli.uri {
        cfg.store.uri.clone_from(u);
    }
    if let Some(d) = &cli.database {
        cfg.store.database.clone_from(d);
    }
    if let Some(d) = &cli.log_dir {
        cfg.log.dir = Some(d.clone());
    }
    Ok(cfg)
}

async fn execute(cli: Cli) -> libra_catalog::Result<()> {
    let cfg = load_config(&cli)?;
    match &cli.log_config {
        Some(path) => logger::init_file(path)?,
        None => logger::configure_logging(&cfg.log)?,
    }
    let conn = Connection::connect(&cfg.store).await?;
    let res = prog_cli::run(&conn, cli.command.into()).await;
    conn.disconnect().await?;
    for line in res? {
        println!("{line}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
