//! Binary entry point: HTTP server, one-shot scans and config checks.
#![forbid(unsafe_code)]

use std::error::Error;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use spawnfilter::{
    config::{Config, CONFIG_ENV},
    logging::init_logging,
    server,
    service::{EntityService, ScanArgs},
    snapshot::Snapshot,
};

#[derive(Parser, Debug)]
#[command(
    name = "spawnfilter",
    version,
    about = "Filter query compiler and entity search service for live maps",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = CONFIG_ENV,
        value_name = "FILE",
        help = "Configuration file (TOML)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        default_value = "info",
        help = "Log filter directive, e.g. info or spawnfilter=debug"
    )]
    log_level: String,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, help = "Override server.host")]
        host: Option<IpAddr>,
        #[arg(long, help = "Override server.port")]
        port: Option<u16>,
    },
    /// Run one scan request from a JSON file and print the result.
    Scan {
        #[arg(long, value_name = "FILE", help = "Scan request: {permissions, bbox, filters}")]
        request: PathBuf,
    },
    /// Validate the configuration and reference data, then exit.
    CheckConfig,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    path: Option<String>,
    backend: &'static str,
    leagues: Vec<String>,
    dimensions: usize,
    areas: usize,
    ranking_species: usize,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    let mut config = Config::load(cli.config.clone())?;

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            server::serve(config).await?;
        }
        Command::Scan { request } => {
            let args: ScanArgs = serde_json::from_str(&fs::read_to_string(&request)?)?;
            let service = EntityService::from_config(config)?;
            let views = service.get_all(&args).await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&views)?),
                OutputFormat::Text => {
                    for view in &views {
                        let record = &view.record;
                        let best = view
                            .best_rank
                            .map(|rank| format!(" best_rank={rank}"))
                            .unwrap_or_default();
                        println!(
                            "{} species={} form={} at ({:.5}, {:.5}){best}",
                            record.id,
                            record.pokemon_id,
                            record.form_id(),
                            record.lat,
                            record.lon
                        );
                    }
                    println!("{} entities", views.len());
                }
            }
        }
        Command::CheckConfig => {
            let snapshot = Snapshot::load(&config)?;
            let report = ConfigReport {
                path: config.path.as_ref().map(|path| path.display().to_string()),
                backend: if config.is_remote() { "remote" } else { "local" },
                leagues: config.pvp.leagues.iter().map(|l| l.name.clone()).collect(),
                dimensions: snapshot.standard.dimensions().len(),
                areas: snapshot.areas.len(),
                ranking_species: snapshot.rankings.len(),
            };
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => {
                    println!("configuration ok");
                    println!("  backend: {}", report.backend);
                    println!("  leagues: {}", report.leagues.join(", "));
                    println!("  dimensions: {}", report.dimensions);
                    println!("  areas: {}", report.areas);
                    println!("  ranking species: {}", report.ranking_species);
                }
            }
        }
    }
    Ok(())
}
