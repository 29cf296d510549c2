mod api;
mod client;
mod config;
mod db;
mod entities;
mod fetch;
mod neighbors;
mod parser;
mod pipeline;

use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};

use fetch::Fetcher;
use neighbors::NeighborMap;

#[derive(Parser)]
#[command(name = "country_stats", about = "Country statistics scraper and read-only API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the entity list from the ISO 3166 code table
    Init,
    /// Scrape every listed country and store the normalized rows
    Run {
        /// Only process the first N entities
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Fetch and parse this many entities at once (rows are still written in order)
        #[arg(short, long, default_value = "1")]
        jobs: usize,
    },
    /// Serve the read-only JSON API
    Serve {
        /// Address to bind (overrides configuration)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Call one API route and print the JSON response
    Query {
        /// Route, e.g. /top-10/population or /country/Chad
        route: String,
    },
    /// Show row counts and partial records
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = config::load()?;

    let result = match cli.command {
        Commands::Init => {
            let fetcher = Fetcher::new(&settings.source)?;
            let names = entities::build_entity_list(&fetcher, &settings.source.codes_url)?;
            entities::write_entity_list(&settings.entity_list, &names)?;
            println!(
                "Wrote {} entity names to {}",
                names.len(),
                settings.entity_list.display()
            );
            Ok(())
        }
        Commands::Run { limit, jobs } => {
            let mut names = entities::read_entity_list(&settings.entity_list)?;
            if let Some(n) = limit {
                names.truncate(n);
            }
            if names.is_empty() {
                println!("Entity list is empty. Run 'init' first.");
                return Ok(());
            }

            let conn = db::connect(&settings.database)?;
            db::init_schema(&conn)?;
            let fetcher = Fetcher::new(&settings.source)?;
            let borders = NeighborMap::load(&fetcher, &settings.source.borders_url);

            println!("Processing {} countries...", names.len());
            let stats = pipeline::run(&conn, &fetcher, &borders, &names, jobs)?;
            println!(
                "Done: {} countries ({} stored, {} not found, {} failed).",
                stats.total, stats.stored, stats.not_found, stats.failed
            );
            Ok(())
        }
        Commands::Serve { bind } => {
            let mut api = settings.api.clone();
            if let Some(addr) = bind {
                api.bind = addr;
            }
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(api::serve(&api, settings.database.clone()))
        }
        Commands::Query { route } => {
            let body = client::fetch_route(&settings.api.url, &route, settings.source.timeout())?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.database)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Countries:          {}", s.total);
            println!("Without population: {}", s.no_population);
            println!("Without area:       {}", s.no_area);
            println!("Without capital:    {}", s.no_capital);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 && result.is_ok() {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from(["country_stats", "run", "-n", "5", "--jobs", "4"]).unwrap();
        match cli.command {
            Commands::Run { limit, jobs } => {
                assert_eq!(limit, Some(5));
                assert_eq!(jobs, 4);
            }
            _ => panic!("expected run"),
        }
    }
}
