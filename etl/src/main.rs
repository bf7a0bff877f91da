use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use common::config::Settings;
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_etl(matches: &ArgMatches) -> anyhow::Result<()> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or("config/etl.toml");

    let mut settings = Settings::new(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    if let Some(partitions) = matches.get_one::<u64>("target-partitions") {
        settings.engine.target_partitions = *partitions as usize;
    }

    let summary = etl::run_with_settings(&settings)
        .await
        .context("ETL pipeline failed")?;

    for marker in &summary.tables {
        println!(
            "{:<10} {:>8} rows  {:>4} files",
            marker.table,
            marker.row_count,
            marker.files.len()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = Command::new("ETL Pipeline Manager")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Builds the song-play star schema from raw song and log data")
        .subcommand_required(true)
        .subcommand(
            Command::new("etl")
                .about("Run the ETL pipeline")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                )
                .arg(
                    Arg::new("target-partitions")
                        .long("target-partitions")
                        .value_name("N")
                        .value_parser(value_parser!(u64).range(1..))
                        .help("Overrides engine.target_partitions"),
                )
                .arg(
                    Arg::new("json-logs")
                        .long("json-logs")
                        .action(ArgAction::SetTrue)
                        .help("Emit logs as JSON lines"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("etl", etl_matches)) => {
            init_tracing(etl_matches.get_flag("json-logs"));

            if let Err(e) = run_etl(etl_matches).await {
                error!("{:#}", e);
                eprintln!("ETL pipeline error: {:#}", e);
                process::exit(1);
            }
        }
        _ => {
            eprintln!("Please specify a valid subcommand");
            process::exit(1);
        }
    }
}
