//! Create a dataframe session and round-trip a small table through object storage.

use anyhow::Result;
use clap::Parser;
use lakehouse_demos::config::Config;
use lakehouse_demos::logging::init_logging;
use lakehouse_demos::models::{parse_override, SessionSettings, SettingValue};
use lakehouse_demos::services::datafusion::{create_named_session, run_sample_operation};

/// Dataframe session demo.
#[derive(Parser, Debug)]
#[command(name = "dataframe-demo")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Extra session setting, repeatable (e.g. --conf spark.master=local[4])
    #[arg(long = "conf", value_name = "KEY=VALUE", value_parser = parse_override)]
    conf: Vec<(String, SettingValue)>,

    /// Shorthand for --conf spark.master=<MASTER>
    #[arg(long, value_name = "MASTER")]
    master: Option<String>,

    /// Where the sample table is written (overrides DATAFRAME_OUTPUT_PATH)
    #[arg(short = 'o', long, value_name = "LOCATION")]
    output: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return;
        }
    };
    init_logging(&config.logging.level);

    if let Err(e) = run(cli, config).await {
        println!("Error: {:#}", e);
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let mut overrides: SessionSettings = cli.conf.into_iter().collect();
    if let Some(master) = cli.master {
        overrides.set("spark.master", master);
    }
    let overrides = (!overrides.is_empty()).then_some(overrides);

    let session = create_named_session(&config.dataframe.app_name, overrides)?;
    println!("{}", session);
    println!("Successfully created session");

    let location = cli.output.unwrap_or(config.dataframe.output_path);
    let passes = run_sample_operation(&session, &location).await?;

    for (pass, round_trip) in passes.iter().enumerate() {
        if !round_trip.rows_match() {
            tracing::warn!(
                "Pass {}: read {} rows back, wrote {}",
                pass + 1,
                round_trip.read.len(),
                round_trip.written.len()
            );
        }
    }

    Ok(())
}
