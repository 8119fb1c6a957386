//! Walk through the query-service client against a local Trino server.

use clap::Parser;
use lakehouse_demos::config::Config;
use lakehouse_demos::logging::init_logging;
use lakehouse_demos::services::demos::{run_demo, Capabilities, DemoFlags};

/// Trino client examples.
#[derive(Parser, Debug)]
#[command(name = "trino-demo")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Run the extended examples as well as the basic one
    #[arg(long)]
    all: bool,

    /// Keep going when the connectivity probe fails
    #[arg(long)]
    run_anyway: bool,

    /// Skip the DataFrame example
    #[arg(long)]
    no_dataframe: bool,

    /// Query service host (overrides TRINO_HOST)
    #[arg(short = 'H', long, value_name = "HOST")]
    host: Option<String>,

    /// Query service port (overrides TRINO_PORT)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return;
        }
    };
    init_logging(&config.logging.level);

    if let Some(host) = cli.host {
        config.trino.host = host;
    }
    if let Some(port) = cli.port {
        config.trino.port = port;
    }

    let flags = DemoFlags {
        all: cli.all,
        run_anyway: cli.run_anyway,
    };
    let caps = Capabilities {
        dataframe: !cli.no_dataframe,
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return;
        }
    };

    let summary = runtime.block_on(run_demo(&config.trino, flags, caps));
    tracing::debug!(
        "Demo finished: probe_ok={}, executed={:?}",
        summary.probe_ok,
        summary.executed
    );
}
