// Query-service demo runner
//
// Probes the service, then runs the example routines in a fixed order. The
// first routine error aborts the rest of the sequence.
pub mod routines;

use std::fmt;

use crate::config::TrinoConfig;
use crate::error::AppError;

pub use routines::ErrorHandlingReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Example {
    Basic,
    Authentication,
    Parameters,
    CrossCatalog,
    SessionProperties,
    ErrorHandling,
    DataFrame,
}

impl Example {
    /// Examples that only run with `--all`, in execution order
    pub const EXTENDED: [Example; 5] = [
        Example::Authentication,
        Example::Parameters,
        Example::CrossCatalog,
        Example::SessionProperties,
        Example::ErrorHandling,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Example::Basic => "basic_connection",
            Example::Authentication => "authentication_example",
            Example::Parameters => "query_with_parameters",
            Example::CrossCatalog => "cross_catalog_query",
            Example::SessionProperties => "session_properties",
            Example::ErrorHandling => "error_handling",
            Example::DataFrame => "with_dataframe",
        }
    }
}

impl fmt::Display for Example {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Command-line switches of the query-service demo
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoFlags {
    pub all: bool,
    pub run_anyway: bool,
}

/// What the caller can offer beyond the query client itself
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub dataframe: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { dataframe: true }
    }
}

/// Examples to run, in order; `None` when a failed probe stops the demo
pub fn plan_examples(probe_ok: bool, flags: DemoFlags, caps: Capabilities) -> Option<Vec<Example>> {
    if !probe_ok && !flags.run_anyway {
        return None;
    }

    let mut plan = vec![Example::Basic];
    if flags.all {
        plan.extend(Example::EXTENDED);
    }
    if caps.dataframe {
        plan.push(Example::DataFrame);
    }
    Some(plan)
}

pub async fn run_example(example: Example, config: &TrinoConfig) -> Result<(), AppError> {
    tracing::debug!("Running example {}", example);
    match example {
        Example::Basic => routines::basic_connection(config).await.map(drop),
        Example::Authentication => routines::authentication_example(config).await.map(drop),
        Example::Parameters => routines::query_with_parameters(config).await.map(drop),
        Example::CrossCatalog => routines::cross_catalog_query(config).await.map(drop),
        Example::SessionProperties => routines::session_properties(config).await.map(drop),
        Example::ErrorHandling => routines::error_handling(config).await.map(drop),
        Example::DataFrame => routines::with_dataframe(config).await.map(drop),
    }
}

/// What a demo run did
#[derive(Debug)]
pub struct DemoSummary {
    pub probe_ok: bool,
    pub executed: Vec<Example>,
    pub aborted: Option<(Example, AppError)>,
}

impl DemoSummary {
    pub fn completed(&self) -> bool {
        self.probe_ok && self.aborted.is_none()
    }
}

pub async fn run_demo(config: &TrinoConfig, flags: DemoFlags, caps: Capabilities) -> DemoSummary {
    println!("Trino Client Examples");
    println!("=====================");

    let probe_ok = match routines::probe(config).await {
        Ok(()) => {
            println!("Successfully connected to Trino server!");
            true
        }
        Err(e) => {
            println!("Could not connect to Trino server: {}", e);
            println!("Make sure Trino is running at {}", config.server_address());
            println!("You can still review the examples in this program.");
            false
        }
    };

    let mut summary = DemoSummary {
        probe_ok,
        executed: Vec::new(),
        aborted: None,
    };

    let Some(plan) = plan_examples(probe_ok, flags, caps) else {
        return summary;
    };

    for example in plan {
        if let Err(e) = run_example(example, config).await {
            println!("Error during execution: {}", e);
            println!("Some examples may require a specific Trino setup with the appropriate catalogs and tables.");
            println!("See the lab instructions for setting up the required environment.");
            tracing::debug!("Example {} failed: {:?}", example, e);
            summary.aborted = Some((example, e));
            return summary;
        }
        summary.executed.push(example);
    }

    if !caps.dataframe {
        println!("\n=== DataFrame Integration ===");
        println!("DataFrame support disabled; rerun without --no-dataframe to include it.");
    }

    summary
}
