//! mixed-doe - response-surface screening and REML mixed-model analysis
//!
//! Usage:
//!   mixed-doe analyze runs.csv --out results/    # Full pipeline, export artifacts
//!   mixed-doe terms dye1 dye2 Time Temp          # List the response-surface terms
//!   mixed-doe config                             # Print the default configuration

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mixed_doe::data::Dataset;
use mixed_doe::doe::{analyze, AnalysisConfig};
use mixed_doe::export::{write_all, write_json};
use mixed_doe::report::render_summary;
use mixed_doe::terms::{build_rsm_terms, formula};
use mixed_doe::{Error, Result};

#[derive(Parser)]
#[command(name = "mixed-doe")]
#[command(about = "Response-surface screening and REML mixed-model analysis for DOE data")]
#[command(version)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on a CSV file and export the results
    Analyze {
        /// Input CSV with a header row
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "results")]
        out: PathBuf,

        /// JSON configuration file; unspecified fields take defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Predictor columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        predictors: Option<Vec<String>>,

        /// Response columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        responses: Option<Vec<String>>,

        /// Max LogWorth needed to keep a term
        #[arg(long)]
        threshold: Option<f64>,

        /// Number of responses in which a term must be significant to be kept
        #[arg(long)]
        min_significant: Option<usize>,

        /// Print the console summary
        #[arg(long)]
        summary: bool,

        /// Also write the whole analysis as analysis.json
        #[arg(long)]
        json: bool,
    },

    /// List the full second-order terms for a set of predictors
    Terms {
        /// Predictor names
        #[arg(required = true)]
        predictors: Vec<String>,
    },

    /// Print the default configuration as JSON
    Config,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
            serde_json::from_str(&text).map_err(|e| Error::invalid_config(format!("{}: {e}", path.display())))
        }
        None => Ok(AnalysisConfig::default()),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_analyze(
    input: &PathBuf,
    out: &PathBuf,
    config: Option<&PathBuf>,
    predictors: Option<Vec<String>>,
    responses: Option<Vec<String>>,
    threshold: Option<f64>,
    min_significant: Option<usize>,
    summary: bool,
    json: bool,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(p) = predictors {
        config.predictors = p;
    }
    if let Some(r) = responses {
        config.responses = r;
    }
    if let Some(t) = threshold {
        config.logworth_threshold = t;
    }
    if let Some(m) = min_significant {
        config.min_significant = m;
    }
    config.validate()?;

    let dataset = Dataset::from_csv_path(input, &config.predictors, &config.responses)?;
    info!(
        input = %input.display(),
        rows = dataset.n_observations(),
        configurations = dataset.grouping().n_groups(),
        "data loaded"
    );

    let analysis = analyze(&dataset, &config)?;
    for failure in &analysis.failures {
        warn!(%failure, "stage failed");
    }

    write_all(&analysis, &dataset, out)?;
    if json {
        write_json(&analysis, out.join("analysis.json"))?;
    }
    if summary {
        print!("{}", render_summary(&analysis));
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Analyze {
            input,
            out,
            config,
            predictors,
            responses,
            threshold,
            min_significant,
            summary,
            json,
        } => run_analyze(
            &input,
            &out,
            config.as_ref(),
            predictors,
            responses,
            threshold,
            min_significant,
            summary,
            json,
        ),
        Commands::Terms { predictors } => {
            let terms = build_rsm_terms(&predictors);
            for term in &terms {
                println!("{term}");
            }
            println!("{}", formula("y", &terms));
            Ok(())
        }
        Commands::Config => {
            let text = serde_json::to_string_pretty(&AnalysisConfig::default())
                .map_err(|e| Error::invalid_config(e.to_string()))?;
            println!("{text}");
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "analysis failed");
            ExitCode::FAILURE
        }
    }
}
