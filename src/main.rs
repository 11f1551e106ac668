use calc_model::cli::{self, RunOptions};
use calc_model::error::CalcResult;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "calc-model")]
#[command(about = "What-if recalculation of spreadsheet models exported to JSON")]
#[command(long_about = "Calc Model - what-if recalculation without the spreadsheet

Loads a workbook export (a directory with _workbook.json and one JSON file
per sheet), applies input overrides and recalculates every formula.

FORMULAS:
  Arithmetic (+ - * / and parentheses), SUM and AVERAGE over a cell or
  range, and references such as A1, Sheet2!B3 or 'My Sheet'!C4:C9.

COMMANDS:
  run      - Recalculate with optional inputs
  model    - Show the sheets in the export
  deps     - Show what a cell's formula reads
  compare  - Run named input sets side by side
  watch    - Recalculate when the export changes

EXAMPLES:
  calc-model run                                # Values as exported
  calc-model run -i A1=5 -i 'Inputs!B2=0.15'    # What-if
  calc-model run --inputs inputs.yaml --json    # Machine-readable
  calc-model compare scenarios.yaml --cells Main!B10")]
#[command(version)]
struct Cli {
    /// Export directory holding _workbook.json and the sheet files
    #[arg(
        short = 'd',
        long,
        global = true,
        env = "CALC_MODEL_EXPORT_DIR",
        default_value = "exported"
    )]
    export_dir: PathBuf,

    /// Log engine diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Recalculate the model, optionally with input overrides.

INPUTS:
  -i KEY=VALUE sets one cell. KEY is a bare coordinate (A1, first sheet
  only) or sheet-qualified (Sheet2!B1, 'My Sheet'!C3). Repeat for more.
  --inputs FILE reads a JSON or YAML map of KEY: number. Flags win over
  the file for the same key.

An input replaces the cell's stored value or formula for this run only.
Keys that match no stored cell are ignored.

EXAMPLES:
  calc-model run -i A1=5
  calc-model run --inputs what_if.json --sheet Summary
  calc-model run --json > results.json")]
    /// Recalculate the model with optional inputs
    Run {
        /// Input override KEY=VALUE (repeatable)
        #[arg(short, long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,

        /// JSON or YAML file with input overrides
        #[arg(long = "inputs", value_name = "FILE")]
        inputs_file: Option<PathBuf>,

        /// Only show results for this sheet
        #[arg(short, long)]
        sheet: Option<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the sheets in the export
    Model {
        /// Print metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the cells a formula reads and their values
    Deps {
        /// Cell key, e.g. B4 or Sheet2!C7
        cell: String,
    },

    #[command(long_about = "Run named input sets and show results side by side.

SCENARIOS FILE (YAML or JSON):
  base:
    A1: 100
  optimistic:
    A1: 120
    \"Inputs!B2\": 0.2

Without --cells, every cell whose value differs between the scenarios is
shown.

EXAMPLE:
  calc-model compare scenarios.yaml --scenarios base,optimistic --cells Main!B10")]
    /// Compare results across named input sets
    Compare {
        /// YAML or JSON scenarios file
        file: PathBuf,

        /// Comma-separated scenario names (default: all)
        #[arg(short, long, value_delimiter = ',')]
        scenarios: Vec<String>,

        /// Comma-separated cell keys to show
        #[arg(short, long, value_delimiter = ',')]
        cells: Vec<String>,
    },

    /// Recalculate whenever files in the export change
    Watch {
        /// Input override KEY=VALUE (repeatable)
        #[arg(short, long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,

        /// JSON or YAML file with input overrides
        #[arg(long = "inputs", value_name = "FILE")]
        inputs_file: Option<PathBuf>,

        /// Only show results for this sheet
        #[arg(short, long)]
        sheet: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "calc_model=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> CalcResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let export_dir = cli.export_dir;
    let verbose = cli.verbose;

    match cli.command {
        Commands::Run {
            inputs,
            inputs_file,
            sheet,
            json,
        } => cli::run(
            export_dir,
            RunOptions {
                inputs,
                inputs_file,
                sheet,
                json,
                verbose,
            },
        ),

        Commands::Model { json } => cli::model(export_dir, json),

        Commands::Deps { cell } => cli::deps(export_dir, cell),

        Commands::Compare {
            file,
            scenarios,
            cells,
        } => cli::compare(export_dir, file, scenarios, cells),

        Commands::Watch {
            inputs,
            inputs_file,
            sheet,
        } => cli::watch(
            export_dir,
            RunOptions {
                inputs,
                inputs_file,
                sheet,
                json: false,
                verbose,
            },
        ),
    }
}
