//! Calc Model API Server binary
//!
//! HTTP evaluation interface for one exported workbook.

use calc_model::api::{run_api_server, ApiConfig};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "calc-model-server")]
#[command(version)]
#[command(about = "Calc Model API Server - what-if recalculation over HTTP")]
#[command(long_about = r#"
Calc Model API Server

Serves one workbook export (a directory with _workbook.json and one JSON
file per sheet). The export is re-read on every request, so a fresh export
is picked up without a restart.

Endpoints:
  - GET  /api/v1/model  - Sheets, active sheet, has_model
  - POST /api/v1/run    - Recalculate: {"inputs": {"A1": 5, "Sheet2!B3": 0.1}}
  - POST /api/v1/deps   - Cells a formula reads: {"cell": "Main!B10"}
  - GET  /health        - Health check
  - GET  /version       - Server version info
  - GET  /              - API documentation

Example usage:
  calc-model-server --export-dir ./exported
  calc-model-server --host 0.0.0.0 --port 3000

  curl -X POST http://localhost:8080/api/v1/run \
    -H "Content-Type: application/json" \
    -d '{"inputs": {"A1": 5}}'
"#)]
struct Args {
    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "CALC_MODEL_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "CALC_MODEL_PORT")]
    port: u16,

    /// Export directory holding _workbook.json and the sheet files
    #[arg(
        short = 'd',
        long,
        default_value = "exported",
        env = "CALC_MODEL_EXPORT_DIR"
    )]
    export_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ApiConfig {
        host: args.host,
        port: args.port,
        export_dir: args.export_dir,
    };

    run_api_server(config).await
}
