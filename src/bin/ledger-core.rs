use std::fs::File;

use anyhow::{Context, Result};
use ledger_core::{
    bin_utils::{RowError, Service},
    config::LedgerConfig,
    processor::CommandProcessError,
    telemetry,
};

fn main() -> Result<()> {
    let config = LedgerConfig::from_env().context("Invalid ledger configuration")?;
    telemetry::init(&config.log_filter);

    let filename = std::env::args()
        .nth(1)
        .context("Expected a file name as the first argument")?;
    let file = File::open(&filename).with_context(|| format!("Failed to open `{filename}`"))?;

    let service = Service {
        input: file,
        output: &mut std::io::stdout(),
        config,
        error_printer: Box::new(|line, err| match err {
            // business rejections are not input errors, only log them
            RowError::Rejected(CommandProcessError::Ledger(err)) => {
                tracing::info!(line, error = %err, "row rejected")
            }
            err => eprintln!("Error at line {line}: {err}"),
        }),
    };
    service.run()
}
