use std::io::Write;

use csv::WriterBuilder;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct AccountRow {
    pub account: String,
    pub owner: String,
    pub currency: String,
    /// Two decimal places, whatever the scale of the inputs.
    pub balance: String,
    pub status: String,
}

pub fn print_accounts<W>(
    output: &mut W,
    accounts: impl Iterator<Item = AccountRow>,
) -> anyhow::Result<()>
where
    W: Write,
{
    // headers written by hand so they appear even when nothing was opened
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(output);
    if let Err(err) = writer.write_record(["account", "owner", "currency", "balance", "status"]) {
        anyhow::bail!("Failed to write to CSV: {err}")
    }
    for acc in accounts {
        if let Err(err) = writer.serialize(acc) {
            anyhow::bail!("Failed to write to CSV: {err}")
        }
    }
    if let Err(err) = writer.flush() {
        anyhow::bail!("Failed to flush CSV writer: {err}")
    }
    Ok(())
}
