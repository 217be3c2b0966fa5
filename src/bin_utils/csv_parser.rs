use std::io::Read;

use csv::{Position, StringRecord, Trim};
use rust_decimal::Decimal;

use crate::account::AccountType;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Open,
    Deposit,
    Withdraw,
    Transfer,
    Suspend,
    Activate,
    Close,
}

/// One input row. `account` and `target` are aliases chosen by the file's
/// author, bound to generated account ids by `open` rows.
#[derive(Debug, Deserialize)]
pub struct CommandRow {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub account: Option<String>,
    pub target: Option<String>,
    pub owner: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    /// Optional column, only read by `open` rows.
    #[serde(default)]
    pub account_type: Option<AccountType>,
}

/// Parses command rows in CSV format, yielding each row with its line number.
pub struct CsvCommandParser<R> {
    reader: csv::Reader<R>,
    headers: Option<StringRecord>,
    record: StringRecord,
}

impl<R> CsvCommandParser<R>
where
    R: Read,
{
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);

        Self {
            reader,
            headers: None,
            record: StringRecord::new(),
        }
    }
}

impl<R> Iterator for CsvCommandParser<R>
where
    R: Read,
{
    type Item = (u64, Result<CommandRow, csv::Error>);

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.record) {
            Ok(false) => None,
            Err(err) => {
                let line = err.position().map(Position::line).unwrap_or_default();
                Some((line, Err(err)))
            }
            Ok(true) => {
                let line = self.record.position().map(Position::line).unwrap_or_default();
                if self.headers.is_none() {
                    match self.reader.headers() {
                        Ok(headers) => self.headers = Some(headers.clone()),
                        Err(err) => return Some((line, Err(err))),
                    }
                }
                Some((line, self.record.deserialize(self.headers.as_ref())))
            }
        }
    }
}
