//! Batch driver for [`crate::processor::Ledger`]: reads command rows as CSV and prints
//! the final state of every opened account as CSV.

use std::{
    collections::HashMap,
    io::{Read, Write},
};

use anyhow::Result;
use thiserror::Error;

use crate::{
    account::AccountId,
    command::{
        ActivateAccountCommand, CloseAccountCommand, CreateAccountCommand, DepositCommand,
        LedgerCommand, SuspendAccountCommand, TransferCommand, WithdrawCommand,
    },
    config::LedgerConfig,
    processor::{CommandOutcome, CommandProcessError, CommandProcessor, Ledger},
};
use csv_parser::{CommandKind, CommandRow, CsvCommandParser};
use csv_printer::{AccountRow, print_accounts};

pub mod csv_parser;
pub mod csv_printer;

#[derive(Debug, Error)]
pub enum RowError {
    #[error(transparent)]
    Parse(#[from] csv::Error),
    #[error("`{field}` is required for {kind:?}")]
    MissingField {
        kind: CommandKind,
        field: &'static str,
    },
    #[error("Unknown account `{0}`")]
    UnknownAccount(String),
    #[error("Account `{0}` is already open")]
    DuplicateAccount(String),
    #[error(transparent)]
    Rejected(#[from] CommandProcessError),
}

pub struct Service<'w, R, W: 'w> {
    pub input: R,
    pub output: &'w mut W,
    pub config: LedgerConfig,
    pub error_printer: Box<dyn FnMut(u64, RowError)>,
}

impl<'w, R, W> Service<'w, R, W>
where
    R: Read,
    W: Write + 'w,
{
    pub fn run(mut self) -> Result<()> {
        let parser = CsvCommandParser::new(self.input);
        let ledger = Ledger::in_memory(&self.config);
        let mut aliases = Aliases::default();

        for (line, row) in parser {
            let result = row
                .map_err(RowError::from)
                .and_then(|row| aliases.apply(&ledger, &self.config, row));
            if let Err(err) = result {
                (self.error_printer)(line, err);
            }
        }

        let mut rows = Vec::with_capacity(aliases.opened.len());
        for (alias, id) in &aliases.opened {
            let account = ledger.accounts().get_account(id)?;
            rows.push(AccountRow {
                account: alias.clone(),
                owner: account.owner_id().to_string(),
                currency: account.currency().to_string(),
                balance: format!("{:.2}", account.balance().amount()),
                status: account.status().to_string(),
            });
        }
        print_accounts(self.output, rows.into_iter())
    }
}

/// Account names used in the file, in opening order.
#[derive(Default)]
struct Aliases {
    ids: HashMap<String, AccountId>,
    opened: Vec<(String, AccountId)>,
}

impl Aliases {
    fn apply(
        &mut self,
        ledger: &Ledger,
        config: &LedgerConfig,
        row: CommandRow,
    ) -> Result<(), RowError> {
        let kind = row.kind;
        let currency = row
            .currency
            .unwrap_or_else(|| config.default_currency.to_string());

        let command = match kind {
            CommandKind::Open => {
                let alias = required(kind, "account", row.account)?;
                if self.ids.contains_key(&alias) {
                    return Err(RowError::DuplicateAccount(alias));
                }
                let outcome = ledger.process(LedgerCommand::CreateAccount(CreateAccountCommand {
                    owner_id: row.owner.unwrap_or_default(),
                    currency,
                    account_type: row.account_type.unwrap_or_default(),
                }))?;
                if let CommandOutcome::AccountOpened(account) = outcome {
                    self.ids.insert(alias.clone(), account.id().clone());
                    self.opened.push((alias, account.id().clone()));
                }
                return Ok(());
            }
            CommandKind::Deposit => LedgerCommand::Deposit(DepositCommand {
                account_id: self.resolve(kind, "account", row.account)?,
                amount: required(kind, "amount", row.amount)?,
                currency,
            }),
            CommandKind::Withdraw => LedgerCommand::Withdraw(WithdrawCommand {
                account_id: self.resolve(kind, "account", row.account)?,
                amount: required(kind, "amount", row.amount)?,
                currency,
            }),
            CommandKind::Transfer => LedgerCommand::Transfer(TransferCommand {
                source_account_id: self.resolve(kind, "account", row.account)?,
                target_account_id: self.resolve(kind, "target", row.target)?,
                amount: required(kind, "amount", row.amount)?,
                currency,
            }),
            CommandKind::Suspend => LedgerCommand::SuspendAccount(SuspendAccountCommand {
                account_id: self.resolve(kind, "account", row.account)?,
                reason: None,
            }),
            CommandKind::Activate => LedgerCommand::ActivateAccount(ActivateAccountCommand {
                account_id: self.resolve(kind, "account", row.account)?,
            }),
            CommandKind::Close => LedgerCommand::CloseAccount(CloseAccountCommand {
                account_id: self.resolve(kind, "account", row.account)?,
            }),
        };
        ledger.process(command)?;
        Ok(())
    }

    fn resolve(
        &self,
        kind: CommandKind,
        field: &'static str,
        alias: Option<String>,
    ) -> Result<String, RowError> {
        let alias = required(kind, field, alias)?;
        self.ids
            .get(&alias)
            .map(ToString::to_string)
            .ok_or(RowError::UnknownAccount(alias))
    }
}

fn required<T>(kind: CommandKind, field: &'static str, value: Option<T>) -> Result<T, RowError> {
    value.ok_or(RowError::MissingField { kind, field })
}
