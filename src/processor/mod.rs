use thiserror::Error;

use crate::{
    account::Account,
    command::{CommandError, LedgerCommand},
    service::LedgerError,
    transaction::Transaction,
};

pub mod ledger;

pub use ledger::Ledger;

#[derive(Debug, Error)]
pub enum CommandProcessError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    AccountOpened(Account),
    AccountUpdated(Account),
    Transaction(Transaction),
}

pub trait CommandProcessor {
    fn process(&self, command: LedgerCommand) -> Result<CommandOutcome, CommandProcessError>;
}
