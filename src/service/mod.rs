use std::fmt;

use thiserror::Error;

use crate::{
    account::{AccountError, AccountId, AccountStatus},
    money::{Money, MoneyError},
    store::StoreError,
    transaction::TransactionError,
};

pub mod account_service;
pub mod locks;
pub mod transaction_service;

pub use account_service::AccountService;
pub use locks::{AccountLocks, LockTimeout};
pub use transaction_service::{PendingReport, TransactionService};

/// What a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Account,
    SourceAccount,
    TargetAccount,
    Transaction,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Subject::Account => "Account",
            Subject::SourceAccount => "Source account",
            Subject::TargetAccount => "Target account",
            Subject::Transaction => "Transaction",
        })
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{subject} `{id}` not found")]
    NotFound { subject: Subject, id: String },
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Money),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Account {id} is {status}")]
    AccountInactive { id: AccountId, status: AccountStatus },
    #[error("Insufficient balance on account {id}: available {available}, requested {requested}")]
    InsufficientBalance {
        id: AccountId,
        available: Money,
        requested: Money,
    },
    #[error(transparent)]
    CurrencyMismatch(MoneyError),
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[source] StoreError),
    #[error(transparent)]
    LockTimeout(#[from] LockTimeout),
    #[error(transparent)]
    TransactionFinalized(#[from] TransactionError),
}

impl LedgerError {
    /// Maps a store lookup failure, naming what was looked up.
    pub(crate) fn lookup(subject: Subject, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound { subject, id },
            StoreError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            err @ StoreError::Backend(_) => Self::PersistenceFailure(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<MoneyError> for LedgerError {
    fn from(err: MoneyError) -> Self {
        match err {
            err @ MoneyError::CurrencyMismatch { .. } => Self::CurrencyMismatch(err),
            err @ (MoneyError::Overflow { .. } | MoneyError::InvalidCurrency(_)) => {
                Self::InvalidArgument(err.to_string())
            }
        }
    }
}

impl From<AccountError> for LedgerError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::AccountClosed(id) => Self::AccountInactive {
                id,
                status: AccountStatus::Closed,
            },
            AccountError::CurrencyMismatch {
                expected, found, ..
            } => Self::CurrencyMismatch(MoneyError::CurrencyMismatch {
                left: expected,
                right: found,
            }),
            err @ AccountError::NonZeroBalance { .. } => Self::InvalidArgument(err.to_string()),
        }
    }
}
