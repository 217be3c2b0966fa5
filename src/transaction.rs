use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{account::AccountId, money::Money};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("tx_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        })
    }
}

/// Monetary intent, before it is recorded as a [`Transaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum Movement {
    Deposit {
        account_id: AccountId,
        amount: Money,
    },
    Withdrawal {
        account_id: AccountId,
        amount: Money,
    },
    Transfer {
        source_id: AccountId,
        target_id: AccountId,
        amount: Money,
    },
}

impl Movement {
    pub fn amount(&self) -> Money {
        match self {
            Movement::Deposit { amount, .. }
            | Movement::Withdrawal { amount, .. }
            | Movement::Transfer { amount, .. } => *amount,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Transaction {id} is already {status}")]
    AlreadyFinalized {
        id: TransactionId,
        status: TransactionStatus,
    },
}

/// Ledger record of one movement.
///
/// Starts `Pending` and leaves it exactly once, to either `Completed` or `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    id: TransactionId,
    account_id: AccountId,
    kind: TransactionKind,
    status: TransactionStatus,
    amount: Money,
    source_account_id: Option<AccountId>,
    target_account_id: Option<AccountId>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    scheduled: bool,
}

impl Transaction {
    pub fn new(movement: Movement) -> Self {
        let (account_id, kind, source_account_id, target_account_id, amount) = match movement {
            Movement::Deposit { account_id, amount } => {
                (account_id, TransactionKind::Deposit, None, None, amount)
            }
            Movement::Withdrawal { account_id, amount } => {
                (account_id, TransactionKind::Withdrawal, None, None, amount)
            }
            Movement::Transfer {
                source_id,
                target_id,
                amount,
            } => (
                source_id.clone(),
                TransactionKind::Transfer,
                Some(source_id),
                Some(target_id),
                amount,
            ),
        };
        Self {
            id: TransactionId::generate(),
            account_id,
            kind,
            status: TransactionStatus::Pending,
            amount,
            source_account_id,
            target_account_id,
            created_at: Utc::now(),
            processed_at: None,
            scheduled: false,
        }
    }

    /// A transaction recorded now and applied later by pending processing.
    pub fn scheduled(movement: Movement) -> Self {
        Self {
            scheduled: true,
            ..Self::new(movement)
        }
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn source_account_id(&self) -> Option<&AccountId> {
        self.source_account_id.as_ref()
    }

    pub fn target_account_id(&self) -> Option<&AccountId> {
        self.target_account_id.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    /// Whether this was recorded for deferred application rather than applied
    /// by the call that created it.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Every account this transaction reads or writes.
    pub fn account_ids(&self) -> Vec<&AccountId> {
        let mut ids = vec![&self.account_id];
        ids.extend(self.target_account_id.as_ref());
        ids
    }

    pub fn involves(&self, account_id: &AccountId) -> bool {
        &self.account_id == account_id
            || self.source_account_id.as_ref() == Some(account_id)
            || self.target_account_id.as_ref() == Some(account_id)
    }

    /// Rebuilds the movement this transaction records.
    pub fn movement(&self) -> Movement {
        match (self.kind, &self.target_account_id) {
            (TransactionKind::Transfer, Some(target_id)) => Movement::Transfer {
                source_id: self.account_id.clone(),
                target_id: target_id.clone(),
                amount: self.amount,
            },
            (TransactionKind::Withdrawal, _) => Movement::Withdrawal {
                account_id: self.account_id.clone(),
                amount: self.amount,
            },
            // a transfer always carries its target, see `Transaction::new`
            (TransactionKind::Deposit | TransactionKind::Transfer, _) => Movement::Deposit {
                account_id: self.account_id.clone(),
                amount: self.amount,
            },
        }
    }

    pub fn complete(&mut self) -> Result<(), TransactionError> {
        self.finalize(TransactionStatus::Completed)
    }

    pub fn fail(&mut self) -> Result<(), TransactionError> {
        self.finalize(TransactionStatus::Failed)
    }

    #[cfg(test)]
    pub(crate) fn with_id(mut self, id: TransactionId) -> Self {
        self.id = id;
        self
    }

    fn finalize(&mut self, status: TransactionStatus) -> Result<(), TransactionError> {
        if self.status.is_terminal() {
            return Err(TransactionError::AlreadyFinalized {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = status;
        self.processed_at = Some(Utc::now());
        Ok(())
    }
}
