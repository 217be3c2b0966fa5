use thiserror::Error;

use crate::{
    account::{Account, AccountId, OwnerId},
    money::Money,
    transaction::{Transaction, TransactionId},
};

pub mod in_memory;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No record with id `{0}`")]
    NotFound(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Storage backend failed: {0}")]
    Backend(String),
}

/// Account persistence.
///
/// Implementations must be safe to share between threads and must write a
/// single account atomically: a reader sees either the old or the new record.
pub trait AccountStore: Send + Sync {
    fn find_by_id(&self, id: &AccountId) -> Result<Account, StoreError>;

    /// Accounts of one owner, oldest first.
    fn find_by_owner_id(&self, owner_id: &OwnerId) -> Result<Vec<Account>, StoreError>;

    /// Inserts or replaces the account keyed by its id.
    fn save(&self, account: &Account) -> Result<(), StoreError>;

    fn delete(&self, id: &AccountId) -> Result<(), StoreError>;

    fn get_balance(&self, id: &AccountId) -> Result<Money, StoreError>;
}

/// Append-and-update transaction log. Records are never deleted.
pub trait TransactionStore: Send + Sync {
    fn find_by_id(&self, id: &TransactionId) -> Result<Transaction, StoreError>;

    /// Every transaction referencing the account on any side, oldest first.
    fn find_by_account_id(&self, account_id: &AccountId) -> Result<Vec<Transaction>, StoreError>;

    /// Inserts or replaces the transaction keyed by its id.
    fn save(&self, transaction: &Transaction) -> Result<(), StoreError>;

    /// Transactions still `Pending`, oldest first.
    fn list_pending(&self) -> Result<Vec<Transaction>, StoreError>;
}
