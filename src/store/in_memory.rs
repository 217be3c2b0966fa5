use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    account::{Account, AccountId, OwnerId},
    money::Money,
    transaction::{Transaction, TransactionId},
};

use super::{AccountStore, StoreError, TransactionStore};

/// Account store backed by a sharded map; writes to one account never block
/// readers or writers of accounts living in other shards.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: DashMap<AccountId, Account>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn find_by_id(&self, id: &AccountId) -> Result<Account, StoreError> {
        self.accounts
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn find_by_owner_id(&self, owner_id: &OwnerId) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .filter(|entry| entry.value().owner_id() == owner_id)
            .map(|entry| entry.value().clone())
            .collect();
        accounts.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(accounts)
    }

    fn save(&self, account: &Account) -> Result<(), StoreError> {
        if account.id().is_empty() {
            return Err(StoreError::InvalidArgument(
                "account id is required".to_string(),
            ));
        }
        self.accounts.insert(account.id().clone(), account.clone());
        Ok(())
    }

    fn delete(&self, id: &AccountId) -> Result<(), StoreError> {
        self.accounts
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn get_balance(&self, id: &AccountId) -> Result<Money, StoreError> {
        self.accounts
            .get(id)
            .map(|entry| entry.value().balance())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[derive(Debug)]
struct Record {
    // insertion order, breaks ties between equal creation timestamps
    sequence: u64,
    transaction: Transaction,
}

#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    transactions: DashMap<TransactionId, Record>,
    sequence: AtomicU64,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    fn collect_ordered(&self, filter: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        let mut records: Vec<(u64, Transaction)> = self
            .transactions
            .iter()
            .filter(|entry| filter(&entry.value().transaction))
            .map(|entry| (entry.value().sequence, entry.value().transaction.clone()))
            .collect();
        records.sort_by(|(seq_a, a), (seq_b, b)| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| seq_a.cmp(seq_b))
        });
        records.into_iter().map(|(_, tx)| tx).collect()
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn find_by_id(&self, id: &TransactionId) -> Result<Transaction, StoreError> {
        self.transactions
            .get(id)
            .map(|entry| entry.value().transaction.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn find_by_account_id(&self, account_id: &AccountId) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.collect_ordered(|tx| tx.involves(account_id)))
    }

    fn save(&self, transaction: &Transaction) -> Result<(), StoreError> {
        if transaction.id().is_empty() {
            return Err(StoreError::InvalidArgument(
                "transaction id is required".to_string(),
            ));
        }
        match self.transactions.entry(transaction.id().clone()) {
            Entry::Occupied(mut entry) => {
                let stored = entry.get().transaction.status();
                if stored.is_terminal() && stored != transaction.status() {
                    return Err(StoreError::InvalidArgument(format!(
                        "transaction {} is already {stored}",
                        transaction.id()
                    )));
                }
                entry.get_mut().transaction = transaction.clone();
            }
            Entry::Vacant(entry) => {
                let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
                entry.insert(Record {
                    sequence,
                    transaction: transaction.clone(),
                });
            }
        }
        Ok(())
    }

    fn list_pending(&self) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.collect_ordered(Transaction::is_pending))
    }
}
