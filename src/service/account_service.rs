use std::sync::Arc;

use tracing::{info, instrument};

use crate::{
    account::{Account, AccountId, AccountStatus, AccountType, OwnerId},
    money::{Currency, Money},
    store::{AccountStore, StoreError},
};

use super::{AccountLocks, LedgerError, Subject};

/// Single-account operations. Reads take the account's shared lock and
/// writes its exclusive lock, the same locks the transaction service uses.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    locks: Arc<AccountLocks>,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, locks: Arc<AccountLocks>) -> Self {
        Self { store, locks }
    }

    pub fn create_account(
        &self,
        owner_id: OwnerId,
        currency: Currency,
    ) -> Result<Account, LedgerError> {
        self.create_account_with_type(owner_id, currency, AccountType::default())
    }

    #[instrument(skip_all, fields(owner = %owner_id, currency = %currency))]
    pub fn create_account_with_type(
        &self,
        owner_id: OwnerId,
        currency: Currency,
        account_type: AccountType,
    ) -> Result<Account, LedgerError> {
        if owner_id.as_str().is_empty() {
            return Err(LedgerError::InvalidArgument(
                "owner id is required".to_string(),
            ));
        }
        let account = Account::open_with_type(owner_id, currency, account_type);
        self.store
            .save(&account)
            .map_err(LedgerError::PersistenceFailure)?;
        info!(account = %account.id(), "account created");
        Ok(account)
    }

    pub fn get_account(&self, id: &AccountId) -> Result<Account, LedgerError> {
        self.locks.shared(id, || {
            self.store
                .find_by_id(id)
                .map_err(|err| LedgerError::lookup(Subject::Account, err))
        })?
    }

    pub fn get_balance(&self, id: &AccountId) -> Result<Money, LedgerError> {
        self.locks.shared(id, || {
            self.store
                .get_balance(id)
                .map_err(|err| LedgerError::lookup(Subject::Account, err))
        })?
    }

    /// Accounts of one owner, oldest first, read together under their shared
    /// locks so a transfer between two of them is seen whole or not at all.
    pub fn accounts_of_owner(&self, owner_id: &OwnerId) -> Result<Vec<Account>, LedgerError> {
        let listed = self
            .store
            .find_by_owner_id(owner_id)
            .map_err(LedgerError::PersistenceFailure)?;
        let ids: Vec<&AccountId> = listed.iter().map(Account::id).collect();

        self.locks.shared_many(&ids, || {
            let mut accounts = Vec::with_capacity(ids.len());
            for id in &ids {
                match self.store.find_by_id(id) {
                    Ok(account) => accounts.push(account),
                    // deleted since it was listed
                    Err(StoreError::NotFound(_)) => {}
                    Err(err) => return Err(LedgerError::PersistenceFailure(err)),
                }
            }
            Ok(accounts)
        })?
    }

    #[instrument(skip_all, fields(account = %id))]
    pub fn suspend(&self, id: &AccountId) -> Result<Account, LedgerError> {
        self.modify(id, |account| Ok(account.suspend()?))
    }

    #[instrument(skip_all, fields(account = %id))]
    pub fn activate(&self, id: &AccountId) -> Result<Account, LedgerError> {
        self.modify(id, |account| Ok(account.activate()?))
    }

    #[instrument(skip_all, fields(account = %id))]
    pub fn close(&self, id: &AccountId) -> Result<Account, LedgerError> {
        self.modify(id, |account| Ok(account.close()?))
    }

    /// Removes a closed account. Its transactions stay in the ledger.
    #[instrument(skip_all, fields(account = %id))]
    pub fn delete_account(&self, id: &AccountId) -> Result<(), LedgerError> {
        self.locks.exclusive(&[id], || -> Result<(), LedgerError> {
            let account = self
                .store
                .find_by_id(id)
                .map_err(|err| LedgerError::lookup(Subject::Account, err))?;
            if account.status() != AccountStatus::Closed {
                return Err(LedgerError::InvalidArgument(format!(
                    "account {id} must be closed before it is deleted"
                )));
            }
            self.store
                .delete(id)
                .map_err(|err| LedgerError::lookup(Subject::Account, err))?;
            info!("account deleted");
            Ok(())
        })?
    }

    fn modify(
        &self,
        id: &AccountId,
        change: impl FnOnce(&mut Account) -> Result<(), LedgerError>,
    ) -> Result<Account, LedgerError> {
        self.locks.exclusive(&[id], || -> Result<Account, LedgerError> {
            let mut account = self
                .store
                .find_by_id(id)
                .map_err(|err| LedgerError::lookup(Subject::Account, err))?;
            change(&mut account)?;
            self.store
                .save(&account)
                .map_err(LedgerError::PersistenceFailure)?;
            info!(status = %account.status(), "account status changed");
            Ok(account)
        })?
    }
}
