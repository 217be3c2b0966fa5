use std::sync::Arc;

use tracing::info;

use crate::{
    command::{LedgerCommand, Operation},
    config::LedgerConfig,
    service::{AccountLocks, AccountService, TransactionService},
    store::{
        AccountStore, TransactionStore,
        in_memory::{InMemoryAccountStore, InMemoryTransactionStore},
    },
    transaction::Movement,
};

use super::{CommandOutcome, CommandProcessError, CommandProcessor};

/// Both services over one pair of stores and one lock table.
#[derive(Clone)]
pub struct Ledger {
    accounts: AccountService,
    transactions: TransactionService,
}

impl Ledger {
    pub fn new(
        account_store: Arc<dyn AccountStore>,
        transaction_store: Arc<dyn TransactionStore>,
        config: &LedgerConfig,
    ) -> Self {
        let locks = Arc::new(AccountLocks::new(config.lock_timeout));
        Self {
            accounts: AccountService::new(account_store.clone(), locks.clone()),
            transactions: TransactionService::new(account_store, transaction_store, locks),
        }
    }

    pub fn in_memory(config: &LedgerConfig) -> Self {
        Self::new(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(InMemoryTransactionStore::new()),
            config,
        )
    }

    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    pub fn transactions(&self) -> &TransactionService {
        &self.transactions
    }
}

impl CommandProcessor for Ledger {
    fn process(&self, command: LedgerCommand) -> Result<CommandOutcome, CommandProcessError> {
        let outcome = match command.validate()? {
            Operation::CreateAccount {
                owner_id,
                currency,
                account_type,
            } => CommandOutcome::AccountOpened(self.accounts.create_account_with_type(
                owner_id,
                currency,
                account_type,
            )?),
            Operation::Move(Movement::Deposit { account_id, amount }) => {
                CommandOutcome::Transaction(self.transactions.deposit(&account_id, amount)?)
            }
            Operation::Move(Movement::Withdrawal { account_id, amount }) => {
                CommandOutcome::Transaction(self.transactions.withdrawal(&account_id, amount)?)
            }
            Operation::Move(Movement::Transfer {
                source_id,
                target_id,
                amount,
            }) => CommandOutcome::Transaction(
                self.transactions
                    .transfer(&source_id, &target_id, amount)?,
            ),
            Operation::Suspend { account_id, reason } => {
                if let Some(reason) = &reason {
                    info!(account = %account_id, %reason, "suspending account");
                }
                CommandOutcome::AccountUpdated(self.accounts.suspend(&account_id)?)
            }
            Operation::Activate { account_id } => {
                CommandOutcome::AccountUpdated(self.accounts.activate(&account_id)?)
            }
            Operation::Close { account_id } => {
                CommandOutcome::AccountUpdated(self.accounts.close(&account_id)?)
            }
        };
        Ok(outcome)
    }
}
