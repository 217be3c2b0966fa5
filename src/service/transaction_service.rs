use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::{
    account::{Account, AccountId},
    money::Money,
    store::{AccountStore, TransactionStore},
    transaction::{Movement, Transaction, TransactionId},
};

use super::{AccountLocks, LedgerError, Subject};

/// Outcome of [`TransactionService::process_pending_transactions`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingReport {
    pub completed: Vec<TransactionId>,
    pub failed: Vec<TransactionId>,
    /// Left pending, e.g. because their accounts could not be locked in time.
    pub skipped: Vec<TransactionId>,
}

/// An account as loaded and as it has to be stored by the unit of work.
struct BalanceChange {
    before: Account,
    after: Account,
}

impl BalanceChange {
    fn new(before: Account, balance: Money) -> Result<Self, LedgerError> {
        let mut after = before.clone();
        after.update_balance(balance)?;
        Ok(Self { before, after })
    }
}

/// Deposits, withdrawals and transfers.
///
/// Every movement runs as one unit of work while holding the exclusive locks of
/// all accounts it touches: the transaction is recorded `Pending`, the accounts
/// are written, and the transaction is recorded `Completed`. If any write fails,
/// the accounts already written are restored and the transaction is recorded
/// `Failed`, all before the locks are released.
#[derive(Clone)]
pub struct TransactionService {
    accounts: Arc<dyn AccountStore>,
    transactions: Arc<dyn TransactionStore>,
    locks: Arc<AccountLocks>,
}

impl TransactionService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        transactions: Arc<dyn TransactionStore>,
        locks: Arc<AccountLocks>,
    ) -> Self {
        Self {
            accounts,
            transactions,
            locks,
        }
    }

    #[instrument(skip_all, fields(account = %account_id, amount = %amount))]
    pub fn deposit(
        &self,
        account_id: &AccountId,
        amount: Money,
    ) -> Result<Transaction, LedgerError> {
        self.execute(Movement::Deposit {
            account_id: account_id.clone(),
            amount,
        })
    }

    #[instrument(skip_all, fields(account = %account_id, amount = %amount))]
    pub fn withdrawal(
        &self,
        account_id: &AccountId,
        amount: Money,
    ) -> Result<Transaction, LedgerError> {
        self.execute(Movement::Withdrawal {
            account_id: account_id.clone(),
            amount,
        })
    }

    #[instrument(skip_all, fields(source = %source_id, target = %target_id, amount = %amount))]
    pub fn transfer(
        &self,
        source_id: &AccountId,
        target_id: &AccountId,
        amount: Money,
    ) -> Result<Transaction, LedgerError> {
        self.execute(Movement::Transfer {
            source_id: source_id.clone(),
            target_id: target_id.clone(),
            amount,
        })
    }

    /// Records a `Pending` transaction without touching any balance. It is
    /// applied by the next [`TransactionService::process_pending_transactions`].
    #[instrument(skip_all, fields(amount = %movement.amount()))]
    pub fn schedule(&self, movement: Movement) -> Result<Transaction, LedgerError> {
        validate(&movement)?;
        let tx = Transaction::scheduled(movement);
        self.transactions
            .save(&tx)
            .map_err(LedgerError::PersistenceFailure)?;
        info!(transaction = %tx.id(), "transaction scheduled");
        Ok(tx)
    }

    pub fn get_transaction(&self, id: &TransactionId) -> Result<Transaction, LedgerError> {
        self.transactions
            .find_by_id(id)
            .map_err(|err| LedgerError::lookup(Subject::Transaction, err))
    }

    /// History of an active account, oldest first.
    pub fn account_transactions(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let account = self
            .locks
            .shared(account_id, || self.load(account_id, Subject::Account))??;
        ensure_active(&account)?;
        self.transactions
            .find_by_account_id(account_id)
            .map_err(LedgerError::PersistenceFailure)
    }

    /// Applies every scheduled pending transaction independently. A transaction
    /// that cannot be applied is recorded `Failed`; one failing never stops the
    /// others. Pending records not created by [`TransactionService::schedule`]
    /// are recorded `Failed` without touching any balance.
    #[instrument(skip_all)]
    pub fn process_pending_transactions(&self) -> Result<PendingReport, LedgerError> {
        let pending = self
            .transactions
            .list_pending()
            .map_err(LedgerError::PersistenceFailure)?;

        let mut report = PendingReport::default();
        for tx in pending {
            let id = tx.id().clone();
            match self.settle_pending(&tx) {
                Ok(Some(settled)) if settled.is_completed() => report.completed.push(id),
                Ok(Some(_)) => report.failed.push(id),
                // finalized by someone else while we waited for the locks
                Ok(None) => {}
                Err(err) => {
                    warn!(transaction = %id, error = %err, "pending transaction skipped");
                    report.skipped.push(id);
                }
            }
        }
        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "pending transactions processed"
        );
        Ok(report)
    }

    fn execute(&self, movement: Movement) -> Result<Transaction, LedgerError> {
        validate(&movement)?;
        let mut tx = Transaction::new(movement);
        let ids = owned_account_ids(&tx);
        let ids: Vec<&AccountId> = ids.iter().collect();

        let result = self.locks.exclusive(&ids, || -> Result<Transaction, LedgerError> {
            let changes = self.plan(&tx)?;
            self.commit(&mut tx, &changes)?;
            Ok(tx)
        })?;

        match &result {
            Ok(tx) => info!(transaction = %tx.id(), kind = ?tx.kind(), "transaction completed"),
            Err(err @ LedgerError::PersistenceFailure(_)) => {
                warn!(error = %err, "transaction failed")
            }
            Err(err) => debug!(error = %err, "transaction rejected"),
        }
        result
    }

    fn settle_pending(&self, snapshot: &Transaction) -> Result<Option<Transaction>, LedgerError> {
        let ids = owned_account_ids(snapshot);
        let ids: Vec<&AccountId> = ids.iter().collect();

        self.locks.exclusive(&ids, || -> Result<Option<Transaction>, LedgerError> {
            let mut tx = self
                .transactions
                .find_by_id(snapshot.id())
                .map_err(|err| LedgerError::lookup(Subject::Transaction, err))?;
            if !tx.is_pending() {
                return Ok(None);
            }
            if !tx.is_scheduled() {
                // left behind by a call that already reported its failure and
                // could not record it; applying it now would apply it twice
                warn!(transaction = %tx.id(), "abandoned transaction recorded as failed");
                self.record_failure(&mut tx);
                return Ok(Some(tx));
            }
            let outcome = self
                .plan(&tx)
                .and_then(|changes| self.commit(&mut tx, &changes));
            if let Err(err) = outcome {
                warn!(transaction = %tx.id(), error = %err, "pending transaction failed");
                if tx.is_pending() {
                    self.record_failure(&mut tx);
                }
            }
            Ok(Some(tx))
        })?
    }

    /// Loads and validates the accounts a transaction touches and computes
    /// their new balances. Writes nothing.
    fn plan(&self, tx: &Transaction) -> Result<Vec<BalanceChange>, LedgerError> {
        match tx.movement() {
            Movement::Deposit { account_id, amount } => {
                let account = self.load(&account_id, Subject::Account)?;
                ensure_active(&account)?;
                let balance = account.balance().add(&amount)?;
                Ok(vec![BalanceChange::new(account, balance)?])
            }
            Movement::Withdrawal { account_id, amount } => {
                let account = self.load(&account_id, Subject::Account)?;
                ensure_active(&account)?;
                ensure_covers(&account, &amount)?;
                let balance = account.balance().subtract(&amount)?;
                Ok(vec![BalanceChange::new(account, balance)?])
            }
            Movement::Transfer {
                source_id,
                target_id,
                amount,
            } => {
                let source = self.load(&source_id, Subject::SourceAccount)?;
                let target = self.load(&target_id, Subject::TargetAccount)?;
                ensure_active(&source)?;
                ensure_active(&target)?;
                ensure_covers(&source, &amount)?;
                let source_balance = source.balance().subtract(&amount)?;
                let target_balance = target.balance().add(&amount)?;
                Ok(vec![
                    BalanceChange::new(source, source_balance)?,
                    BalanceChange::new(target, target_balance)?,
                ])
            }
        }
    }

    /// Writes a planned movement. Must run under the exclusive locks of every
    /// account in `changes`.
    fn commit(&self, tx: &mut Transaction, changes: &[BalanceChange]) -> Result<(), LedgerError> {
        self.transactions
            .save(tx)
            .map_err(LedgerError::PersistenceFailure)?;

        for (written, change) in changes.iter().enumerate() {
            if let Err(err) = self.accounts.save(&change.after) {
                warn!(
                    account = %change.after.id(),
                    error = %err,
                    "account write failed, rolling back"
                );
                self.roll_back(&changes[..written]);
                self.record_failure(tx);
                return Err(LedgerError::PersistenceFailure(err));
            }
        }

        let mut completed = tx.clone();
        completed.complete()?;
        if let Err(err) = self.transactions.save(&completed) {
            warn!(transaction = %tx.id(), error = %err, "completion write failed, rolling back");
            self.roll_back(changes);
            self.record_failure(tx);
            return Err(LedgerError::PersistenceFailure(err));
        }
        *tx = completed;
        Ok(())
    }

    fn roll_back(&self, changes: &[BalanceChange]) {
        for change in changes.iter().rev() {
            if let Err(err) = self.accounts.save(&change.before) {
                error!(
                    account = %change.before.id(),
                    balance = %change.before.balance(),
                    error = %err,
                    "rollback failed, account needs manual repair"
                );
            }
        }
    }

    fn record_failure(&self, tx: &mut Transaction) {
        if tx.fail().is_err() {
            return;
        }
        if let Err(err) = self.transactions.save(tx) {
            error!(transaction = %tx.id(), error = %err, "failed to record failed transaction");
        }
    }

    fn load(&self, id: &AccountId, subject: Subject) -> Result<Account, LedgerError> {
        self.accounts
            .find_by_id(id)
            .map_err(|err| LedgerError::lookup(subject, err))
    }
}

fn validate(movement: &Movement) -> Result<(), LedgerError> {
    if let Movement::Transfer {
        source_id,
        target_id,
        ..
    } = movement
    {
        if source_id == target_id {
            return Err(LedgerError::InvalidArgument(format!(
                "cannot transfer from account {source_id} to itself"
            )));
        }
    }
    let amount = movement.amount();
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

fn ensure_active(account: &Account) -> Result<(), LedgerError> {
    if account.is_active() {
        Ok(())
    } else {
        Err(LedgerError::AccountInactive {
            id: account.id().clone(),
            status: account.status(),
        })
    }
}

fn ensure_covers(account: &Account, amount: &Money) -> Result<(), LedgerError> {
    if account.balance().covers(amount)? {
        Ok(())
    } else {
        Err(LedgerError::InsufficientBalance {
            id: account.id().clone(),
            available: account.balance(),
            requested: *amount,
        })
    }
}

fn owned_account_ids(tx: &Transaction) -> Vec<AccountId> {
    tx.account_ids().into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread, time::Duration};

    use parking_lot::Mutex;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::{
        account::{AccountStatus, OwnerId},
        money::Currency,
        service::AccountService,
        store::{
            StoreError,
            in_memory::{InMemoryAccountStore, InMemoryTransactionStore},
        },
        transaction::{TransactionKind, TransactionStatus},
    };

    use super::*;

    /// Account store failing every write of one chosen account and stalling
    /// every write of another.
    #[derive(Default)]
    struct FlakyAccounts {
        inner: InMemoryAccountStore,
        broken: Mutex<Option<AccountId>>,
        slow: Mutex<Option<AccountId>>,
    }

    impl AccountStore for FlakyAccounts {
        fn find_by_id(&self, id: &AccountId) -> Result<Account, StoreError> {
            self.inner.find_by_id(id)
        }

        fn find_by_owner_id(&self, owner_id: &OwnerId) -> Result<Vec<Account>, StoreError> {
            self.inner.find_by_owner_id(owner_id)
        }

        fn save(&self, account: &Account) -> Result<(), StoreError> {
            if self.broken.lock().as_ref() == Some(account.id()) {
                return Err(StoreError::Backend("disk on fire".to_string()));
            }
            let stall = self.slow.lock().as_ref() == Some(account.id());
            if stall {
                thread::sleep(Duration::from_millis(200));
            }
            self.inner.save(account)
        }

        fn delete(&self, id: &AccountId) -> Result<(), StoreError> {
            self.inner.delete(id)
        }

        fn get_balance(&self, id: &AccountId) -> Result<Money, StoreError> {
            self.inner.get_balance(id)
        }
    }

    /// Transaction store failing every write of one chosen status.
    #[derive(Default)]
    struct FlakyTransactions {
        inner: InMemoryTransactionStore,
        broken: Mutex<Option<TransactionStatus>>,
    }

    impl TransactionStore for FlakyTransactions {
        fn find_by_id(&self, id: &TransactionId) -> Result<Transaction, StoreError> {
            self.inner.find_by_id(id)
        }

        fn find_by_account_id(
            &self,
            account_id: &AccountId,
        ) -> Result<Vec<Transaction>, StoreError> {
            self.inner.find_by_account_id(account_id)
        }

        fn save(&self, transaction: &Transaction) -> Result<(), StoreError> {
            if *self.broken.lock() == Some(transaction.status()) {
                return Err(StoreError::Backend("log unavailable".to_string()));
            }
            self.inner.save(transaction)
        }

        fn list_pending(&self) -> Result<Vec<Transaction>, StoreError> {
            self.inner.list_pending()
        }
    }

    struct Fixture {
        accounts: Arc<FlakyAccounts>,
        transactions: Arc<FlakyTransactions>,
        account_service: AccountService,
        service: TransactionService,
    }

    impl Fixture {
        fn new() -> Self {
            let accounts = Arc::new(FlakyAccounts::default());
            let transactions = Arc::new(FlakyTransactions::default());
            let locks = Arc::new(AccountLocks::default());
            Self {
                account_service: AccountService::new(accounts.clone(), locks.clone()),
                service: TransactionService::new(accounts.clone(), transactions.clone(), locks),
                accounts,
                transactions,
            }
        }

        fn open(&self, balance: Decimal) -> AccountId {
            let acc = self
                .account_service
                .create_account(OwnerId::new("owner"), Currency::USD)
                .unwrap();
            if balance > Decimal::ZERO {
                self.service.deposit(acc.id(), usd(balance)).unwrap();
            }
            acc.id().clone()
        }

        fn balance(&self, id: &AccountId) -> Decimal {
            self.account_service.get_balance(id).unwrap().amount()
        }
    }

    fn usd(amount: Decimal) -> Money {
        Money::new(amount, Currency::USD)
    }

    #[test]
    fn deposit_adds_to_balance() {
        let f = Fixture::new();
        let acc = f.open(dec!(0));

        let tx = f.service.deposit(&acc, usd(dec!(100.00))).unwrap();
        assert_eq!(tx.status(), TransactionStatus::Completed);
        assert_eq!(tx.kind(), TransactionKind::Deposit);
        assert!(tx.processed_at().is_some());
        assert_eq!(f.balance(&acc), dec!(100.00));

        f.service.deposit(&acc, usd(dec!(0.55))).unwrap();
        assert_eq!(f.balance(&acc), dec!(100.55));
        assert_eq!(f.service.get_transaction(tx.id()).unwrap(), tx);
    }

    #[test]
    fn deposit_validation_leaves_no_record() {
        let f = Fixture::new();
        let acc = f.open(dec!(0));

        let err = f.service.deposit(&acc, usd(dec!(0))).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
        let err = f.service.deposit(&acc, usd(dec!(-3))).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        let err = f
            .service
            .deposit(&acc, Money::new(dec!(3), Currency::EUR))
            .unwrap_err();
        assert!(matches!(err, LedgerError::CurrencyMismatch(_)));

        let err = f
            .service
            .deposit(&AccountId::new("acc_nope"), usd(dec!(1)))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::NotFound {
                subject: Subject::Account,
                ..
            }
        ));

        assert!(f.transactions.inner.is_empty());
        assert_eq!(f.balance(&acc), dec!(0));
    }

    #[test]
    fn withdraw_requires_funds() {
        let f = Fixture::new();
        let acc = f.open(dec!(100));

        let err = f.service.withdrawal(&acc, usd(dec!(150))).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(f.balance(&acc), dec!(100));

        let tx = f.service.withdrawal(&acc, usd(dec!(100))).unwrap();
        assert_eq!(tx.kind(), TransactionKind::Withdrawal);
        assert!(tx.is_completed());
        assert_eq!(f.balance(&acc), dec!(0));
    }

    #[test]
    fn inactive_accounts_reject_movements() {
        let f = Fixture::new();
        let acc = f.open(dec!(10));
        let other = f.open(dec!(10));
        f.account_service.suspend(&acc).unwrap();

        for err in [
            f.service.deposit(&acc, usd(dec!(1))).unwrap_err(),
            f.service.withdrawal(&acc, usd(dec!(1))).unwrap_err(),
            f.service.transfer(&acc, &other, usd(dec!(1))).unwrap_err(),
            f.service.transfer(&other, &acc, usd(dec!(1))).unwrap_err(),
        ] {
            assert!(matches!(
                err,
                LedgerError::AccountInactive {
                    status: AccountStatus::Suspended,
                    ..
                }
            ));
        }
        assert_eq!(f.balance(&acc), dec!(10));
        assert_eq!(f.balance(&other), dec!(10));
    }

    #[test]
    fn transfer_moves_money() {
        let f = Fixture::new();
        let a = f.open(dec!(100));
        let b = f.open(dec!(0));

        let tx = f.service.transfer(&a, &b, usd(dec!(40))).unwrap();
        assert_eq!(tx.kind(), TransactionKind::Transfer);
        assert!(tx.is_completed());
        assert_eq!(tx.account_id(), &a);
        assert_eq!(tx.source_account_id(), Some(&a));
        assert_eq!(tx.target_account_id(), Some(&b));
        assert_eq!(f.balance(&a), dec!(60));
        assert_eq!(f.balance(&b), dec!(40));

        let history = f.service.account_transactions(&b).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id(), tx.id());
        // deposit + transfer
        assert_eq!(f.service.account_transactions(&a).unwrap().len(), 2);
    }

    #[test]
    fn transfer_validation() {
        let f = Fixture::new();
        let a = f.open(dec!(10));
        let missing = AccountId::new("acc_missing");

        let err = f.service.transfer(&a, &a, usd(dec!(1))).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));

        let err = f.service.transfer(&missing, &a, usd(dec!(1))).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::NotFound {
                subject: Subject::SourceAccount,
                ..
            }
        ));
        let err = f.service.transfer(&a, &missing, usd(dec!(1))).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::NotFound {
                subject: Subject::TargetAccount,
                ..
            }
        ));
        assert_eq!(err.to_string(), "Target account `acc_missing` not found");

        let b = f.open(dec!(0));
        let err = f.service.transfer(&a, &b, usd(dec!(10.01))).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        let err = f.service.transfer(&a, &b, usd(dec!(0))).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        assert_eq!(f.balance(&a), dec!(10));
        assert_eq!(f.balance(&b), dec!(0));
        // only the funding deposit was recorded
        assert_eq!(f.transactions.inner.len(), 1);
    }

    #[test]
    fn failed_target_write_rolls_back_source() {
        let f = Fixture::new();
        let a = f.open(dec!(100));
        let b = f.open(dec!(5));
        *f.accounts.broken.lock() = Some(b.clone());

        let err = f.service.transfer(&a, &b, usd(dec!(30))).unwrap_err();
        assert!(matches!(err, LedgerError::PersistenceFailure(_)));
        assert_eq!(f.balance(&a), dec!(100));
        assert_eq!(f.balance(&b), dec!(5));

        let history = f.transactions.inner.find_by_account_id(&b).unwrap();
        let failed: Vec<_> = history
            .iter()
            .filter(|tx| tx.kind() == TransactionKind::Transfer)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status(), TransactionStatus::Failed);
        assert!(failed[0].processed_at().is_some());
    }

    #[test]
    fn failed_completion_write_rolls_back_balances() {
        let f = Fixture::new();
        let a = f.open(dec!(100));
        let b = f.open(dec!(0));
        *f.transactions.broken.lock() = Some(TransactionStatus::Completed);

        let err = f.service.transfer(&a, &b, usd(dec!(30))).unwrap_err();
        assert!(matches!(err, LedgerError::PersistenceFailure(_)));
        let err = f.service.deposit(&b, usd(dec!(1))).unwrap_err();
        assert!(matches!(err, LedgerError::PersistenceFailure(_)));

        assert_eq!(f.balance(&a), dec!(100));
        assert_eq!(f.balance(&b), dec!(0));
        let statuses: Vec<_> = f
            .transactions
            .inner
            .find_by_account_id(&b)
            .unwrap()
            .iter()
            .map(Transaction::status)
            .collect();
        assert_eq!(
            statuses,
            vec![TransactionStatus::Failed, TransactionStatus::Failed]
        );
        assert!(f.transactions.inner.list_pending().unwrap().is_empty());
    }

    #[test]
    fn failed_pending_write_changes_nothing() {
        let f = Fixture::new();
        let a = f.open(dec!(10));
        *f.transactions.broken.lock() = Some(TransactionStatus::Pending);

        let err = f.service.withdrawal(&a, usd(dec!(5))).unwrap_err();
        assert!(matches!(err, LedgerError::PersistenceFailure(_)));
        assert_eq!(f.balance(&a), dec!(10));
        assert_eq!(f.transactions.inner.len(), 1);
    }

    #[test]
    fn process_pending_applies_each_independently() {
        let f = Fixture::new();
        let a = f.open(dec!(50));
        let b = f.open(dec!(0));

        let ok = f
            .service
            .schedule(Movement::Transfer {
                source_id: a.clone(),
                target_id: b.clone(),
                amount: usd(dec!(20)),
            })
            .unwrap();
        let too_big = f
            .service
            .schedule(Movement::Withdrawal {
                account_id: b.clone(),
                amount: usd(dec!(1000)),
            })
            .unwrap();
        let deposit = f
            .service
            .schedule(Movement::Deposit {
                account_id: b.clone(),
                amount: usd(dec!(1)),
            })
            .unwrap();
        assert!(ok.is_pending());
        assert!(ok.is_scheduled());
        // nothing applied yet
        assert_eq!(f.balance(&a), dec!(50));
        assert_eq!(f.transactions.inner.list_pending().unwrap().len(), 3);

        let report = f.service.process_pending_transactions().unwrap();
        assert_eq!(report.completed, vec![ok.id().clone(), deposit.id().clone()]);
        assert_eq!(report.failed, vec![too_big.id().clone()]);
        assert!(report.skipped.is_empty());

        assert_eq!(f.balance(&a), dec!(30));
        assert_eq!(f.balance(&b), dec!(21));
        assert_eq!(
            f.service.get_transaction(too_big.id()).unwrap().status(),
            TransactionStatus::Failed
        );

        // terminal transactions are left alone
        let report = f.service.process_pending_transactions().unwrap();
        assert_eq!(report, PendingReport::default());
        assert_eq!(f.balance(&b), dec!(21));
    }

    #[test]
    fn unrecorded_failure_is_never_applied_later() {
        let f = Fixture::new();
        let a = f.open(dec!(100));
        let b = f.open(dec!(0));
        *f.accounts.broken.lock() = Some(b.clone());
        *f.transactions.broken.lock() = Some(TransactionStatus::Failed);

        let err = f.service.transfer(&a, &b, usd(dec!(30))).unwrap_err();
        assert!(matches!(err, LedgerError::PersistenceFailure(_)));
        let stuck = f.transactions.inner.list_pending().unwrap();
        assert_eq!(stuck.len(), 1);
        assert!(!stuck[0].is_scheduled());

        *f.accounts.broken.lock() = None;
        *f.transactions.broken.lock() = None;
        let report = f.service.process_pending_transactions().unwrap();
        assert!(report.completed.is_empty());
        assert_eq!(report.failed, vec![stuck[0].id().clone()]);

        assert_eq!(f.balance(&a), dec!(100));
        assert_eq!(f.balance(&b), dec!(0));
        assert_eq!(
            f.service.get_transaction(stuck[0].id()).unwrap().status(),
            TransactionStatus::Failed
        );
    }

    #[test]
    fn owner_listing_never_sees_half_transfer() {
        let f = Fixture::new();
        let a = f.open(dec!(100));
        let b = f.open(dec!(0));
        *f.accounts.slow.lock() = Some(b.clone());

        thread::scope(|scope| {
            let transfer = scope.spawn(|| f.service.transfer(&a, &b, usd(dec!(40))));
            thread::sleep(Duration::from_millis(50));

            let owned = f
                .account_service
                .accounts_of_owner(&OwnerId::new("owner"))
                .unwrap();
            let total: Decimal = owned.iter().map(|acc| acc.balance().amount()).sum();
            assert_eq!(owned.len(), 2);
            assert_eq!(total, dec!(100));

            transfer.join().unwrap().unwrap();
        });
        assert_eq!(f.balance(&a), dec!(60));
        assert_eq!(f.balance(&b), dec!(40));
    }

    #[test]
    fn process_pending_marks_persistence_failures_failed() {
        let f = Fixture::new();
        let a = f.open(dec!(0));
        let scheduled = f
            .service
            .schedule(Movement::Deposit {
                account_id: a.clone(),
                amount: usd(dec!(5)),
            })
            .unwrap();

        *f.accounts.broken.lock() = Some(a.clone());
        let report = f.service.process_pending_transactions().unwrap();
        assert_eq!(report.failed, vec![scheduled.id().clone()]);
        assert_eq!(f.balance(&a), dec!(0));
        assert_eq!(
            f.service.get_transaction(scheduled.id()).unwrap().status(),
            TransactionStatus::Failed
        );
    }

    #[test]
    fn schedule_validates_shape() {
        let f = Fixture::new();
        let a = f.open(dec!(0));
        assert!(matches!(
            f.service.schedule(Movement::Deposit {
                account_id: a.clone(),
                amount: usd(dec!(-1)),
            }),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            f.service.schedule(Movement::Transfer {
                source_id: a.clone(),
                target_id: a.clone(),
                amount: usd(dec!(1)),
            }),
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(
            f.service
                .get_transaction(&TransactionId::new("tx_missing"))
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn history_requires_active_account() {
        let f = Fixture::new();
        let a = f.open(dec!(1));
        f.account_service.suspend(&a).unwrap();
        assert!(matches!(
            f.service.account_transactions(&a),
            Err(LedgerError::AccountInactive { .. })
        ));
        assert!(
            f.service
                .account_transactions(&AccountId::new("acc_missing"))
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn concurrent_deposits_are_not_lost() {
        let f = Fixture::new();
        let acc = f.open(dec!(0));

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        f.service.deposit(&acc, usd(dec!(1.25))).unwrap();
                    }
                });
            }
        });
        assert_eq!(f.balance(&acc), dec!(500.00));
    }

    #[test]
    fn opposite_transfers_conserve_money() {
        let f = Fixture::new();
        let a = f.open(dec!(1000));
        let b = f.open(dec!(1000));
        let barrier = Barrier::new(2);

        thread::scope(|scope| {
            scope.spawn(|| {
                barrier.wait();
                for _ in 0..200 {
                    f.service.transfer(&a, &b, usd(dec!(3))).unwrap();
                }
            });
            scope.spawn(|| {
                barrier.wait();
                for _ in 0..200 {
                    f.service.transfer(&b, &a, usd(dec!(2))).unwrap();
                }
            });
        });

        assert_eq!(f.balance(&a), dec!(800));
        assert_eq!(f.balance(&b), dec!(1200));
    }

    #[test]
    fn lock_timeout_before_any_write() {
        let accounts = Arc::new(InMemoryAccountStore::new());
        let transactions = Arc::new(InMemoryTransactionStore::new());
        let locks = Arc::new(AccountLocks::new(Some(Duration::from_millis(20))));
        let service =
            TransactionService::new(accounts.clone(), transactions.clone(), locks.clone());
        let acc = Account::open(OwnerId::new("owner"), Currency::USD);
        accounts.save(&acc).unwrap();

        let result = locks
            .exclusive(&[acc.id()], || {
                thread::scope(|scope| {
                    scope
                        .spawn(|| service.deposit(acc.id(), usd(dec!(1))))
                        .join()
                        .unwrap()
                })
            })
            .unwrap();
        assert!(matches!(result, Err(LedgerError::LockTimeout(_))));
        assert!(transactions.is_empty());
        assert_eq!(accounts.get_balance(acc.id()).unwrap(), Money::zero(Currency::USD));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Any sequence of transfers, successful or rejected, keeps the total
        /// and never drives a balance negative.
        #[test]
        fn transfers_conserve_total(
            moves in prop::collection::vec((0usize..3, 0usize..3, 1i64..10_000), 1..40)
        ) {
            let f = Fixture::new();
            let ids = [f.open(dec!(50)), f.open(dec!(25)), f.open(dec!(0))];

            for (from, to, cents) in moves {
                let _ = f.service.transfer(&ids[from], &ids[to], usd(Decimal::new(cents, 2)));
            }

            let balances: Vec<Decimal> = ids.iter().map(|id| f.balance(id)).collect();
            prop_assert_eq!(balances.iter().copied().sum::<Decimal>(), dec!(75));
            prop_assert!(balances.iter().all(|b| *b >= Decimal::ZERO));
        }
    }
}
