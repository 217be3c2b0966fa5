use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;

use crate::account::AccountId;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Timed out waiting for the lock of account {0}")]
pub struct LockTimeout(pub AccountId);

/// Reader/writer lock per account.
///
/// Writers of several accounts always lock in ascending id order, so two
/// operations touching the same pair of accounts cannot wait on each other.
#[derive(Debug, Default)]
pub struct AccountLocks {
    table: DashMap<AccountId, Arc<RwLock<()>>>,
    timeout: Option<Duration>,
}

impl AccountLocks {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            table: DashMap::new(),
            timeout,
        }
    }

    /// Runs `f` while holding the shared lock of `id`.
    pub fn shared<T>(&self, id: &AccountId, f: impl FnOnce() -> T) -> Result<T, LockTimeout> {
        let handle = self.handle(id);
        let _guard = match self.timeout {
            Some(timeout) => handle
                .try_read_for(timeout)
                .ok_or_else(|| LockTimeout(id.clone()))?,
            None => handle.read(),
        };
        Ok(f())
    }

    /// Runs `f` while holding the shared locks of every id in `ids` at once,
    /// taken in the same order as [`AccountLocks::exclusive`].
    pub fn shared_many<T>(
        &self,
        ids: &[&AccountId],
        f: impl FnOnce() -> T,
    ) -> Result<T, LockTimeout> {
        let handles = self.ordered_handles(ids);

        let mut guards = Vec::with_capacity(handles.len());
        for (id, handle) in &handles {
            let guard = match self.timeout {
                Some(timeout) => handle
                    .try_read_for(timeout)
                    .ok_or_else(|| LockTimeout((*id).clone()))?,
                None => handle.read(),
            };
            guards.push(guard);
        }

        let out = f();
        drop(guards);
        Ok(out)
    }

    /// Runs `f` while holding the exclusive locks of every id in `ids`.
    ///
    /// Nothing has been locked when this returns `Err`.
    pub fn exclusive<T>(
        &self,
        ids: &[&AccountId],
        f: impl FnOnce() -> T,
    ) -> Result<T, LockTimeout> {
        let handles = self.ordered_handles(ids);

        let mut guards = Vec::with_capacity(handles.len());
        for (id, handle) in &handles {
            let guard = match self.timeout {
                Some(timeout) => handle
                    .try_write_for(timeout)
                    .ok_or_else(|| LockTimeout((*id).clone()))?,
                None => handle.write(),
            };
            guards.push(guard);
        }

        let out = f();
        drop(guards);
        Ok(out)
    }

    fn ordered_handles<'a>(
        &self,
        ids: &[&'a AccountId],
    ) -> Vec<(&'a AccountId, Arc<RwLock<()>>)> {
        let mut ordered = ids.to_vec();
        ordered.sort();
        ordered.dedup();
        ordered.into_iter().map(|id| (id, self.handle(id))).collect()
    }

    fn handle(&self, id: &AccountId) -> Arc<RwLock<()>> {
        // the map shard is released before the returned lock is taken
        Arc::clone(&self.table.entry(id.clone()).or_default())
    }
}
