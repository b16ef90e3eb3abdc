// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-account FIFO locks.
//!
//! `tokio::sync::Mutex` queues waiters fairly, so passes for one account run
//! one at a time in the order they asked for the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::ledger::AccountId;

#[derive(Debug, Clone, Default)]
pub struct AccountLocks {
    inner: Arc<Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `account`. Released when the guard drops.
    pub async fn acquire(&self, account: &AccountId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on can go
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(*account).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of accounts currently held or waited on.
    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        let locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waiters_run_in_request_order() {
        let locks = AccountLocks::new();
        let account = AccountId::new(0, 0, 42);
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = locks.acquire(&account).await;
        let mut handles = Vec::new();
        for n in 1..=3 {
            let locks = locks.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(&account).await;
                order.lock().unwrap().push(n);
            }));
            // Let the task queue up before spawning the next one
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
        }

        assert!(order.lock().unwrap().is_empty());
        drop(first);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn different_accounts_do_not_block_each_other() {
        let locks = AccountLocks::new();
        let _a = locks.acquire(&AccountId::new(0, 0, 1)).await;
        let _b = locks.acquire(&AccountId::new(0, 0, 2)).await;
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn released_locks_are_pruned() {
        let locks = AccountLocks::new();
        drop(locks.acquire(&AccountId::new(0, 0, 1)).await);
        let _b = locks.acquire(&AccountId::new(0, 0, 2)).await;
        assert_eq!(locks.inner.lock().unwrap().len(), 1);
    }
}
