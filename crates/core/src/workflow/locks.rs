use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::expense::ExpenseId;

/// One async mutex per expense. Holders of different expenses never wait on each other.
#[derive(Debug, Default)]
pub struct ExpenseLocks {
    locks: Mutex<HashMap<ExpenseId, Arc<AsyncMutex<()>>>>,
}

impl ExpenseLocks {
    pub async fn acquire(&self, expense_id: &ExpenseId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Entries referenced only by the map have no holder and no waiter.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(expense_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        match self.locks.lock() {
            Ok(locks) => locks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::ExpenseLocks;
    use crate::domain::expense::ExpenseId;

    #[tokio::test]
    async fn same_expense_is_serialized() {
        let locks = Arc::new(ExpenseLocks::default());
        let expense_id = ExpenseId("EXP-1".to_string());

        let guard = locks.acquire(&expense_id).await;
        let contender = {
            let locks = Arc::clone(&locks);
            let expense_id = expense_id.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&expense_id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.expect("contender should finish once the lock is released");
    }

    #[tokio::test]
    async fn different_expenses_do_not_contend() {
        let locks = ExpenseLocks::default();
        let _first = locks.acquire(&ExpenseId("EXP-1".to_string())).await;
        let second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&ExpenseId("EXP-2".to_string())),
        )
        .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn released_locks_are_pruned() {
        let locks = ExpenseLocks::default();
        drop(locks.acquire(&ExpenseId("EXP-1".to_string())).await);
        drop(locks.acquire(&ExpenseId("EXP-2".to_string())).await);
        assert_eq!(locks.tracked(), 1);
    }
}
