//! Per-user token (credit) balances.
//!
//! Every mutation runs inside one short critical section of a plain mutex that
//! is never held across an `.await`, so check-then-decrement is indivisible.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{domain::UserId, errors::Error, Result};

#[derive(Debug, Default)]
pub struct QuotaLedger {
    balances: Mutex<HashMap<UserId, u64>>,
}

impl QuotaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, u64>> {
        // Poison is ignored: every update is a single integer store.
        self.balances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unknown users have no credit.
    pub fn get_balance(&self, user: UserId) -> u64 {
        self.lock().get(&user).copied().unwrap_or(0)
    }

    /// Deduct `amount` if the balance covers it. State is untouched on `false`.
    pub fn try_deduct(&self, user: UserId, amount: u64) -> bool {
        let mut map = self.lock();
        let balance = map.get(&user).copied().unwrap_or(0);
        if balance < amount {
            return false;
        }
        map.insert(user, balance - amount);
        true
    }

    pub fn replenish(&self, user: UserId, amount: i64) -> Result<u64> {
        let amount = u64::try_from(amount)
            .ok()
            .filter(|a| *a > 0)
            .ok_or_else(|| Error::InvalidArgument("Amount must be greater than 0".to_string()))?;

        let mut map = self.lock();
        let entry = map.entry(user).or_insert(0);
        *entry = entry.saturating_add(amount);
        Ok(*entry)
    }

    /// Give back tokens taken for a request that never produced a reply.
    pub fn refund(&self, user: UserId, amount: u64) -> u64 {
        let mut map = self.lock();
        let entry = map.entry(user).or_insert(0);
        *entry = entry.saturating_add(amount);
        *entry
    }

    /// Seed a first-time user. Existing balances (spent or topped up) are kept.
    pub fn initialize_if_absent(&self, user: UserId, default_amount: u64) -> u64 {
        *self.lock().entry(user).or_insert(default_amount)
    }

    pub fn user_count(&self) -> usize {
        self.lock().len()
    }
}
