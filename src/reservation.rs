//! Time-bounded coin reservations.
//!
//! One table per actor process. Every operation takes the single table
//! mutex, so the check-then-set in [`ReservationTable::lock`] is atomic with
//! respect to concurrent selections and the sweeper.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::error::{ExchangeError, Result};
use crate::model::CoinId;

/// Identifies whoever holds a reservation: one settlement attempt or one
/// binding offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseId(Uuid);

impl LeaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Reservation {
    expires_at: Instant,
    lease: LeaseId,
}

impl Reservation {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

pub struct ReservationTable {
    entries: Mutex<HashMap<CoinId, Reservation>>,
    lock_duration: Duration,
}

impl ReservationTable {
    pub fn new(lock_duration: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            lock_duration,
        }
    }

    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    /// Reserve `coin` for `lease` unless a live reservation exists.
    pub fn lock(&self, coin: &CoinId, lease: LeaseId) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(coin) {
            Some(existing) if existing.is_live(now) => false,
            _ => {
                entries.insert(
                    coin.clone(),
                    Reservation {
                        expires_at: now + self.lock_duration,
                        lease,
                    },
                );
                true
            }
        }
    }

    /// Drop any reservation on `coin`, whoever holds it.
    pub fn unlock(&self, coin: &CoinId) {
        self.entries.lock().remove(coin);
    }

    /// Drop the reservations on `coins` that are still held by `lease`.
    /// Returns how many were removed.
    pub fn release<'a>(&self, coins: impl IntoIterator<Item = &'a CoinId>, lease: LeaseId) -> usize {
        let mut entries = self.entries.lock();
        let mut removed = 0;
        for coin in coins {
            if entries.get(coin).map(|r| r.lease == lease).unwrap_or(false) {
                entries.remove(coin);
                removed += 1;
            }
        }
        removed
    }

    /// Re-acquire every coin for `lease` with a fresh expiry.
    ///
    /// Fails without touching the table if any coin is held live by another
    /// lease. Coins whose reservation lapsed (expired or swept) are taken
    /// back.
    pub fn confirm(&self, coins: &[CoinId], lease: LeaseId) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        for coin in coins {
            if let Some(existing) = entries.get(coin) {
                if existing.lease != lease && existing.is_live(now) {
                    return Err(ExchangeError::ReservationLost(coin.clone()));
                }
            }
        }
        let expires_at = now + self.lock_duration;
        for coin in coins {
            entries.insert(coin.clone(), Reservation { expires_at, lease });
        }
        Ok(())
    }

    /// Evict expired reservations. Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, r| r.is_live(now));
        before - entries.len()
    }

    pub fn is_locked(&self, coin: &CoinId) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .get(coin)
            .map(|r| r.is_live(now))
            .unwrap_or(false)
    }

    pub fn holder(&self, coin: &CoinId) -> Option<LeaseId> {
        self.entries.lock().get(coin).map(|r| r.lease)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run [`sweep`](Self::sweep) every `interval` for the process lifetime.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let table = Arc::clone(self);
        spawn_periodic("reservation-sweep", interval, move || {
            let evicted = table.sweep();
            if evicted > 0 {
                tracing::debug!(evicted, "swept expired reservations");
            }
        })
    }
}

/// Call `task` every `interval` on a dedicated tokio task.
pub fn spawn_periodic<F>(name: &'static str, interval: Duration, task: F) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!(task = name, period = ?interval, "periodic task started");
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            task();
        }
    })
}
