//! Cryptocurrency prices guarded by one lock.
//!
//! The updater holds the lock for the whole (slow) fetch. Readers use
//! `try_lock`, so a display refresh is skipped instead of stalled while an
//! update is in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::Duration;

use rand::Rng;

use crate::cancel::{CancellationToken, Cancelled};
use crate::task::InterruptibleTask;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Prices {
    pub bitcoin: f64,
    pub ether: f64,
    pub litecoin: f64,
    pub bitcoin_cash: f64,
    pub ripple: f64,
}

impl Prices {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            bitcoin: rng.gen_range(0..20_000) as f64,
            ether: rng.gen_range(0..2_000) as f64,
            litecoin: rng.gen_range(0..500) as f64,
            bitcoin_cash: rng.gen_range(0..5_000) as f64,
            ripple: rng.gen::<f64>(),
        }
    }

    pub fn entries(&self) -> [(&'static str, f64); 5] {
        [
            ("BTC", self.bitcoin),
            ("ETH", self.ether),
            ("LTC", self.litecoin),
            ("BCH", self.bitcoin_cash),
            ("XRP", self.ripple),
        ]
    }
}

#[derive(Default)]
pub struct PricesContainer {
    prices: Mutex<Prices>,
    updates: AtomicU64,
}

impl PricesContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the prices unless an update holds the lock right now.
    pub fn try_snapshot(&self) -> Option<Prices> {
        match self.prices.try_lock() {
            Ok(prices) => Some(*prices),
            Err(TryLockError::Poisoned(poisoned)) => Some(*poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub fn snapshot(&self) -> Prices {
        *self.prices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Completed updates so far.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }
}

pub struct PriceUpdater {
    container: Arc<PricesContainer>,
    fetch_time: Duration,
    interval: Duration,
}

impl PriceUpdater {
    pub fn new(container: Arc<PricesContainer>) -> Self {
        Self {
            container,
            fetch_time: Duration::from_secs(1),
            interval: Duration::from_secs(2),
        }
    }

    pub fn with_timing(mut self, fetch_time: Duration, interval: Duration) -> Self {
        self.fetch_time = fetch_time;
        self.interval = interval;
        self
    }
}

impl InterruptibleTask for PriceUpdater {
    type Output = ();

    fn sentinel(&self) {}

    /// Runs until cancelled.
    fn run(&mut self, token: &CancellationToken) -> Result<(), Cancelled> {
        let mut rng = rand::thread_rng();
        loop {
            {
                let mut prices = self.container.prices.lock().unwrap_or_else(PoisonError::into_inner);
                token.sleep(self.fetch_time)?;
                *prices = Prices::random(&mut rng);
                self.container.updates.fetch_add(1, Ordering::SeqCst);
            }
            token.sleep(self.interval)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{spawn_task, TaskOutcome};
    use std::thread;

    #[test]
    fn test_random_prices_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..1_000 {
            let prices = Prices::random(&mut rng);
            assert!((0.0..20_000.0).contains(&prices.bitcoin));
            assert!((0.0..2_000.0).contains(&prices.ether));
            assert!((0.0..500.0).contains(&prices.litecoin));
            assert!((0.0..5_000.0).contains(&prices.bitcoin_cash));
            assert!((0.0..1.0).contains(&prices.ripple));
        }
    }

    #[test]
    fn test_entries_order() {
        let symbols: Vec<&str> = Prices::default().entries().iter().map(|(symbol, _)| *symbol).collect();
        assert_eq!(symbols, ["BTC", "ETH", "LTC", "BCH", "XRP"]);
    }

    #[test]
    fn test_fresh_container_is_readable() {
        let container = PricesContainer::new();
        assert_eq!(container.try_snapshot(), Some(Prices::default()));
        assert_eq!(container.updates(), 0);
    }

    #[test]
    fn test_reader_skips_while_update_in_flight() {
        let container = Arc::new(PricesContainer::new());
        let updater = PriceUpdater::new(Arc::clone(&container))
            .with_timing(Duration::from_millis(300), Duration::from_secs(5));
        let handle = spawn_task("price-updater", updater).unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(container.try_snapshot(), None);

        thread::sleep(Duration::from_millis(400));
        let prices = container.try_snapshot().expect("lock is free between updates");
        assert_eq!(container.updates(), 1);
        assert_eq!(prices, container.snapshot());

        handle.cancel();
        assert_eq!(handle.join().unwrap(), TaskOutcome::Cancelled(()));
    }

    #[test]
    fn test_cancel_during_fetch_releases_lock() {
        let container = Arc::new(PricesContainer::new());
        let updater = PriceUpdater::new(Arc::clone(&container));
        let handle = spawn_task("price-updater", updater).unwrap();

        thread::sleep(Duration::from_millis(50));
        handle.cancel();
        handle.join().unwrap();

        assert_eq!(container.try_snapshot(), Some(Prices::default()));
        assert_eq!(container.updates(), 0);
    }
}
