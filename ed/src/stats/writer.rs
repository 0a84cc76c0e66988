//! Writer loop - flushes dirty counters to the persistent store

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::{Context, Result};
use kvstore::Store;
use tracing::{debug, info, warn};

use super::counters::{MISSED_CACHE, PUBLISHED, StatsCounters};

/// Field every counter row stores its value under
pub const VALUE_FIELD: &str = "value";

/// Where flushed counters end up
pub trait CounterStore: Send {
    fn write_counter(&mut self, name: &str, value: u64) -> Result<()>;

    fn read_counter(&self, name: &str) -> Result<Option<u64>>;
}

/// Counters as rows of a [`kvstore::Store`] table
pub struct KvCounterStore {
    store: Store,
    table: String,
}

impl KvCounterStore {
    pub fn new(store: Store, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }
}

impl CounterStore for KvCounterStore {
    fn write_counter(&mut self, name: &str, value: u64) -> Result<()> {
        self.store
            .hset(&self.table, name, VALUE_FIELD, &value.to_string())
            .context(format!("Failed to write counter {}", name))
    }

    fn read_counter(&self, name: &str) -> Result<Option<u64>> {
        let value = self
            .store
            .hget(&self.table, name, VALUE_FIELD)
            .context(format!("Failed to read counter {}", name))?;
        value
            .map(|v| v.parse::<u64>().context(format!("Counter {} holds non-numeric value {:?}", name, v)))
            .transpose()
    }
}

/// Write every counter as one row
pub fn flush(store: &mut dyn CounterStore, counters: &StatsCounters) -> Result<()> {
    for (name, value) in counters.snapshot() {
        store.write_counter(name, value)?;
    }
    Ok(())
}

/// Seed `counters` from what the store already holds
pub fn restore_counters(store: &dyn CounterStore, counters: &StatsCounters) -> Result<()> {
    let published = store.read_counter(PUBLISHED)?.unwrap_or(0);
    let missed_cache = store.read_counter(MISSED_CACHE)?.unwrap_or(0);
    debug!(published, missed_cache, "restore_counters: loaded persisted values");
    counters.restore(published, missed_cache);
    Ok(())
}

/// Flush if the dirty flag was set; re-arm it when the store fails
fn flush_if_updated(store: &mut dyn CounterStore, counters: &StatsCounters) {
    if !counters.take_updated() {
        return;
    }
    if let Err(e) = flush(store, counters) {
        warn!(error = %e, "Counter flush failed, retrying next tick");
        counters.mark_updated();
    }
}

/// Body of the writer thread
///
/// Runs until `stop` is set, then flushes once more so nothing counted
/// before shutdown is lost.
pub fn run_writer(mut store: Box<dyn CounterStore>, counters: Arc<StatsCounters>, stop: Arc<AtomicBool>, interval: Duration) {
    info!(?interval, "Stats writer started");
    while !stop.load(Ordering::Acquire) {
        std::thread::sleep(interval);
        flush_if_updated(store.as_mut(), &counters);
    }
    flush_if_updated(store.as_mut(), &counters);
    info!("Stats writer stopped");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store whose writes can be made to fail
    #[derive(Clone, Default)]
    pub(crate) struct MockStore {
        pub rows: Arc<Mutex<HashMap<String, u64>>>,
        pub failing: Arc<AtomicBool>,
    }

    impl CounterStore for MockStore {
        fn write_counter(&mut self, name: &str, value: u64) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(eyre::eyre!("store unavailable"));
            }
            self.rows.lock().unwrap().insert(name.to_string(), value);
            Ok(())
        }

        fn read_counter(&self, name: &str) -> Result<Option<u64>> {
            Ok(self.rows.lock().unwrap().get(name).copied())
        }
    }

    #[test]
    fn test_kv_counter_store_roundtrip() {
        let mut store = KvCounterStore::new(Store::open_in_memory().unwrap(), "COUNTERS_EVENTS");
        assert_eq!(store.read_counter(PUBLISHED).unwrap(), None);

        store.write_counter(PUBLISHED, 42).unwrap();
        assert_eq!(store.read_counter(PUBLISHED).unwrap(), Some(42));
        assert_eq!(
            store.store.hget("COUNTERS_EVENTS", PUBLISHED, VALUE_FIELD).unwrap().as_deref(),
            Some("42")
        );
    }

    #[test]
    fn test_kv_counter_store_rejects_garbage() {
        let store = Store::open_in_memory().unwrap();
        store.hset("T", PUBLISHED, VALUE_FIELD, "lots").unwrap();
        let store = KvCounterStore::new(store, "T");
        assert!(store.read_counter(PUBLISHED).is_err());
    }

    #[test]
    fn test_failed_flush_rearms_dirty_flag() {
        let mut store = MockStore::default();
        let counters = StatsCounters::new();
        counters.add_published(5);

        store.failing.store(true, Ordering::SeqCst);
        flush_if_updated(&mut store, &counters);
        assert!(store.rows.lock().unwrap().is_empty());

        store.failing.store(false, Ordering::SeqCst);
        flush_if_updated(&mut store, &counters);
        assert_eq!(store.rows.lock().unwrap().get(PUBLISHED), Some(&5));
        assert_eq!(store.rows.lock().unwrap().get(MISSED_CACHE), Some(&0));
    }

    #[test]
    fn test_clean_counters_not_written() {
        let mut store = MockStore::default();
        let counters = StatsCounters::new();
        flush_if_updated(&mut store, &counters);
        assert!(store.rows.lock().unwrap().is_empty());
    }

    #[test]
    fn test_restore_counters() {
        let store = MockStore::default();
        store.rows.lock().unwrap().insert(PUBLISHED.to_string(), 9);

        let counters = StatsCounters::new();
        restore_counters(&store, &counters).unwrap();
        assert_eq!(counters.published(), 9);
        assert_eq!(counters.missed_cache(), 0);
    }

    #[test]
    fn test_writer_final_flush_on_stop() {
        let store = MockStore::default();
        let counters = Arc::new(StatsCounters::new());
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let store = Box::new(store.clone());
            let counters = counters.clone();
            let stop = stop.clone();
            std::thread::spawn(move || run_writer(store, counters, stop, Duration::from_millis(10)))
        };

        counters.add_published(2);
        counters.inc_missed_cache();
        stop.store(true, Ordering::Release);
        handle.join().unwrap();

        let rows = store.rows.lock().unwrap();
        assert_eq!(rows.get(PUBLISHED), Some(&2));
        assert_eq!(rows.get(MISSED_CACHE), Some(&1));
    }
}
