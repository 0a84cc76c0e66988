//! Admission state machine for captured events
//!
//! ```text
//!  INIT ──(index empty | budget spent)──► ACTIVE ──(fifo full | alloc fail)──► LAST
//!    └──────────────(fifo full)────────────────────────────────────────────────┘
//! ```
//!
//! INIT drops events the seed snapshot already holds, ACTIVE appends
//! everything, LAST keeps only the newest event per publisher and counts the
//! rest.

use std::collections::HashMap;

use tracing::debug;

use crate::event::{EventKey, decode_valid};

/// What happened to one event offered to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Appended to the FIFO
    Appended,
    /// Already present in the seed snapshot, dropped
    Duplicate,
    /// Kept as its publisher's latest event in overflow mode
    Retained,
    /// Kept in overflow mode, and the overflow now exceeds the publishers seen
    Missed,
    /// Not a valid event, ignored
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Active,
    Last,
}

/// The cache a stopped capture hands back
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureCache {
    pub fifo: Vec<String>,
    /// Latest event per runtime id once the FIFO filled up
    pub last: HashMap<String, String>,
    /// Events processed in overflow mode
    pub overflow: u64,
}

impl CaptureCache {
    /// Overflow events that did not survive in `last`
    pub fn lost(&self) -> u64 {
        self.overflow.saturating_sub(self.last.len() as u64)
    }

    pub fn len(&self) -> usize {
        self.fifo.len() + self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty() && self.last.is_empty()
    }
}

/// Cache under construction, owned by the capture task
#[derive(Debug)]
pub struct Admission {
    phase: Phase,
    max_events: usize,
    fifo: Vec<String>,
    last: HashMap<String, String>,
    overflow: u64,
    /// Highest seed sequence per runtime id, only during INIT
    index: HashMap<String, u64>,
    budget: usize,
    evaluated: usize,
}

impl Admission {
    /// Start a cache, loading `seed` into the FIFO
    ///
    /// Invalid seed entries are skipped. Without valid seeds there is nothing
    /// to deduplicate against and admission starts in ACTIVE.
    pub fn new(max_events: usize, max_publishers: usize, seed: Vec<String>) -> Self {
        let mut fifo = Vec::with_capacity(seed.len());
        let mut index: HashMap<String, u64> = HashMap::new();

        for serialized in seed {
            let Ok((_, EventKey { runtime_id, sequence })) = decode_valid(&serialized) else {
                debug!("Admission::new: skipping invalid seed event");
                continue;
            };
            let highest = index.entry(runtime_id).or_insert(sequence);
            *highest = (*highest).max(sequence);
            fifo.push(serialized);
        }

        let budget = fifo.len();
        let phase = if index.is_empty() { Phase::Active } else { Phase::Init };
        debug!(seeded = budget, publishers = index.len(), ?phase, "Admission::new: cache created");

        let mut admission = Self {
            phase,
            max_events: max_events.max(1),
            fifo,
            last: HashMap::with_capacity(max_publishers),
            overflow: 0,
            index,
            budget,
            evaluated: 0,
        };
        if admission.phase == Phase::Active && admission.fifo.len() >= admission.max_events {
            admission.enter_last();
        }
        admission
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Offer one serialized event to the cache
    pub fn admit(&mut self, serialized: String) -> Outcome {
        let key = match decode_valid(&serialized) {
            Ok((_, key)) => key,
            Err(e) => {
                debug!(error = %e, "Admission::admit: invalid event");
                return Outcome::Invalid;
            }
        };

        match self.phase {
            Phase::Init => self.admit_init(key, serialized),
            Phase::Active => self.append(key, serialized),
            Phase::Last => self.admit_last(key.runtime_id, serialized),
        }
    }

    fn admit_init(&mut self, key: EventKey, serialized: String) -> Outcome {
        self.evaluated += 1;

        let novel = match self.index.get(&key.runtime_id) {
            None => true,
            Some(&cached) => {
                if key.sequence >= cached {
                    self.index.remove(&key.runtime_id);
                }
                key.sequence > cached
            }
        };

        if self.index.is_empty() || self.evaluated >= self.budget {
            debug!(evaluated = self.evaluated, "Admission: INIT complete");
            self.index = HashMap::new();
            self.phase = Phase::Active;
        }

        if novel {
            self.append(key, serialized)
        } else {
            Outcome::Duplicate
        }
    }

    fn append(&mut self, key: EventKey, serialized: String) -> Outcome {
        if self.fifo.len() >= self.max_events || self.fifo.try_reserve(1).is_err() {
            self.enter_last();
            return self.admit_last(key.runtime_id, serialized);
        }

        self.fifo.push(serialized);
        if self.fifo.len() >= self.max_events {
            self.enter_last();
        }
        Outcome::Appended
    }

    fn admit_last(&mut self, runtime_id: String, serialized: String) -> Outcome {
        self.overflow += 1;
        self.last.insert(runtime_id, serialized);
        if self.overflow > self.last.len() as u64 {
            Outcome::Missed
        } else {
            Outcome::Retained
        }
    }

    fn enter_last(&mut self) {
        debug!(fifo = self.fifo.len(), "Admission: entering overflow mode");
        self.last.clear();
        self.phase = Phase::Last;
    }

    pub fn into_cache(self) -> CaptureCache {
        CaptureCache {
            fifo: self.fifo,
            last: self.last,
            overflow: self.overflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn event(runtime_id: &str, sequence: u64) -> String {
        Event::new(runtime_id, sequence, r#"{"test:tick":{}}"#).encode().unwrap()
    }

    /// Twelve events from three publishers, round-robin
    fn fixture() -> Vec<String> {
        (0..12u64).map(|i| event(&format!("g{}", i % 3), i / 3 + 1)).collect()
    }

    #[test]
    fn test_active_appends_until_full() {
        let mut admission = Admission::new(3, 10, Vec::new());
        assert_eq!(admission.phase(), Phase::Active);

        assert_eq!(admission.admit(event("a", 1)), Outcome::Appended);
        assert_eq!(admission.admit(event("a", 2)), Outcome::Appended);
        assert_eq!(admission.admit(event("b", 1)), Outcome::Appended);
        assert_eq!(admission.phase(), Phase::Last);

        assert_eq!(admission.admit(event("a", 3)), Outcome::Retained);
        assert_eq!(admission.admit(event("a", 4)), Outcome::Missed);
        assert_eq!(admission.admit(event("b", 2)), Outcome::Missed);

        let cache = admission.into_cache();
        assert_eq!(cache.fifo.len(), 3);
        assert_eq!(cache.last.len(), 2);
        assert_eq!(cache.last["a"], event("a", 4));
        assert_eq!(cache.overflow, 3);
        assert_eq!(cache.lost(), 1);
    }

    #[test]
    fn test_invalid_events_ignored() {
        let mut admission = Admission::new(2, 10, vec!["garbage".to_string()]);
        assert_eq!(admission.phase(), Phase::Active);
        assert_eq!(admission.admit("{}".to_string()), Outcome::Invalid);
        assert_eq!(admission.admit(r#"{"type":"Subscribe","prefix":""}"#.to_string()), Outcome::Invalid);
        assert!(admission.into_cache().is_empty());
    }

    #[test]
    fn test_seed_dedup() {
        let seed = vec![event("a", 1), event("a", 2), event("b", 5)];
        let mut admission = Admission::new(100, 10, seed.clone());
        assert_eq!(admission.phase(), Phase::Init);

        // Republished snapshot entries are dropped
        assert_eq!(admission.admit(event("a", 1)), Outcome::Duplicate);
        assert_eq!(admission.admit(event("a", 2)), Outcome::Duplicate);
        assert_eq!(admission.phase(), Phase::Init);
        // Unknown publisher during INIT is appended
        assert_eq!(admission.admit(event("c", 1)), Outcome::Appended);
        // Budget of three evaluations spent
        assert_eq!(admission.phase(), Phase::Active);
        assert_eq!(admission.admit(event("b", 6)), Outcome::Appended);

        let cache = admission.into_cache();
        let mut expected = seed;
        expected.push(event("c", 1));
        expected.push(event("b", 6));
        assert_eq!(cache.fifo, expected);
    }

    #[test]
    fn test_newer_event_retires_index_entry() {
        let seed = vec![event("a", 3), event("b", 1)];
        let mut admission = Admission::new(100, 10, seed);

        assert_eq!(admission.admit(event("a", 4)), Outcome::Appended);
        assert_eq!(admission.phase(), Phase::Init);
        assert_eq!(admission.admit(event("b", 2)), Outcome::Appended);
        assert_eq!(admission.phase(), Phase::Active);
    }

    #[test]
    fn test_seed_uses_highest_sequence() {
        let seed = vec![event("a", 5), event("a", 2)];
        let mut admission = Admission::new(100, 10, seed);
        assert_eq!(admission.admit(event("a", 4)), Outcome::Duplicate);
    }

    #[test]
    fn test_seeded_fixture_with_overflow() {
        let events = fixture();
        let seed = events[0..3].to_vec();
        let mut admission = Admission::new(6, 10, seed);

        let missed = events[1..]
            .iter()
            .map(|e| admission.admit(e.clone()))
            .filter(|o| *o == Outcome::Missed)
            .count();

        let cache = admission.into_cache();
        let mut expected_fifo = events[0..3].to_vec();
        expected_fifo.extend_from_slice(&events[3..6]);
        assert_eq!(cache.fifo, expected_fifo);

        assert_eq!(cache.last.len(), 3);
        for (i, serialized) in events.iter().enumerate().skip(9) {
            assert_eq!(&cache.last[&format!("g{}", i % 3)], serialized);
        }
        assert_eq!(cache.overflow, 6);
        assert_eq!(cache.lost(), 3);
        assert_eq!(missed, 3);
    }

    #[test]
    fn test_full_seed_goes_straight_to_overflow_after_init() {
        let seed = vec![event("a", 1), event("b", 1)];
        let mut admission = Admission::new(2, 10, seed);

        assert_eq!(admission.admit(event("a", 1)), Outcome::Duplicate);
        assert_eq!(admission.admit(event("c", 1)), Outcome::Retained);
        assert_eq!(admission.phase(), Phase::Last);
    }

    proptest! {
        #[test]
        fn prop_overflow_accounting(max in 1usize..20, extra in 0usize..60, ids in proptest::collection::vec(0u8..6, 80)) {
            let mut admission = Admission::new(max, 8, Vec::new());
            let total = max + extra;
            let mut sequences: HashMap<u8, u64> = HashMap::new();
            let mut missed = 0u64;

            for i in 0..total {
                let id = ids[i % ids.len()];
                let seq = sequences.entry(id).or_default();
                *seq += 1;
                if admission.admit(event(&format!("p{}", id), *seq)) == Outcome::Missed {
                    missed += 1;
                }
            }

            let trailing: HashSet<u8> = (max..total).map(|i| ids[i % ids.len()]).collect();
            let cache = admission.into_cache();
            prop_assert_eq!(cache.fifo.len(), max);
            prop_assert_eq!(cache.last.len(), trailing.len());
            prop_assert_eq!(cache.overflow, extra as u64);
            prop_assert_eq!(cache.lost(), extra as u64 - trailing.len() as u64);
            // Every repeat publisher in overflow is reported, and some novel ones too
            prop_assert!(missed >= cache.lost());
        }

        #[test]
        fn prop_seed_then_republish_has_no_duplicates(k in 1u64..20, m in 0u64..20) {
            let seed: Vec<String> = (1..=k).map(|s| event("pub", s)).collect();
            let mut admission = Admission::new(1000, 8, seed.clone());

            for s in 1..k {
                prop_assert_eq!(admission.admit(event("pub", s)), Outcome::Duplicate);
            }
            for s in k + 1..=k + m {
                prop_assert_eq!(admission.admit(event("pub", s)), Outcome::Appended);
            }

            let cache = admission.into_cache();
            let expected: Vec<String> = (1..=k + m).map(|s| event("pub", s)).collect();
            prop_assert_eq!(cache.fifo, expected);
        }
    }
}
