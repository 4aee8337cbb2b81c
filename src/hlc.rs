// Hybrid Logical Clock (HLC) used to stamp journal records and lease renewals.
//
// Physical milliseconds plus a logical counter. Timestamps handed out by one
// clock are strictly increasing even if the wall clock stalls or steps back,
// and `observe` lets recovery move the clock past everything it replayed.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A Hybrid Logical Clock timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HlcTimestamp {
    /// Physical time component (milliseconds since Unix epoch)
    pub physical: u64,
    /// Logical counter to break ties when physical time is equal
    pub logical: u32,
}

impl HlcTimestamp {
    pub fn new(physical: u64, logical: u32) -> Self {
        Self { physical, logical }
    }

    pub fn zero() -> Self {
        Self {
            physical: 0,
            logical: 0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.physical == 0 && self.logical == 0
    }

    /// Physical milliseconds elapsed between `earlier` and `self`, zero if
    /// `earlier` is not actually earlier.
    pub fn millis_since(&self, earlier: HlcTimestamp) -> u64 {
        self.physical.saturating_sub(earlier.physical)
    }

    pub fn as_system_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.physical)
    }
}

impl std::fmt::Display for HlcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.physical, self.logical)
    }
}

/// Source of physical milliseconds for an [`Hlc`].
pub trait PhysicalClock: Send + Sync + std::fmt::Debug {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl PhysicalClock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl PhysicalClock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// A Hybrid Logical Clock
#[derive(Debug)]
pub struct Hlc {
    source: Arc<dyn PhysicalClock>,
    last: Mutex<HlcTimestamp>,
}

impl Hlc {
    pub fn new() -> Self {
        Self::with_source(Arc::new(SystemClock))
    }

    pub fn with_source(source: Arc<dyn PhysicalClock>) -> Self {
        Self {
            source,
            last: Mutex::new(HlcTimestamp::zero()),
        }
    }

    /// Generate a new timestamp, strictly greater than every previous one.
    pub fn now(&self) -> HlcTimestamp {
        let physical_now = self.source.now_millis();
        let mut last = self.last.lock();

        let next = if physical_now > last.physical {
            HlcTimestamp::new(physical_now, 0)
        } else {
            HlcTimestamp::new(last.physical, last.logical + 1)
        };

        *last = next;
        next
    }

    /// Fold in a timestamp produced elsewhere (or replayed from disk) so that
    /// later calls to [`Hlc::now`] order after it.
    pub fn observe(&self, seen: HlcTimestamp) {
        let mut last = self.last.lock();
        if seen > *last {
            *last = seen;
        }
    }

    /// Last timestamp generated or observed
    pub fn last(&self) -> HlcTimestamp {
        *self.last.lock()
    }

    /// Current physical reading without advancing the clock.
    pub fn physical_now(&self) -> u64 {
        self.source.now_millis()
    }
}

impl Default for Hlc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_hlc_timestamp_ordering() {
        let ts1 = HlcTimestamp::new(100, 0);
        let ts2 = HlcTimestamp::new(100, 1);
        let ts3 = HlcTimestamp::new(101, 0);

        assert!(ts1 < ts2);
        assert!(ts2 < ts3);
        assert!(ts1 < ts3);
    }

    #[test]
    fn test_hlc_timestamp_display() {
        let ts = HlcTimestamp::new(1234567890, 42);
        assert_eq!(ts.to_string(), "1234567890:42");
    }

    #[test]
    fn test_logical_counter_when_clock_stalls() {
        let clock = Arc::new(ManualClock::new(5_000));
        let hlc = Hlc::with_source(clock.clone());

        let a = hlc.now();
        let b = hlc.now();
        assert_eq!(a, HlcTimestamp::new(5_000, 0));
        assert_eq!(b, HlcTimestamp::new(5_000, 1));

        clock.advance(Duration::from_millis(3));
        assert_eq!(hlc.now(), HlcTimestamp::new(5_003, 0));
    }

    #[test]
    fn test_clock_stepping_backwards_stays_monotonic() {
        let clock = Arc::new(ManualClock::new(10_000));
        let hlc = Hlc::with_source(clock.clone());

        let before = hlc.now();
        clock.set(9_000);
        let after = hlc.now();
        assert!(after > before);
        assert_eq!(after.physical, 10_000);
    }

    #[test]
    fn test_observe_moves_past_replayed_timestamp() {
        let clock = Arc::new(ManualClock::new(1_000));
        let hlc = Hlc::with_source(clock);

        let replayed = HlcTimestamp::new(2_000, 7);
        hlc.observe(replayed);
        assert_eq!(hlc.last(), replayed);
        assert!(hlc.now() > replayed);

        // observing something older is a no-op
        hlc.observe(HlcTimestamp::new(10, 0));
        assert!(hlc.last() > replayed);
    }

    #[test]
    fn test_millis_since_saturates() {
        let early = HlcTimestamp::new(1_000, 3);
        let late = HlcTimestamp::new(4_500, 0);
        assert_eq!(late.millis_since(early), 3_500);
        assert_eq!(early.millis_since(late), 0);
    }

    #[test]
    fn test_concurrent_now_is_unique() {
        let hlc = Arc::new(Hlc::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let hlc = Arc::clone(&hlc);
            handles.push(thread::spawn(move || {
                (0..200).map(|_| hlc.now()).collect::<Vec<_>>()
            }));
        }

        let mut all = vec![];
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        all.sort();
        for pair in all.windows(2) {
            assert_ne!(pair[0], pair[1], "duplicate timestamp {:?}", pair[0]);
        }
    }
}
