//! Consolidated system state for observers.
//!
//! Writers build a fresh `Snapshot` and swap it in whole, so a reader never
//! sees fields from two different updates. Subscribers get every changed
//! snapshot over a bounded channel; a slow subscriber misses intermediate
//! snapshots rather than blocking writers.
use crossbeam_channel as xch;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

use crate::orchestrator::SortState;
use crate::status::{Component, Health, Lifecycle, StatusBoard, SystemStatus};
use crate::types::{Counters, DetectionEvent, FillLevelReading};
use crate::util::now_unix_ms;

const SUBSCRIBER_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Increases by one with every published change.
    pub seq: u64,
    pub status: SystemStatus,
    pub message: String,
    pub health: BTreeMap<Component, Health>,
    pub sort_state: SortState,
    pub fill_levels: BTreeMap<String, FillLevelReading>,
    pub counters: Counters,
    pub last_detection: Option<DetectionEvent>,
    pub updated_at_ms: u64,
}

struct Inner {
    current: RwLock<Arc<Snapshot>>,
    // Held across build, swap and notify so writers cannot lose updates and
    // subscribers see snapshots in sequence order.
    board: Mutex<StatusBoard>,
    subscribers: Mutex<Vec<xch::Sender<Arc<Snapshot>>>>,
}

/// Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct StatePublisher {
    inner: Arc<Inner>,
}

impl StatePublisher {
    pub fn new<I, L>(labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        let board = StatusBoard::default();
        let (status, message) = board.status();
        let snap = Snapshot {
            seq: 0,
            status,
            message,
            health: board.components.clone(),
            sort_state: SortState::Idle,
            fill_levels: BTreeMap::new(),
            counters: Counters::with_labels(labels),
            last_detection: None,
            updated_at_ms: now_unix_ms(),
        };
        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(Arc::new(snap)),
                board: Mutex::new(board),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The latest complete snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        match self.inner.current.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = xch::bounded(SUBSCRIBER_DEPTH);
        if let Ok(mut subs) = self.inner.subscribers.lock() {
            subs.push(tx);
        }
        Subscription { rx }
    }

    pub fn record_detection(&self, event: &DetectionEvent) {
        self.update(|s, _| {
            s.last_detection = Some(event.clone());
            true
        });
    }

    /// Count one completed sort for `label`.
    pub fn record_sort(&self, label: &str) {
        self.update(|s, _| {
            s.counters.record(label);
            true
        });
    }

    pub fn reset_counters(&self) {
        info!("counters reset");
        self.update(|s, _| {
            s.counters.reset();
            true
        });
    }

    pub fn set_fill_level(&self, reading: FillLevelReading) {
        self.update(|s, _| {
            if s.fill_levels.get(&reading.bin) == Some(&reading) {
                return false;
            }
            s.fill_levels.insert(reading.bin.clone(), reading);
            true
        });
    }

    pub fn set_sort_state(&self, state: SortState) {
        self.update(|s, _| {
            let changed = s.sort_state != state;
            s.sort_state = state;
            changed
        });
    }

    pub fn set_health(&self, component: Component, health: Health) {
        self.update(|_, board| board.set(component, health));
    }

    pub fn set_lifecycle(&self, lifecycle: Lifecycle) {
        self.update(|_, board| {
            let changed = board.lifecycle != lifecycle;
            board.lifecycle = lifecycle;
            changed
        });
    }

    /// Apply `f` to a copy of the current snapshot and publish it if `f`
    /// reports a change.
    fn update(&self, f: impl FnOnce(&mut Snapshot, &mut StatusBoard) -> bool) {
        let mut board = match self.inner.board.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = (*self.snapshot()).clone();
        if !f(&mut next, &mut *board) {
            return;
        }
        let (status, message) = board.status();
        if status != next.status {
            debug!(?status, %message, "system status changed");
        }
        next.status = status;
        next.message = message;
        next.health = board.components.clone();
        next.seq += 1;
        next.updated_at_ms = now_unix_ms();
        let next = Arc::new(next);
        match self.inner.current.write() {
            Ok(mut g) => *g = next.clone(),
            Err(poisoned) => *poisoned.into_inner() = next.clone(),
        }
        self.notify(&next);
    }

    fn notify(&self, snap: &Arc<Snapshot>) {
        let Ok(mut subs) = self.inner.subscribers.lock() else {
            return;
        };
        subs.retain(|tx| match tx.try_send(snap.clone()) {
            Ok(()) | Err(xch::TrySendError::Full(_)) => true,
            Err(xch::TrySendError::Disconnected(_)) => false,
        });
    }
}

/// Receiving end of `StatePublisher::subscribe`.
pub struct Subscription {
    rx: xch::Receiver<Arc<Snapshot>>,
}

impl Subscription {
    /// Newest pending snapshot, discarding older ones.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.rx.try_iter().last()
    }

    pub fn recv_timeout(&self, d: std::time::Duration) -> Option<Arc<Snapshot>> {
        self.rx.recv_timeout(d).ok()
    }

    pub fn try_iter(&self) -> impl Iterator<Item = Arc<Snapshot>> + '_ {
        self.rx.try_iter()
    }
}
