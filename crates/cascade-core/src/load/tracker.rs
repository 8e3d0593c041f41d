use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::snapshot::LoadSnapshot;

/// How many snapshots are retained per service.
const HISTORY_CAPACITY: usize = 100;

/// Per-service load state: the latest snapshot plus bounded history.
#[derive(Debug)]
struct ServiceLoad {
    latest: LoadSnapshot,
    history: VecDeque<LoadSnapshot>,
}

/// Process-wide registry of service load snapshots.
///
/// Written by the load monitor loop and read by the scheduler and the
/// target selector; the interior mutex is the only synchronization. History
/// is in-process only and lost on restart.
#[derive(Debug, Default)]
pub struct LoadTracker {
    services: Mutex<HashMap<String, ServiceLoad>>,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a snapshot, displacing the oldest history entry at capacity.
    pub fn record(&self, snapshot: LoadSnapshot) {
        let mut services = self.services.lock().unwrap();
        match services.get_mut(&snapshot.service_id) {
            Some(entry) => {
                if entry.history.len() == HISTORY_CAPACITY {
                    entry.history.pop_front();
                }
                entry.history.push_back(snapshot.clone());
                entry.latest = snapshot;
            }
            None => {
                let mut history = VecDeque::with_capacity(HISTORY_CAPACITY);
                history.push_back(snapshot.clone());
                services.insert(
                    snapshot.service_id.clone(),
                    ServiceLoad {
                        latest: snapshot,
                        history,
                    },
                );
            }
        }
    }

    /// Latest snapshot for one service.
    pub fn latest(&self, service_id: &str) -> Option<LoadSnapshot> {
        self.services
            .lock()
            .unwrap()
            .get(service_id)
            .map(|s| s.latest.clone())
    }

    /// Latest snapshot per service.
    pub fn snapshot_map(&self) -> HashMap<String, LoadSnapshot> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .map(|(id, s)| (id.clone(), s.latest.clone()))
            .collect()
    }

    /// Retained history for one service, oldest first.
    pub fn history(&self, service_id: &str) -> Vec<LoadSnapshot> {
        self.services
            .lock()
            .unwrap()
            .get(service_id)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of tracked services.
    pub fn len(&self) -> usize {
        self.services.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
