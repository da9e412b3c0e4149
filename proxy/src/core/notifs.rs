use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use common::bck::Bck;
use common::msg::{Action, NotifMsg, XactStats};
use common::time_utils::utc_now_ms;

/// Owner value meaning "any IC member may answer".
pub const EQUAL_IC: &str = "=ic";

/// Listener for one job's termination events; mirrored across IC members.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotifListener {
    pub uuid: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bck: Option<Bck>,
    pub owner: String,
    pub dsts: BTreeSet<String>,
    #[serde(default)]
    pub finished_nodes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(default)]
    pub stats: XactStats,
    pub started_ms: i128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_ms: Option<i128>,
}

impl NotifListener {
    pub fn new(uuid: String, action: Action, bck: Option<Bck>, dsts: BTreeSet<String>) -> Self {
        Self {
            uuid,
            action,
            bck,
            owner: EQUAL_IC.to_string(),
            dsts,
            finished_nodes: BTreeSet::new(),
            err: None,
            stats: XactStats::default(),
            started_ms: utc_now_ms(),
            finished_ms: None,
        }
    }

    pub fn finished(&self) -> bool {
        self.finished_ms.is_some()
    }
}

/// The IC ownership table: one entry per live (or recently-terminal) job.
pub struct NotifTable {
    inner: RwLock<HashMap<String, NotifListener>>,
}

impl Default for NotifTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifTable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, NotifListener>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, NotifListener>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert unless an entry for the UUID already exists.
    pub fn add(&self, nl: NotifListener) -> bool {
        let mut map = self.write();
        if map.contains_key(&nl.uuid) {
            return false;
        }
        map.insert(nl.uuid.clone(), nl);
        true
    }

    pub fn entry(&self, uuid: &str) -> Option<NotifListener> {
        self.read().get(uuid).cloned()
    }

    pub fn get_owner(&self, uuid: &str) -> Option<String> {
        self.read().get(uuid).map(|nl| nl.owner.clone())
    }

    pub fn snapshot(&self) -> Vec<NotifListener> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Union-merge a peer's table. A same-UUID conflict keeps the entry with
    /// the later start time.
    pub fn merge(&self, incoming: Vec<NotifListener>) {
        let mut map = self.write();
        for nl in incoming {
            match map.get(&nl.uuid) {
                Some(cur) if cur.started_ms >= nl.started_ms => {}
                _ => {
                    map.insert(nl.uuid.clone(), nl);
                }
            }
        }
    }

    /// Ingest a target's termination event. Returns false when no listener is
    /// registered for the UUID.
    pub fn on_notif(&self, msg: &NotifMsg) -> bool {
        let mut map = self.write();
        let Some(nl) = map.get_mut(&msg.uuid) else {
            return false;
        };
        if msg.when_terminal {
            nl.finished_nodes.insert(msg.node_id.clone());
            nl.stats.objects += msg.stats.objects;
            nl.stats.bytes += msg.stats.bytes;
            if nl.err.is_none() {
                nl.err = msg.err.clone();
            }
            if !nl.finished() && nl.dsts.iter().all(|d| nl.finished_nodes.contains(d)) {
                nl.finished_ms = Some(utc_now_ms());
            }
        }
        true
    }

    /// Evict terminal listeners past their grace period; force-finish
    /// listeners running beyond the per-listener timeout so late status
    /// queries still get a terminal answer.
    pub fn housekeep(&self, grace: Duration, listener_timeout: Duration) -> usize {
        let now = utc_now_ms();
        let grace_ms = grace.as_millis() as i128;
        let timeout_ms = listener_timeout.as_millis() as i128;
        let mut map = self.write();

        for nl in map.values_mut() {
            if !nl.finished() && now - nl.started_ms > timeout_ms {
                nl.err
                    .get_or_insert_with(|| "listener timed out".to_string());
                nl.finished_ms = Some(now);
            }
        }

        let before = map.len();
        map.retain(|_, nl| match nl.finished_ms {
            Some(fin) => now - fin <= grace_ms,
            None => true,
        });
        before - map.len()
    }
}

pub async fn notif_sweeper(
    table: Arc<NotifTable>,
    interval: Duration,
    grace: Duration,
    listener_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {},
            _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
        }

        let evicted = table.housekeep(grace, listener_timeout);
        if evicted > 0 {
            info!("notification housekeeping: evicted {} listeners", evicted);
        }
    }

    info!("notification sweeper stopped");
    Ok(())
}
