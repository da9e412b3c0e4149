use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use common::bck::{Bck, BucketProps};
use common::error::ApiError;
use common::msg::Action;
use common::time_utils::utc_now_ms;

use crate::core::nlp::HeldLock;

/// Per-kind transaction payload, captured at begin and consumed at commit.
#[derive(Clone, Debug)]
pub enum TxnPayload {
    CreateBucket,
    MakeNCopies {
        cur_copies: u32,
        new_copies: u32,
    },
    SetBucketProps {
        bprops: BucketProps,
        nprops: BucketProps,
    },
    RenameBucket {
        bck_from: Bck,
        bck_to: Bck,
    },
    CopyBucket {
        bck_from: Bck,
        bck_to: Bck,
    },
    EcEncode,
}

#[derive(Clone, Debug)]
pub struct TxnView {
    pub uuid: String,
    pub action: Action,
    pub bck: Bck,
    pub started_ms: i128,
    pub expected_bmd_ver: u64,
    pub payload: TxnPayload,
}

impl TxnView {
    pub fn new(
        uuid: String,
        action: Action,
        bck: Bck,
        expected_bmd_ver: u64,
        payload: TxnPayload,
    ) -> Self {
        Self {
            uuid,
            action,
            bck,
            started_ms: utc_now_ms(),
            expected_bmd_ver,
            payload,
        }
    }
}

struct TxnRec {
    view: TxnView,
    nlps: Vec<HeldLock>,
}

/// In-flight transactions keyed by UUID. Not persisted: a restart loses all
/// open transactions and the client re-issues.
pub struct TxnTable {
    txns: Mutex<HashMap<String, TxnRec>>,
    bmd_rx: watch::Receiver<u64>,
}

impl TxnTable {
    pub fn new(bmd_rx: watch::Receiver<u64>) -> Self {
        Self {
            txns: Mutex::new(HashMap::new()),
            bmd_rx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, TxnRec>> {
        self.txns.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn begin(&self, view: TxnView) -> Result<(), ApiError> {
        let mut txns = self.lock();
        if txns.contains_key(&view.uuid) {
            return Err(ApiError::TxnAlreadyExists(view.uuid));
        }
        txns.insert(
            view.uuid.clone(),
            TxnRec {
                view,
                nlps: Vec::new(),
            },
        );
        Ok(())
    }

    /// Hand the held name-locks over to the transaction so that any removal
    /// path (abort, commit completion, GC) releases them.
    pub fn attach_locks(&self, uuid: &str, nlps: Vec<HeldLock>) {
        let mut txns = self.lock();
        if let Some(rec) = txns.get_mut(uuid) {
            rec.nlps.extend(nlps);
        } else {
            // transaction vanished in between; don't leak the locks
            for l in &nlps {
                l.release();
            }
        }
    }

    pub fn find(&self, uuid: &str) -> Result<TxnView, ApiError> {
        self.lock()
            .get(uuid)
            .map(|rec| rec.view.clone())
            .ok_or_else(|| ApiError::TxnNotFound(uuid.to_string()))
    }

    /// Remove the transaction and release its locks. Idempotent.
    pub fn abort(&self, uuid: &str) {
        if let Some(rec) = self.lock().remove(uuid) {
            for l in &rec.nlps {
                l.release();
            }
        }
    }

    /// Commit completed: same cleanup as abort, different intent.
    pub fn done(&self, uuid: &str) {
        self.abort(uuid);
    }

    /// Block until the local BMD version reaches the transaction's expected
    /// version, or the timeout elapses. A zero timeout returns immediately
    /// without polling.
    pub async fn wait(&self, uuid: &str, timeout: Duration) -> Result<(), ApiError> {
        let expected = self.find(uuid)?.expected_bmd_ver;
        let mut rx = self.bmd_rx.clone();
        if *rx.borrow_and_update() >= expected {
            return Ok(());
        }
        if timeout.is_zero() {
            return Err(ApiError::TxnTimeout(uuid.to_string()));
        }
        let reached = tokio::time::timeout(timeout, async {
            loop {
                if rx.changed().await.is_err() {
                    return false;
                }
                if *rx.borrow_and_update() >= expected {
                    return true;
                }
            }
        })
        .await;
        match reached {
            Ok(true) => Ok(()),
            _ => Err(ApiError::TxnTimeout(uuid.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop transactions older than the TTL, releasing their locks.
    pub fn gc_expired(&self, ttl: Duration) -> usize {
        let cutoff = utc_now_ms() - ttl.as_millis() as i128;
        let mut txns = self.lock();
        let stale: Vec<String> = txns
            .iter()
            .filter(|(_, rec)| rec.view.started_ms < cutoff)
            .map(|(uuid, _)| uuid.clone())
            .collect();
        for uuid in &stale {
            if let Some(rec) = txns.remove(uuid) {
                for l in &rec.nlps {
                    l.release();
                }
            }
        }
        stale.len()
    }
}

pub async fn txn_gc_sweeper(
    table: Arc<TxnTable>,
    ttl: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {},
            _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
        }

        let n = table.gc_expired(ttl);
        if n > 0 {
            info!("transaction GC: removed {} expired transactions", n);
        }
    }

    info!("transaction GC sweeper stopped");
    Ok(())
}
