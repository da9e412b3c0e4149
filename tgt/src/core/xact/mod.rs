pub mod bck_copy;
pub mod bck_rename;
pub mod ec_encode;
pub mod jogger;
pub mod make_n_copies;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tracing::info;

use common::bck::Bck;
use common::error::ApiError;
use common::msg::{Action, XactStats, XactStatusResp};
use common::time_utils::utc_now_ms;

use crate::core::mountpath::MountpathRegistry;
use crate::core::notif::{self, NotifCtx};
use crate::core::state::TargetState;
use crate::core::xact::jogger::{JogCallback, Jogger};

/// Shared lifecycle of every extended action: identity, counters, abort
/// channel, terminal state, and notification destinations.
pub struct XactBase {
    pub uuid: String,
    pub kind: Action,
    pub bck: Option<Bck>,
    pub start_ms: i128,
    objects: AtomicU64,
    bytes: AtomicU64,
    aborted: AtomicBool,
    finished: AtomicBool,
    end_ms: AtomicI64,
    err: Mutex<Option<String>>,
    abort_tx: watch::Sender<bool>,
    notif_dsts: Mutex<Vec<String>>,
}

impl XactBase {
    pub fn new(uuid: &str, kind: Action, bck: Option<Bck>) -> Arc<Self> {
        let (abort_tx, _) = watch::channel(false);
        Arc::new(Self {
            uuid: uuid.to_string(),
            kind,
            bck,
            start_ms: utc_now_ms(),
            objects: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            end_ms: AtomicI64::new(0),
            err: Mutex::new(None),
            abort_tx,
            notif_dsts: Mutex::new(Vec::new()),
        })
    }

    /// Idempotent: the first call signals the abort channel, later calls are
    /// no-ops.
    pub fn abort(&self) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            self.abort_tx.send_replace(true);
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.is_finished() && !self.is_aborted()
    }

    pub fn abort_rx(&self) -> watch::Receiver<bool> {
        self.abort_tx.subscribe()
    }

    pub fn objs_inc(&self) {
        self.objects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_add(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn stats(&self) -> XactStats {
        XactStats {
            objects: self.objects.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    pub fn finish(&self, err: Option<String>) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            let mut slot = self.err.lock().unwrap_or_else(|e| e.into_inner());
            *slot = err;
            self.end_ms.store(utc_now_ms() as i64, Ordering::SeqCst);
        }
    }

    pub fn error(&self) -> Option<String> {
        self.err.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn add_notif_dsts(&self, dsts: Vec<String>) {
        let mut cur = self.notif_dsts.lock().unwrap_or_else(|e| e.into_inner());
        cur.extend(dsts);
    }

    pub fn notif_dsts(&self) -> Vec<String> {
        self.notif_dsts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn status(&self) -> XactStatusResp {
        XactStatusResp {
            uuid: self.uuid.clone(),
            finished: self.is_finished(),
            err: self.error(),
            stats: self.stats(),
        }
    }
}

impl fmt::Display for XactBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bck {
            Some(bck) => write!(f, "{}[{}, {}]", self.kind, self.uuid, bck),
            None => write!(f, "{}[{}]", self.kind, self.uuid),
        }
    }
}

type Scope = (Action, Option<String>);

fn scope_of(kind: Action, bck: Option<&Bck>) -> Scope {
    (kind, bck.map(|b| b.uname()))
}

fn read_lock<T>(l: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(l: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|e| e.into_inner())
}

/// Indexes live xactions by (kind, bucket-or-global) and by UUID. `renew` is
/// the only constructor and enforces at-most-one running xaction per scope.
pub struct XactRegistry {
    by_uuid: RwLock<HashMap<String, Arc<XactBase>>>,
    by_scope: RwLock<HashMap<Scope, Arc<XactBase>>>,
}

impl Default for XactRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl XactRegistry {
    pub fn new() -> Self {
        Self {
            by_uuid: RwLock::new(HashMap::new()),
            by_scope: RwLock::new(HashMap::new()),
        }
    }

    /// Same UUID on a running scope returns the existing entry (idempotent
    /// renewal); a different UUID is rejected.
    pub fn renew(
        &self,
        kind: Action,
        bck: Option<&Bck>,
        uuid: &str,
    ) -> Result<Arc<XactBase>, ApiError> {
        let scope = scope_of(kind, bck);
        let mut by_scope = write_lock(&self.by_scope);
        if let Some(existing) = by_scope.get(&scope) {
            if existing.is_running() {
                if existing.uuid == uuid {
                    return Ok(existing.clone());
                }
                return Err(ApiError::XactionAlreadyRunning {
                    kind: kind.to_string(),
                    scope: bck.map(|b| b.to_string()).unwrap_or_else(|| "cluster".to_string()),
                    uuid: existing.uuid.clone(),
                });
            }
        }
        let base = XactBase::new(uuid, kind, bck.cloned());
        by_scope.insert(scope, base.clone());
        write_lock(&self.by_uuid).insert(uuid.to_string(), base.clone());
        Ok(base)
    }

    pub fn find_uuid(&self, uuid: &str) -> Option<Arc<XactBase>> {
        read_lock(&self.by_uuid).get(uuid).cloned()
    }

    /// The running xaction of the given scope, if any.
    pub fn find_running(&self, kind: Action, bck: Option<&Bck>) -> Option<Arc<XactBase>> {
        read_lock(&self.by_scope)
            .get(&scope_of(kind, bck))
            .filter(|x| x.is_running())
            .cloned()
    }

    /// Signal abort on the running xaction of the given scope, if any.
    /// Used to pre-empt lower-priority work (e.g. put-copies before a
    /// make-n-copies starts on the same bucket).
    pub fn do_abort(&self, kind: Action, bck: Option<&Bck>) -> bool {
        match self.find_running(kind, bck) {
            Some(x) => {
                info!("pre-empting {}", x);
                x.abort();
                true
            }
            None => false,
        }
    }

    pub fn abort_uuid(&self, uuid: &str) -> bool {
        match self.find_uuid(uuid) {
            Some(x) => {
                x.abort();
                true
            }
            None => false,
        }
    }

    pub fn reb_marked(&self) -> Option<Arc<XactBase>> {
        self.find_running(Action::Rebalance, None)
    }

    pub fn resilver_marked(&self) -> Option<Arc<XactBase>> {
        self.find_running(Action::Resilver, None)
    }
}

/// Spawn the committed bucket xaction: one jogger per available mountpath,
/// all walking `walk_bck`; the xaction completes when every jogger drains.
pub fn spawn_bck_xact(state: &TargetState, xact: Arc<XactBase>, walk_bck: Bck, cb: JogCallback) {
    let mountpaths = state.mountpaths.clone();
    let notif_ctx = state.notif_ctx();
    tokio::spawn(run_bck_xact(xact, walk_bck, mountpaths, notif_ctx, cb));
}

pub async fn run_bck_xact(
    xact: Arc<XactBase>,
    walk_bck: Bck,
    mountpaths: Arc<MountpathRegistry>,
    notif_ctx: NotifCtx,
    cb: JogCallback,
) {
    info!("{} started", xact);

    let mut handles = Vec::new();
    for mpath in mountpaths.available() {
        let j = Jogger {
            bck_root: mpath.bucket_path(&walk_bck),
            mpath,
            mountpaths: mountpaths.clone(),
            xact: xact.clone(),
            callback: cb.clone(),
        };
        handles.push(tokio::task::spawn_blocking(move || j.jog()));
    }

    let mut first_err: Option<String> = None;
    for h in handles {
        match h.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // propagate to the sibling joggers
                xact.abort();
                first_err.get_or_insert(e.to_string());
            }
            Err(e) => {
                xact.abort();
                first_err.get_or_insert(format!("jogger task failed: {}", e));
            }
        }
    }

    xact.finish(first_err);
    match xact.error() {
        Some(err) => info!("{} finished with error: {}", xact, err),
        None => info!("{} finished: {:?}", xact, xact.stats()),
    }

    notif::publish_terminal(&notif_ctx, &xact).await;
}

/// Global marker xactions (rebalance, resilver) run until aborted; their
/// presence alone gates bucket-mutating transactions.
pub fn spawn_marker(state: &TargetState, xact: Arc<XactBase>) {
    let notif_ctx = state.notif_ctx();
    tokio::spawn(async move {
        info!("{} started", xact);
        let mut rx = xact.abort_rx();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
        xact.finish(Some(format!("{} aborted", xact.kind)));
        info!("{} finished", xact);
        notif::publish_terminal(&notif_ctx, &xact).await;
    });
}
