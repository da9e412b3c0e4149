use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use common::bck::Bck;
use common::error::ApiError;

#[derive(Default)]
struct LockState {
    writer: bool,
    readers: u32,
}

/// Non-blocking read/write lock keyed by bucket name. Acquisition never
/// queues: a failed `try_lock`/`try_rlock` surfaces as `BucketIsBusy`.
pub struct NameLockPair {
    uname: String,
    state: Mutex<LockState>,
}

impl NameLockPair {
    fn new(uname: String) -> Self {
        Self {
            uname,
            state: Mutex::new(LockState::default()),
        }
    }

    pub fn uname(&self) -> &str {
        &self.uname
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn try_lock(&self) -> bool {
        let mut st = self.state();
        if st.writer || st.readers > 0 {
            return false;
        }
        st.writer = true;
        true
    }

    pub fn try_rlock(&self) -> bool {
        let mut st = self.state();
        if st.writer {
            return false;
        }
        st.readers += 1;
        true
    }

    pub fn unlock(&self) {
        let mut st = self.state();
        debug_assert!(st.writer, "unlock without a write-holder: {}", self.uname);
        st.writer = false;
    }

    pub fn runlock(&self) {
        let mut st = self.state();
        debug_assert!(st.readers > 0, "runlock without a reader: {}", self.uname);
        st.readers = st.readers.saturating_sub(1);
    }

    /// Write lock to read lock, without a release window.
    pub fn downgrade(&self) {
        let mut st = self.state();
        debug_assert!(st.writer, "downgrade without a write-holder: {}", self.uname);
        st.writer = false;
        st.readers += 1;
    }
}

/// A lock held by a transaction; released exactly once, by whoever removes
/// the transaction (abort, commit completion, or GC).
#[derive(Clone)]
pub struct HeldLock {
    pub nlp: Arc<NameLockPair>,
    pub exclusive: bool,
}

impl HeldLock {
    pub fn release(&self) {
        if self.exclusive {
            self.nlp.unlock();
        } else {
            self.nlp.runlock();
        }
    }
}

pub struct NameLockRegistry {
    inner: RwLock<HashMap<String, Arc<NameLockPair>>>,
}

impl Default for NameLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NameLockRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, bck: &Bck) -> Arc<NameLockPair> {
        let uname = bck.uname();
        {
            let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
            if let Some(nlp) = map.get(&uname) {
                return nlp.clone();
            }
        }
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.entry(uname.clone())
            .or_insert_with(|| Arc::new(NameLockPair::new(uname)))
            .clone()
    }

    pub fn try_lock(&self, bck: &Bck) -> Result<HeldLock, ApiError> {
        let nlp = self.get(bck);
        if !nlp.try_lock() {
            return Err(ApiError::BucketIsBusy(bck.to_string()));
        }
        Ok(HeldLock {
            nlp,
            exclusive: true,
        })
    }

    pub fn try_rlock(&self, bck: &Bck) -> Result<HeldLock, ApiError> {
        let nlp = self.get(bck);
        if !nlp.try_rlock() {
            return Err(ApiError::BucketIsBusy(bck.to_string()));
        }
        Ok(HeldLock {
            nlp,
            exclusive: false,
        })
    }
}
