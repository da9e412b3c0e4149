use anyhow::anyhow;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

use crate::bmd::Bmd;
use crate::error::ApiError;
use crate::persist;
use crate::smap::Smap;

fn read_lock<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|e| e.into_inner())
}

/// Holds the node's current cluster map. Installs are monotonic: an incoming
/// map with a version at or below the current one is ignored, and a UUID
/// mismatch is an error the caller treats as fatal.
pub struct SmapOwner {
    inner: RwLock<Smap>,
    path: PathBuf,
}

impl SmapOwner {
    pub fn new(smap: Smap, path: PathBuf) -> Self {
        Self {
            inner: RwLock::new(smap),
            path,
        }
    }

    pub fn load_or(path: PathBuf, fallback: Smap) -> anyhow::Result<Self> {
        let smap = persist::load::<Smap>(&path)?.unwrap_or(fallback);
        Ok(Self::new(smap, path))
    }

    pub fn get(&self) -> Smap {
        read_lock(&self.inner).clone()
    }

    pub fn version(&self) -> u64 {
        read_lock(&self.inner).version
    }

    /// Returns true when the incoming map was installed.
    pub fn synchronize(&self, incoming: Smap) -> Result<bool, ApiError> {
        let mut cur = write_lock(&self.inner);
        if !cur.uuid.is_empty() && !incoming.uuid.is_empty() && cur.uuid != incoming.uuid {
            return Err(ApiError::Any(anyhow!(
                "cluster map UUID mismatch: have {}, got {}",
                cur.uuid,
                incoming.uuid
            )));
        }
        if incoming.version <= cur.version && !cur.uuid.is_empty() {
            return Ok(false);
        }
        persist::save_atomic(&self.path, &incoming)?;
        *cur = incoming;
        Ok(true)
    }
}

/// Holds the node's current bucket metadata. A watch channel carries the
/// installed version so transaction `wait` can block on it.
pub struct BmdOwner {
    inner: RwLock<Bmd>,
    version_tx: watch::Sender<u64>,
    path: PathBuf,
}

impl BmdOwner {
    pub fn new(bmd: Bmd, path: PathBuf) -> Self {
        let (version_tx, _) = watch::channel(bmd.version);
        Self {
            inner: RwLock::new(bmd),
            version_tx,
            path,
        }
    }

    pub fn load_or(path: PathBuf, fallback: Bmd) -> anyhow::Result<Self> {
        let bmd = persist::load::<Bmd>(&path)?.unwrap_or(fallback);
        Ok(Self::new(bmd, path))
    }

    pub fn get(&self) -> Bmd {
        read_lock(&self.inner).clone()
    }

    pub fn version(&self) -> u64 {
        read_lock(&self.inner).version
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    /// Returns true when the incoming BMD was installed. Version never
    /// decreases; watchers are notified on every install.
    pub fn synchronize(&self, incoming: Bmd) -> Result<bool, ApiError> {
        let installed_version;
        {
            let mut cur = write_lock(&self.inner);
            if !cur.uuid.is_empty() && !incoming.uuid.is_empty() && cur.uuid != incoming.uuid {
                return Err(ApiError::Any(anyhow!(
                    "bucket metadata UUID mismatch: have {}, got {}",
                    cur.uuid,
                    incoming.uuid
                )));
            }
            if incoming.version <= cur.version && !cur.uuid.is_empty() {
                return Ok(false);
            }
            persist::save_atomic(&self.path, &incoming)?;
            installed_version = incoming.version;
            *cur = incoming;
        }
        self.version_tx.send_replace(installed_version);
        Ok(true)
    }
}
