use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use walkdir::WalkDir;

use common::bck::Bck;
use common::constants::OBJ_CONTENT_DIR;
use common::error::ApiError;

/// A single local mountpath. `capacity_bytes` is the configured budget for
/// this path; 0 means unlimited (capacity checks always pass).
#[derive(Debug)]
pub struct Mountpath {
    pub path: PathBuf,
    pub capacity_bytes: u64,
    enabled: AtomicBool,
}

impl Mountpath {
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Root of the bucket's object content on this mountpath.
    pub fn bucket_path(&self, bck: &Bck) -> PathBuf {
        let ns = if bck.ns.is_empty() { "@global" } else { bck.ns.as_str() };
        self.path
            .join(OBJ_CONTENT_DIR)
            .join(bck.provider.as_str())
            .join(ns)
            .join(&bck.name)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CapStatus {
    pub used_pct: u32,
    pub high_wm: bool,
    pub oos: bool,
}

impl CapStatus {
    pub fn err(&self) -> Option<ApiError> {
        if self.oos {
            Some(ApiError::OutOfSpace(format!(
                "{}% of capacity used",
                self.used_pct
            )))
        } else if self.high_wm {
            Some(ApiError::OutOfSpace(format!(
                "{}% of capacity used, above high watermark",
                self.used_pct
            )))
        } else {
            None
        }
    }
}

fn read_lock<T>(l: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(l: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|e| e.into_inner())
}

pub struct MountpathRegistry {
    mpaths: RwLock<Vec<Arc<Mountpath>>>,
    cap: RwLock<CapStatus>,
    pub high_wm: u32,
    pub oos_wm: u32,
}

impl MountpathRegistry {
    pub fn new(
        paths: Vec<PathBuf>,
        capacity_bytes: u64,
        high_wm: u32,
        oos_wm: u32,
    ) -> io::Result<Self> {
        let mut mpaths = Vec::with_capacity(paths.len());
        for p in paths {
            fs::create_dir_all(&p)?;
            mpaths.push(Arc::new(Mountpath {
                path: p,
                capacity_bytes,
                enabled: AtomicBool::new(true),
            }));
        }
        Ok(Self {
            mpaths: RwLock::new(mpaths),
            cap: RwLock::new(CapStatus::default()),
            high_wm,
            oos_wm,
        })
    }

    pub fn available(&self) -> Vec<Arc<Mountpath>> {
        read_lock(&self.mpaths)
            .iter()
            .filter(|m| m.is_enabled())
            .cloned()
            .collect()
    }

    pub fn num_avail(&self) -> usize {
        read_lock(&self.mpaths)
            .iter()
            .filter(|m| m.is_enabled())
            .count()
    }

    pub fn disable(&self, path: &Path) -> bool {
        for m in read_lock(&self.mpaths).iter() {
            if m.path == path {
                m.enabled.store(false, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    /// Last capacity reading; refreshed by the capacity sweeper and polled by
    /// joggers at throttle boundaries.
    pub fn get_cap_status(&self) -> CapStatus {
        *read_lock(&self.cap)
    }

    pub fn refresh_cap(&self) -> CapStatus {
        let mpaths = self.available();
        let mut total_cap: u64 = 0;
        let mut used: u64 = 0;
        for m in &mpaths {
            total_cap += m.capacity_bytes;
            for entry in WalkDir::new(&m.path).into_iter().flatten() {
                if entry.file_type().is_file() {
                    if let Ok(md) = entry.metadata() {
                        used += md.len();
                    }
                }
            }
        }
        let used_pct = if total_cap == 0 {
            0
        } else {
            ((used.saturating_mul(100)) / total_cap) as u32
        };
        let status = CapStatus {
            used_pct,
            high_wm: used_pct >= self.high_wm,
            oos: used_pct >= self.oos_wm,
        };
        *write_lock(&self.cap) = status;
        status
    }

    /// Locate the mountpath containing `path` and the object's bucket-relative
    /// name.
    pub fn resolve_object(&self, bck: &Bck, path: &Path) -> Option<(Arc<Mountpath>, PathBuf)> {
        for m in self.available() {
            if let Ok(rel) = path.strip_prefix(m.bucket_path(bck)) {
                return Some((m.clone(), rel.to_path_buf()));
            }
        }
        None
    }

    /// Rename a bucket's content directories across all mountpaths.
    pub fn rename_bucket_dirs(&self, from: &Bck, to: &Bck) -> io::Result<()> {
        for m in self.available() {
            let src = m.bucket_path(from);
            if !src.exists() {
                continue;
            }
            let dst = m.bucket_path(to);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&src, &dst)?;
        }
        Ok(())
    }

    /// Rename/copy destination precondition: on every mountpath the
    /// destination directory must be absent or empty.
    pub fn check_dst_dirs_clear(&self, bck: &Bck) -> Result<(), ApiError> {
        for m in self.available() {
            let dst = m.bucket_path(bck);
            if !dst.exists() {
                continue;
            }
            let mut rd = fs::read_dir(&dst)?;
            if rd.next().is_some() {
                return Err(ApiError::Any(anyhow::anyhow!(
                    "directory {:?} already exists and is not empty",
                    dst
                )));
            }
        }
        Ok(())
    }
}

pub async fn cap_sweeper(
    mountpaths: Arc<MountpathRegistry>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {},
            _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
        }

        let mountpaths = mountpaths.clone();
        let res = tokio::task::spawn_blocking(move || mountpaths.refresh_cap()).await;
        match res {
            Ok(cs) if cs.oos => error!("capacity sweep: out of space ({}% used)", cs.used_pct),
            Ok(_) => {}
            Err(e) => error!("capacity sweep failed: {}", e),
        }
    }

    info!("capacity sweeper stopped");
    Ok(())
}
