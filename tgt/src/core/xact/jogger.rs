use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

use common::error::ApiError;

use crate::core::mountpath::{Mountpath, MountpathRegistry};
use crate::core::xact::XactBase;

/// Capacity is polled every this many visited objects.
pub const THROTTLE_NUM_OBJECTS: u64 = 64;

pub type JogCallback = Arc<dyn Fn(&Path, &XactBase) -> Result<(), ApiError> + Send + Sync>;

/// Worker bound to a single mountpath: walks one bucket's object content
/// under that mountpath and applies the xaction's per-object callback.
/// Cancellation is cooperative, checked at every object boundary.
pub struct Jogger {
    pub mpath: Arc<Mountpath>,
    pub bck_root: PathBuf,
    pub mountpaths: Arc<MountpathRegistry>,
    pub xact: Arc<XactBase>,
    pub callback: JogCallback,
}

impl Jogger {
    pub fn jog(self) -> Result<(), ApiError> {
        if !self.bck_root.exists() {
            return Ok(());
        }
        debug!(
            "jogger[{}/{}] started",
            self.mpath.path.display(),
            self.xact.uuid
        );

        let mut abort_rx = self.xact.abort_rx();
        let mut num: u64 = 0;

        for entry in WalkDir::new(&self.bck_root) {
            // a vanished mountpath surfaces here as a walk error and aborts
            let entry = entry.map_err(|e| {
                ApiError::Aborted(format!(
                    "{}({}): mountpath walk failed: {}",
                    self.xact.kind, self.xact.uuid, e
                ))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            if *abort_rx.borrow_and_update() {
                return Err(ApiError::Aborted(format!(
                    "{}({})",
                    self.xact.kind, self.xact.uuid
                )));
            }

            (self.callback)(entry.path(), &self.xact)?;

            num += 1;
            if num % THROTTLE_NUM_OBJECTS == 0 {
                if let Some(err) = self.mountpaths.get_cap_status().err() {
                    return Err(ApiError::Aborted(format!(
                        "{}({}): {}",
                        self.xact.kind, self.xact.uuid, err
                    )));
                }
            }
        }
        Ok(())
    }
}
