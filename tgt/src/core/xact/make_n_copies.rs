use std::fs;
use std::io;
use std::sync::Arc;

use common::bck::Bck;
use common::error::ApiError;

use crate::core::mountpath::MountpathRegistry;
use crate::core::xact::jogger::JogCallback;

/// Per-object work for make-n-copies: bring the object's replica count
/// across mountpaths to exactly `copies`. The jogger visits every replica,
/// so the callback is idempotent and tolerates objects vanishing mid-walk.
pub fn callback(mountpaths: Arc<MountpathRegistry>, bck: Bck, copies: u32) -> JogCallback {
    Arc::new(move |path, xact| {
        let Some((src_mpath, rel)) = mountpaths.resolve_object(&bck, path) else {
            return Ok(());
        };

        let others: Vec<_> = mountpaths
            .available()
            .into_iter()
            .filter(|m| m.path != src_mpath.path)
            .collect();

        let extra = copies.saturating_sub(1) as usize;
        for (i, mpath) in others.iter().enumerate() {
            let replica = mpath.bucket_path(&bck).join(&rel);
            if i < extra {
                if replica.exists() {
                    continue;
                }
                if let Some(parent) = replica.parent() {
                    fs::create_dir_all(parent)?;
                }
                match fs::copy(path, &replica) {
                    Ok(n) => xact.bytes_add(n),
                    // source replica vanished, a sibling jogger got here first
                    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::StorageFull => {
                        return Err(ApiError::OutOfSpace(e.to_string()));
                    }
                    Err(e) => return Err(e.into()),
                }
            } else if replica.exists() {
                match fs::remove_file(&replica) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        xact.objs_inc();
        Ok(())
    })
}
