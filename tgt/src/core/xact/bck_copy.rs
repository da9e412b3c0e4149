use std::fs;
use std::io;
use std::sync::Arc;

use common::bck::Bck;
use common::error::ApiError;

use crate::core::mountpath::MountpathRegistry;
use crate::core::xact::jogger::JogCallback;

/// Per-object work for copy-bucket: replicate the object under the
/// destination bucket's content tree on the same mountpath. Objects that
/// vanish mid-walk are skipped, an existing destination copy is kept.
pub fn callback(mountpaths: Arc<MountpathRegistry>, bck_from: Bck, bck_to: Bck) -> JogCallback {
    Arc::new(move |path, xact| {
        let Some((mpath, rel)) = mountpaths.resolve_object(&bck_from, path) else {
            return Ok(());
        };
        let dst = mpath.bucket_path(&bck_to).join(&rel);
        if dst.exists() {
            xact.objs_inc();
            return Ok(());
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::copy(path, &dst) {
            Ok(n) => {
                xact.objs_inc();
                xact.bytes_add(n);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::StorageFull => {
                Err(ApiError::OutOfSpace(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    })
}
