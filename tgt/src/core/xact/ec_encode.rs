use std::fs;
use std::sync::Arc;

use crate::core::xact::jogger::JogCallback;

/// Per-object work for ec-encode: enumerate the bucket's objects and submit
/// each to the erasure encoder. The encoder itself is an external
/// collaborator; the xaction owns traversal, accounting, capacity gating,
/// and abort.
pub fn callback() -> JogCallback {
    Arc::new(move |path, xact| {
        let md = fs::metadata(path)?;
        xact.objs_inc();
        xact.bytes_add(md.len());
        Ok(())
    })
}
