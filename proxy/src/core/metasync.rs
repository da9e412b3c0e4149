use futures_util::future::join_all;
use tracing::warn;

use common::bmd::Bmd;
use common::msg::MetasyncBody;
use common::smap::{Smap, Snode};

use crate::core::bcast::post_json;
use crate::core::state::ProxyState;

/// Replicate the freshly-installed BMD to every other node. Best-effort:
/// stragglers converge through the target-side commit wait.
pub async fn sync_bmd(ctx: &ProxyState, bmd: &Bmd) {
    let smap = ctx.smap.get();
    let body = MetasyncBody {
        smap: None,
        bmd: Some(bmd.clone()),
    };
    broadcast(ctx, &smap, &body).await;
}

pub async fn sync_smap(ctx: &ProxyState, smap: &Smap) {
    let body = MetasyncBody {
        smap: Some(smap.clone()),
        bmd: None,
    };
    broadcast(ctx, smap, &body).await;
}

async fn broadcast(ctx: &ProxyState, smap: &Smap, body: &MetasyncBody) {
    let nodes: Vec<Snode> = smap.nodes_except(&ctx.snode.id);
    if nodes.is_empty() {
        return;
    }
    let futs = nodes
        .iter()
        .map(|n| post_json(ctx, n, "/v1/metasync", &[], body));
    for (node, res) in nodes.iter().zip(join_all(futs).await) {
        if let Err(e) = res {
            warn!("metasync to {} failed: {}", node, e);
        }
    }
}
