use futures_util::future::join_all;
use serde::Serialize;

use common::constants::{HEADER_CALLER_ID, HEADER_CALLER_NAME};
use common::error::ApiError;
use common::smap::Snode;

use crate::core::state::ProxyState;

/// POST a JSON body to one node's intra-control endpoint, echoing the caller
/// headers. A non-2xx reply is relayed as `Remote` so the original status and
/// message survive back to the client.
pub async fn post_json<T: Serialize>(
    ctx: &ProxyState,
    node: &Snode,
    path: &str,
    query: &[(String, String)],
    body: &T,
) -> Result<(), ApiError> {
    let url = format!("{}{}", node.intra_control_url, path);
    let resp = ctx
        .http_client
        .post(&url)
        .query(query)
        .json(body)
        .header(HEADER_CALLER_ID, ctx.snode.id.as_str())
        .header(HEADER_CALLER_NAME, ctx.snode.to_string())
        .send()
        .await
        .map_err(ApiError::UpstreamReq)?;

    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let msg = resp.text().await.unwrap_or_default();
    Err(ApiError::Remote {
        status: status.as_u16(),
        msg,
    })
}

/// Broadcast to all targets, returning the per-node outcome so the caller can
/// see exactly which nodes succeeded.
pub async fn bcast_targets<T: Serialize>(
    ctx: &ProxyState,
    path: &str,
    query: &[(String, String)],
    body: &T,
) -> Vec<(Snode, Result<(), ApiError>)> {
    let targets = ctx.smap.get().targets();
    bcast_nodes(ctx, &targets, path, query, body).await
}

pub async fn bcast_nodes<T: Serialize>(
    ctx: &ProxyState,
    nodes: &[Snode],
    path: &str,
    query: &[(String, String)],
    body: &T,
) -> Vec<(Snode, Result<(), ApiError>)> {
    let futs = nodes.iter().map(|n| post_json(ctx, n, path, query, body));
    let results = join_all(futs).await;
    nodes.iter().cloned().zip(results).collect()
}
