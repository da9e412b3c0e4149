use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use common::constants::{HEADER_CALLER_ID, HEADER_CALLER_NAME};
use common::error::ApiError;
use common::msg::{JoinRequest, JoinResponse, KeepaliveMsg};

use crate::core::retry::{classify_reqwest, retry_timeboxed, RetryClass, RetryConfig};
use crate::core::state::TargetState;

/// Register with the primary proxy and adopt its cluster map and bucket
/// metadata. A UUID mismatch against persisted state is fatal: the caller
/// exits non-zero.
pub async fn join_cluster(state: &TargetState, proxy_url: &str) -> anyhow::Result<()> {
    let cfg = RetryConfig::join();
    let resp = retry_timeboxed(
        &cfg,
        || post_join(state, proxy_url),
        |e| match e {
            ApiError::UpstreamReq(err) => classify_reqwest(err),
            ApiError::UpstreamStatus(st) if st.is_server_error() => RetryClass::Retryable,
            _ => RetryClass::NonRetryable,
        },
    )
    .await
    .map_err(|e| anyhow::anyhow!("failed to join cluster at {}: {}", proxy_url, e))?;

    state.smap.synchronize(resp.smap)?;
    state.bmd.synchronize(resp.bmd)?;

    let smap = state.smap.get();
    info!(
        "{} joined cluster {} (smap v{}, bmd v{})",
        state.snode,
        smap.uuid,
        smap.version,
        state.bmd.version()
    );
    Ok(())
}

async fn post_join(state: &TargetState, proxy_url: &str) -> Result<JoinResponse, ApiError> {
    let url = format!("{}/v1/cluster/join", proxy_url);
    let req = JoinRequest {
        snode: (*state.snode).clone(),
    };
    let resp = state
        .http_client
        .post(&url)
        .json(&req)
        .header(HEADER_CALLER_ID, state.snode.id.as_str())
        .header(HEADER_CALLER_NAME, state.snode.to_string())
        .send()
        .await
        .map_err(ApiError::UpstreamReq)?;

    let st = resp.status();
    if !st.is_success() {
        return Err(ApiError::UpstreamStatus(st));
    }
    resp.json::<JoinResponse>()
        .await
        .map_err(ApiError::UpstreamReq)
}

pub async fn keepalive_loop(
    state: TargetState,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {},
            _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
        }

        let smap = state.smap.get();
        let Some(primary) = smap.primary() else {
            continue;
        };
        let url = format!("{}/v1/cluster/keepalive", primary.intra_control_url);
        let msg = KeepaliveMsg {
            node_id: state.snode.id.clone(),
        };
        let res = state
            .http_client
            .post(&url)
            .json(&msg)
            .header(HEADER_CALLER_ID, state.snode.id.as_str())
            .header(HEADER_CALLER_NAME, state.snode.to_string())
            .send()
            .await;
        if let Err(e) = res {
            warn!("keepalive to {} failed: {}", primary, e);
        }
    }

    info!("keepalive loop stopped");
    Ok(())
}
