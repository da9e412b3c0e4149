use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use common::constants::{HEADER_CALLER_ID, HEADER_CALLER_NAME, NOTIFY_IC};
use common::error::ApiError;
use common::msg::NotifMsg;
use common::owner::SmapOwner;

use crate::core::retry::{classify_reqwest, retry_timeboxed, RetryClass, RetryConfig};
use crate::core::xact::XactBase;

#[derive(Clone)]
pub struct NotifCtx {
    pub http_client: reqwest::Client,
    pub smap: Arc<SmapOwner>,
    pub node_id: String,
}

/// Deliver the xaction's termination event to every subscribed destination.
/// Best-effort: connection-class failures are retried with backoff, anything
/// else is logged and dropped.
pub async fn publish_terminal(ctx: &NotifCtx, xact: &XactBase) {
    let dsts = xact.notif_dsts();
    if dsts.is_empty() {
        return;
    }

    let smap = ctx.smap.get();
    let mut urls: BTreeSet<String> = BTreeSet::new();
    for dst in &dsts {
        if dst == NOTIFY_IC {
            for pid in &smap.ic {
                if let Some(p) = smap.get_proxy(pid) {
                    urls.insert(p.intra_control_url.clone());
                }
            }
        } else if let Some(node) = smap.get_node(dst) {
            urls.insert(node.intra_control_url.clone());
        } else {
            // a literal URL destination (the originating caller)
            urls.insert(dst.clone());
        }
    }

    let msg = NotifMsg {
        uuid: xact.uuid.clone(),
        node_id: ctx.node_id.clone(),
        err: xact.error(),
        stats: xact.stats(),
        when_terminal: true,
    };

    let msg_ref = &msg;
    for url in urls {
        let cfg = RetryConfig::notif();
        let url_ref = url.as_str();
        let res = retry_timeboxed(
            &cfg,
            || post_notif(ctx, url_ref, msg_ref),
            |e| match e {
                ApiError::UpstreamReq(err) => classify_reqwest(err),
                ApiError::UpstreamStatus(st) if st.is_server_error() => RetryClass::Retryable,
                _ => RetryClass::NonRetryable,
            },
        )
        .await;
        if let Err(e) = res {
            warn!("notification {} to {} dropped: {}", xact.uuid, url, e);
        }
    }
}

async fn post_notif(ctx: &NotifCtx, base_url: &str, msg: &NotifMsg) -> Result<(), ApiError> {
    let url = format!("{}/v1/notifs", base_url);
    let resp = ctx
        .http_client
        .post(&url)
        .json(msg)
        .header(HEADER_CALLER_ID, ctx.node_id.as_str())
        .header(HEADER_CALLER_NAME, format!("t[{}]", ctx.node_id))
        .send()
        .await
        .map_err(ApiError::UpstreamReq)?;

    let st = resp.status();
    if st.is_success() {
        Ok(())
    } else {
        Err(ApiError::UpstreamStatus(st))
    }
}
