use anyhow::anyhow;
use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use common::bck::Bck;
use common::constants::{HEADER_CALLER_ID, HEADER_CALLER_NAME, WHAT_IC_BUNDLE};
use common::error::ApiError;
use common::msg::{
    ActionMsg, JoinRequest, JoinResponse, KeepaliveMsg, MetasyncBody, NotifMsg, TxnResp,
    XactStatusResp,
};
use common::smap::{NodeRole, Smap, Snode};
use common::time_utils::utc_now_ms;

use crate::core::ic::{self, IcBundle, Resolution};
use crate::core::metasync;
use crate::core::state::ProxyState;
use crate::core::txn;

pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route("/v1/buckets/{bucket}", post(bucket_action_handler))
        .route(
            "/v1/xactions",
            get(xact_status_handler).delete(xact_abort_handler),
        )
        .route("/v1/notifs", post(notifs_handler))
        .route("/v1/ic", get(ic_get_handler).post(ic_post_handler))
        .route("/v1/metasync", post(metasync_handler))
        .route("/v1/cluster/join", post(join_handler))
        .route("/v1/cluster/keepalive", post(keepalive_handler))
        .route("/v1/cluster/smap", get(smap_handler))
        .route("/v1/cluster/bmd", get(bmd_handler))
        .route("/v1/health", get(health_handler))
        .with_state(state)
}

#[derive(Deserialize, Debug)]
pub struct BucketQuery {
    pub provider: Option<String>,
    pub ns: Option<String>,
    #[serde(rename = "wait-metasync")]
    pub wait_metasync: Option<bool>,
}

// POST /v1/buckets/{bucket}
#[tracing::instrument(name = "proxy.bucket", skip_all, fields(bucket = %bucket, action = %msg.action))]
pub async fn bucket_action_handler(
    State(ctx): State<ProxyState>,
    Path(bucket): Path<String>,
    Query(q): Query<BucketQuery>,
    Json(msg): Json<ActionMsg>,
) -> Result<Response, ApiError> {
    let smap = ctx.smap.get();
    if !smap.is_primary(&ctx.snode.id) {
        // bucket mutations run on the primary; hand the client over
        let primary = smap
            .primary()
            .ok_or_else(|| ApiError::Any(anyhow!("cluster map has no primary")))?;
        let mut location = format!("{}/v1/buckets/{}", primary.public_url, bucket);
        let mut sep = '?';
        for (k, v) in [
            ("provider", q.provider.as_deref()),
            ("ns", q.ns.as_deref()),
        ] {
            if let Some(v) = v {
                location.push(sep);
                location.push_str(&format!("{}={}", k, v));
                sep = '&';
            }
        }
        if q.wait_metasync.unwrap_or(false) {
            location.push(sep);
            location.push_str("wait-metasync=true");
        }
        return Ok(
            (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)]).into_response(),
        );
    }

    let bck =
        Bck::from_query(&bucket, q.provider.as_deref(), q.ns.as_deref()).map_err(ApiError::Any)?;
    let uuid =
        txn::handle_bucket_action(&ctx, bck, msg, q.wait_metasync.unwrap_or(false)).await?;
    Ok(Json(TxnResp { uuid }).into_response())
}

#[derive(Deserialize)]
pub struct XactIdQuery {
    pub id: String,
}

// GET /v1/xactions?id=
// Any proxy answers: IC members from their notification table, everyone else
// by reversing the request to the owner.
pub async fn xact_status_handler(
    State(ctx): State<ProxyState>,
    Query(q): Query<XactIdQuery>,
) -> Result<Response, ApiError> {
    match ic::resolve_owner(&ctx, &q.id).await? {
        Resolution::Local => {
            let nl = ctx
                .notifs
                .entry(&q.id)
                .ok_or_else(|| ApiError::XactionNotFound(q.id.clone()))?;
            Ok(Json(XactStatusResp {
                uuid: nl.uuid.clone(),
                finished: nl.finished(),
                err: nl.err.clone(),
                stats: nl.stats,
            })
            .into_response())
        }
        Resolution::NotFound => Err(ApiError::XactionNotFound(q.id)),
        Resolution::Forward(psi) => forward_xact_status(&ctx, &psi, &q.id).await,
    }
}

async fn forward_xact_status(
    ctx: &ProxyState,
    psi: &Snode,
    uuid: &str,
) -> Result<Response, ApiError> {
    debug!("reversing status query {} to {}", uuid, psi);
    let url = format!("{}/v1/xactions", psi.intra_control_url);
    let resp = ctx
        .http_client
        .get(&url)
        .query(&[("id", uuid)])
        .header(HEADER_CALLER_ID, ctx.snode.id.as_str())
        .header(HEADER_CALLER_NAME, ctx.snode.to_string())
        .send()
        .await
        .map_err(ApiError::UpstreamReq)?;

    let status =
        StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = resp.bytes().await.map_err(ApiError::UpstreamReq)?;
    Ok((
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

// DELETE /v1/xactions?id=: cluster-wide abort, broadcast to all targets
pub async fn xact_abort_handler(
    State(ctx): State<ProxyState>,
    Query(q): Query<XactIdQuery>,
) -> Result<StatusCode, ApiError> {
    let targets = ctx.smap.get().targets();
    let futs = targets.iter().map(|t| {
        ctx.http_client
            .delete(format!("{}/v1/xactions", t.intra_control_url))
            .query(&[("id", q.id.as_str())])
            .header(HEADER_CALLER_ID, ctx.snode.id.as_str())
            .header(HEADER_CALLER_NAME, ctx.snode.to_string())
            .send()
    });
    for (t, res) in targets.iter().zip(join_all(futs).await) {
        if let Err(e) = res {
            warn!("abort {} on {} failed: {}", q.id, t, e);
        }
    }
    Ok(StatusCode::OK)
}

// POST /v1/notifs: target-side termination events
pub async fn notifs_handler(
    State(ctx): State<ProxyState>,
    Json(msg): Json<NotifMsg>,
) -> Result<StatusCode, ApiError> {
    if ctx.notifs.on_notif(&msg) {
        debug!("notification: {} from {} terminal", msg.uuid, msg.node_id);
    } else {
        debug!("notification for unknown job {} dropped", msg.uuid);
    }
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
pub struct WhatQuery {
    pub what: Option<String>,
}

// GET /v1/ic?what=ic-bundle
pub async fn ic_get_handler(
    State(ctx): State<ProxyState>,
    Query(q): Query<WhatQuery>,
) -> Result<Json<IcBundle>, ApiError> {
    let smap = ctx.smap.get();
    if !smap.is_ic(&ctx.snode.id) {
        return Err(ApiError::NotIcMember(ctx.snode.to_string()));
    }
    match q.what.as_deref() {
        Some(WHAT_IC_BUNDLE) => Ok(Json(IcBundle {
            smap,
            ownership_tbl: ctx.notifs.snapshot(),
        })),
        other => Err(ApiError::Any(anyhow!(
            "unknown query {:?}",
            other.unwrap_or_default()
        ))),
    }
}

// POST /v1/ic
pub async fn ic_post_handler(
    State(ctx): State<ProxyState>,
    Json(msg): Json<ActionMsg>,
) -> Result<StatusCode, ApiError> {
    ic::handle_ic_post(&ctx, msg).await?;
    Ok(StatusCode::OK)
}

// POST /v1/metasync
pub async fn metasync_handler(
    State(ctx): State<ProxyState>,
    Json(body): Json<MetasyncBody>,
) -> Result<StatusCode, ApiError> {
    if let Some(smap) = body.smap {
        let was_ic = ctx.is_ic_member();
        match ctx.smap.synchronize(smap) {
            Ok(true) => {
                info!("installed cluster map v{}", ctx.smap.version());
                if !was_ic && ctx.is_ic_member() {
                    // just elected: bootstrap the ownership table
                    let ctx2 = ctx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = ic::sync_ic_bundle(&ctx2).await {
                            warn!("IC bundle bootstrap failed: {}", e);
                        }
                    });
                }
            }
            Ok(false) => {}
            Err(e) => {
                error!("cluster map sync rejected: {}", e);
                return Err(e);
            }
        }
    }
    if let Some(bmd) = body.bmd {
        match ctx.bmd.synchronize(bmd) {
            Ok(true) => info!("installed bucket metadata v{}", ctx.bmd.version()),
            Ok(false) => {}
            Err(e) => {
                error!("bucket metadata sync rejected: {}", e);
                return Err(e);
            }
        }
    }
    Ok(StatusCode::OK)
}

// POST /v1/cluster/join (primary only)
pub async fn join_handler(
    State(ctx): State<ProxyState>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, ApiError> {
    let _g = ctx.smap_mutex.lock().await;

    let smap0 = ctx.smap.get();
    if !smap0.is_primary(&ctx.snode.id) {
        return Err(ApiError::Any(anyhow!(
            "{}: not the primary proxy",
            ctx.snode
        )));
    }

    let snode = req.snode;
    let mut smap = smap0.clone();
    match snode.role {
        NodeRole::Proxy => {
            smap.pmap.insert(snode.id.clone(), snode.clone());
        }
        NodeRole::Target => {
            smap.tmap.insert(snode.id.clone(), snode.clone());
        }
    }
    smap.version += 1;
    recompute_ic(&mut smap, ctx.ic_size);

    ctx.smap.synchronize(smap.clone())?;
    metasync::sync_smap(&ctx, &smap).await;

    info!(
        "{} joined: cluster map v{} ({} proxies, {} targets, {})",
        snode,
        smap.version,
        smap.pmap.len(),
        smap.tmap.len(),
        smap.str_ic(&ctx.snode.id)
    );
    Ok(Json(JoinResponse {
        smap,
        bmd: ctx.bmd.get(),
    }))
}

/// IC membership after a topology change: keep surviving members, top up to
/// the configured size by node-ID order. Deterministic given the same Smap.
fn recompute_ic(smap: &mut Smap, size: usize) {
    let mut ic: std::collections::BTreeSet<String> = smap
        .ic
        .iter()
        .filter(|id| smap.pmap.contains_key(id.as_str()))
        .cloned()
        .collect();
    for id in smap.pmap.keys() {
        if ic.len() >= size {
            break;
        }
        ic.insert(id.clone());
    }
    if ic.is_empty() {
        ic.insert(smap.primary_id.clone());
    }
    smap.ic = ic;
}

// POST /v1/cluster/keepalive
pub async fn keepalive_handler(
    State(ctx): State<ProxyState>,
    Json(msg): Json<KeepaliveMsg>,
) -> StatusCode {
    let mut map = ctx.keepalive.write().unwrap_or_else(|e| e.into_inner());
    map.insert(msg.node_id, utc_now_ms());
    StatusCode::OK
}

// GET /v1/cluster/smap
pub async fn smap_handler(State(ctx): State<ProxyState>) -> Json<Smap> {
    Json(ctx.smap.get())
}

// GET /v1/cluster/bmd
pub async fn bmd_handler(State(ctx): State<ProxyState>) -> Json<common::bmd::Bmd> {
    Json(ctx.bmd.get())
}

#[derive(Serialize)]
pub struct HealthResp {
    pub node_id: String,
    pub primary: bool,
    pub ic_member: bool,
    pub smap_version: u64,
    pub bmd_version: u64,
}

// GET /v1/health
pub async fn health_handler(State(ctx): State<ProxyState>) -> Json<HealthResp> {
    Json(HealthResp {
        node_id: ctx.snode.id.clone(),
        primary: ctx.is_primary(),
        ic_member: ctx.is_ic_member(),
        smap_version: ctx.smap.version(),
        bmd_version: ctx.bmd.version(),
    })
}
