use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use common::constants::{HEADER_CALLER_ID, HEADER_CALLER_NAME, URL_PARAM_WHAT, WHAT_IC_BUNDLE};
use common::error::ApiError;
use common::msg::{Action, ActionMsg};
use common::smap::{hrw_ic, Smap, Snode};

use crate::core::bcast::post_json;
use crate::core::notifs::{NotifListener, EQUAL_IC};
use crate::core::state::ProxyState;

// The Information Center is the subset of proxies that owns the lifecycle of
// job entities (one UUID each) and answers status queries for them. Jobs are
// registered with all IC members; non-members reverse status requests to an
// owner chosen by rendezvous hashing.

const LOCAL_RETRY_ATTEMPTS: u32 = 3;
const LOCAL_RETRY_PAUSE: Duration = Duration::from_millis(100);

#[derive(Serialize, Deserialize)]
pub struct IcBundle {
    pub smap: Smap,
    pub ownership_tbl: Vec<NotifListener>,
}

/// Where a status query for `uuid` should be answered.
#[derive(Debug)]
pub enum Resolution {
    Local,
    NotFound,
    Forward(Snode),
}

async fn with_local_retry<T>(mut f: impl FnMut() -> Option<T>) -> Option<T> {
    for attempt in 0..LOCAL_RETRY_ATTEMPTS {
        if let Some(v) = f() {
            return Some(v);
        }
        if attempt + 1 < LOCAL_RETRY_ATTEMPTS {
            tokio::time::sleep(LOCAL_RETRY_PAUSE).await;
        }
    }
    None
}

/// Find the owner of a job UUID. IC members tolerate registration races with
/// a local retry, then fall back to re-syncing the bundle from the oldest
/// member; non-members pick the owner by HRW over the IC set.
pub async fn resolve_owner(ctx: &ProxyState, uuid: &str) -> Result<Resolution, ApiError> {
    let mut smap = ctx.smap.get();
    let self_id = ctx.snode.id.clone();
    let self_ic = smap.is_ic(&self_id);

    let mut owner = ctx.notifs.get_owner(uuid);
    if owner.is_none() {
        if self_ic {
            owner = with_local_retry(|| ctx.notifs.get_owner(uuid)).await;
            if owner.is_none() {
                if let Err(e) = sync_ic_bundle(ctx).await {
                    warn!("IC bundle sync failed: {}", e);
                }
                smap = ctx.smap.get();
                owner = ctx.notifs.get_owner(uuid);
                if owner.is_none() {
                    return Ok(Resolution::NotFound);
                }
            }
        } else {
            let hrw_owner = hrw_ic(&smap, uuid)?;
            return Ok(if hrw_owner.id == self_id {
                Resolution::Local
            } else {
                Resolution::Forward(hrw_owner.clone())
            });
        }
    }

    let owner = owner.unwrap_or_default();
    match owner.as_str() {
        // not owned: the caller performs the local lookup itself
        "" => Ok(Resolution::Local),
        EQUAL_IC => {
            if self_ic {
                Ok(Resolution::Local)
            } else {
                // any member works; pick the first for per-request stability
                let psi = smap
                    .ic
                    .iter()
                    .next()
                    .and_then(|id| smap.get_proxy(id))
                    .ok_or_else(|| ApiError::Any(anyhow!("cluster map has an empty IC")))?;
                Ok(Resolution::Forward(psi.clone()))
            }
        }
        id if id == self_id => Ok(Resolution::Local),
        id => match smap.get_proxy(id) {
            Some(psi) if smap.is_ic(id) => Ok(Resolution::Forward(psi.clone())),
            _ => {
                // cached owner left the IC: fall back to HRW
                let hrw_owner = hrw_ic(&smap, uuid)?;
                Ok(if hrw_owner.id == self_id {
                    Resolution::Local
                } else {
                    Resolution::Forward(hrw_owner.clone())
                })
            }
        },
    }
}

/// Register a job with the IC: insert locally when this proxy is a member,
/// and mirror the listener to all other members.
pub async fn register_equal(ctx: &ProxyState, mut nl: NotifListener, smap: &Smap) {
    nl.owner = EQUAL_IC.to_string();
    if smap.is_ic(&ctx.snode.id) {
        ctx.notifs.add(nl.clone());
    }
    if smap.ic.len() > 1 {
        if let Err(e) = bcast_listen_ic(ctx, &nl, smap).await {
            warn!("listen-to-notif broadcast for {} failed: {}", nl.uuid, e);
        }
    }
}

async fn bcast_listen_ic(
    ctx: &ProxyState,
    nl: &NotifListener,
    smap: &Smap,
) -> Result<(), ApiError> {
    let value = serde_json::to_value(nl).map_err(|e| ApiError::Any(e.into()))?;
    let mut msg = ActionMsg::new(Action::ListenToNotif, value);
    msg.uuid = nl.uuid.clone();
    msg.smap_version = smap.version;

    let mut first_err = None;
    for pid in &smap.ic {
        if *pid == ctx.snode.id {
            continue;
        }
        let Some(psi) = smap.get_proxy(pid) else {
            continue;
        };
        if let Err(e) = post_json(ctx, psi, "/v1/ic", &[], &msg).await {
            error!("listen-to-notif to {} failed: {}", psi, e);
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Bootstrap (or refresh) the ownership table from the oldest IC member.
/// A cluster-UUID mismatch is fatal to the bundle, never silently merged.
pub async fn sync_ic_bundle(ctx: &ProxyState) -> Result<(), ApiError> {
    let smap = ctx.smap.get();
    let oldest = smap
        .oldest_ic()
        .ok_or_else(|| ApiError::Any(anyhow!("cluster map has an empty IC")))?;
    if oldest.id == ctx.snode.id {
        return Ok(());
    }

    let url = format!("{}/v1/ic", oldest.intra_control_url);
    let resp = ctx
        .http_client
        .get(&url)
        .query(&[(URL_PARAM_WHAT, WHAT_IC_BUNDLE)])
        .header(HEADER_CALLER_ID, ctx.snode.id.as_str())
        .header(HEADER_CALLER_NAME, ctx.snode.to_string())
        .send()
        .await
        .map_err(ApiError::UpstreamReq)?;

    let st = resp.status();
    if !st.is_success() {
        return Err(ApiError::UpstreamStatus(st));
    }
    let bundle: IcBundle = resp.json().await.map_err(ApiError::UpstreamReq)?;

    if !smap.uuid.is_empty() && !bundle.smap.uuid.is_empty() && smap.uuid != bundle.smap.uuid {
        return Err(ApiError::Any(anyhow!(
            "IC bundle cluster UUID mismatch: have {}, got {}",
            smap.uuid,
            bundle.smap.uuid
        )));
    }

    ctx.smap.synchronize(bundle.smap)?;

    let smap = ctx.smap.get();
    if !smap.is_ic(&ctx.snode.id) {
        return Ok(());
    }
    ctx.notifs.merge(bundle.ownership_tbl);
    info!(
        "synced IC bundle from {} ({} listeners)",
        oldest.id,
        ctx.notifs.len()
    );
    Ok(())
}

/// POST /v1/ic dispatch: merge a peer's ownership table or mirror a listener.
/// A proxy that is not (yet) an IC member waits briefly for the newer Smap
/// the sender acted on.
pub async fn handle_ic_post(ctx: &ProxyState, msg: ActionMsg) -> Result<(), ApiError> {
    let smap = ctx.smap.get();
    if !smap.is_ic(&ctx.snode.id) {
        let caught_up = msg.smap_version > smap.version
            && with_local_retry(|| {
                if ctx.smap.get().is_ic(&ctx.snode.id) {
                    Some(())
                } else {
                    None
                }
            })
            .await
            .is_some();
        if !caught_up {
            return Err(ApiError::NotIcMember(ctx.snode.to_string()));
        }
    }

    match msg.action {
        Action::MergeOwnershipTbl => {
            let tbl: Vec<NotifListener> =
                serde_json::from_value(msg.value).map_err(|e| ApiError::Any(e.into()))?;
            ctx.notifs.merge(tbl);
            Ok(())
        }
        Action::ListenToNotif => {
            let nl: NotifListener =
                serde_json::from_value(msg.value).map_err(|e| ApiError::Any(e.into()))?;
            ctx.notifs.add(nl);
            Ok(())
        }
        other => Err(ApiError::Any(anyhow!(
            "unknown IC action {:?}",
            other.as_str()
        ))),
    }
}
