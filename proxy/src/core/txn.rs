use anyhow::anyhow;
use std::collections::BTreeSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use common::bck::{Bck, BucketProps, EcConf};
use common::bmd::Bmd;
use common::constants::{
    NOTIFY_IC, URL_PARAM_NOTIFY, URL_PARAM_TXN_TIMEOUT, URL_PARAM_UUID, URL_PARAM_WAIT_METASYNC,
};
use common::error::ApiError;
use common::msg::{Action, ActionMsg, TxnPhase};
use common::smap::Snode;

use crate::core::bcast::{bcast_nodes, bcast_targets};
use crate::core::ic;
use crate::core::metasync;
use crate::core::notifs::NotifListener;
use crate::core::state::ProxyState;

/// One two-phase run: the fresh UUID, the action message shipped to every
/// target, and the query every phase request carries.
pub struct TxnClientCtx {
    pub uuid: String,
    pub msg: ActionMsg,
    pub query: Vec<(String, String)>,
    pub bck: Bck,
}

fn prep_txn_client(
    ctx: &ProxyState,
    bck: &Bck,
    action: Action,
    value: serde_json::Value,
    notify: bool,
    wait_metasync: bool,
) -> TxnClientCtx {
    let uuid = Uuid::new_v4().to_string();

    let mut msg = ActionMsg::new(action, value);
    msg.uuid = uuid.clone();
    msg.smap_version = ctx.smap.version();
    msg.bmd_version = ctx.bmd.version();

    let mut query = vec![
        (URL_PARAM_UUID.to_string(), uuid.clone()),
        (
            URL_PARAM_TXN_TIMEOUT.to_string(),
            ctx.txn_timeout_ms.to_string(),
        ),
        ("provider".to_string(), bck.provider.as_str().to_string()),
    ];
    if !bck.ns.is_empty() {
        query.push(("ns".to_string(), bck.ns.clone()));
    }
    if notify {
        query.push((URL_PARAM_NOTIFY.to_string(), NOTIFY_IC.to_string()));
    }
    if wait_metasync {
        query.push((URL_PARAM_WAIT_METASYNC.to_string(), "true".to_string()));
    }

    TxnClientCtx {
        uuid,
        msg,
        query,
        bck: bck.clone(),
    }
}

fn txn_path(bck: &Bck, phase: TxnPhase) -> String {
    format!("/v1/txn/{}/{}", bck.name, phase)
}

/// Begin across all targets. On any failure, abort is sent to exactly the
/// targets whose begin succeeded, and the first error is surfaced; nothing
/// was mutated, so this is fully recoverable.
async fn begin_phase(ctx: &ProxyState, c: &TxnClientCtx) -> Result<(), ApiError> {
    let path = txn_path(&c.bck, TxnPhase::Begin);
    let results = bcast_targets(ctx, &path, &c.query, &c.msg).await;

    let mut ok_nodes = Vec::new();
    let mut first_err = None;
    for (node, res) in results {
        match res {
            Ok(()) => ok_nodes.push(node),
            Err(e) => {
                warn!("txn {} begin failed on {}: {}", c.uuid, node, e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }
    if let Some(err) = first_err {
        abort_phase(ctx, c, &ok_nodes).await;
        return Err(err);
    }
    Ok(())
}

async fn abort_phase(ctx: &ProxyState, c: &TxnClientCtx, nodes: &[Snode]) {
    if nodes.is_empty() {
        return;
    }
    let path = txn_path(&c.bck, TxnPhase::Abort);
    for (node, res) in bcast_nodes(ctx, nodes, &path, &c.query, &c.msg).await {
        if let Err(e) = res {
            warn!("txn {} abort failed on {}: {}", c.uuid, node, e);
        }
    }
}

/// Commit across all targets. The BMD was already bumped and metasynced, so
/// failures here are surfaced but never rolled back.
async fn commit_phase(ctx: &ProxyState, c: &TxnClientCtx) -> Result<(), ApiError> {
    let path = txn_path(&c.bck, TxnPhase::Commit);
    let results = bcast_targets(ctx, &path, &c.query, &c.msg).await;

    let mut first_err = None;
    for (node, res) in results {
        if let Err(e) = res {
            error!(
                "txn {} commit failed on {} (not rolled back): {}",
                c.uuid, node, e
            );
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Single-writer BMD mutation on the primary: bump, persist, metasync.
async fn mutate_bmd<F>(ctx: &ProxyState, f: F) -> Result<Bmd, ApiError>
where
    F: FnOnce(&Bmd) -> Result<Bmd, ApiError>,
{
    let _g = ctx.bmd_mutex.lock().await;
    let cur = ctx.bmd.get();
    let next = f(&cur)?;
    ctx.bmd.synchronize(next.clone())?;
    metasync::sync_bmd(ctx, &next).await;
    Ok(next)
}

async fn bump_or_abort<F>(ctx: &ProxyState, c: &TxnClientCtx, f: F) -> Result<Bmd, ApiError>
where
    F: FnOnce(&Bmd) -> Result<Bmd, ApiError>,
{
    match mutate_bmd(ctx, f).await {
        Ok(bmd) => Ok(bmd),
        Err(e) => {
            // begin succeeded everywhere; release the targets
            let targets = ctx.smap.get().targets();
            abort_phase(ctx, c, &targets).await;
            Err(e)
        }
    }
}

/// Register the job with the IC before the UUID goes back to the caller, so
/// status queries can find it.
async fn register_job(ctx: &ProxyState, uuid: &str, action: Action, bck: &Bck) {
    let smap = ctx.smap.get();
    let dsts: BTreeSet<String> = smap.tmap.keys().cloned().collect();
    let nl = NotifListener::new(uuid.to_string(), action, Some(bck.clone()), dsts);
    ic::register_equal(ctx, nl, &smap).await;
}

pub async fn handle_bucket_action(
    ctx: &ProxyState,
    bck: Bck,
    msg: ActionMsg,
    wait_metasync: bool,
) -> Result<String, ApiError> {
    info!("{} on {}", msg.action, bck);
    match msg.action {
        Action::CreateBucket | Action::RegisterCloudBucket => {
            create_bucket(ctx, bck, msg.action, msg.value).await
        }
        Action::MakeNCopies => make_n_copies(ctx, bck, msg.value).await,
        Action::SetBucketProps | Action::ResetBucketProps => {
            set_bucket_props(ctx, bck, msg.action, msg.value).await
        }
        Action::RenameBucket => rename_bucket(ctx, bck, msg.value).await,
        Action::CopyBucket => copy_bucket(ctx, bck, msg.value, wait_metasync).await,
        Action::EcEncode => ec_encode(ctx, bck, msg.value).await,
        other => Err(ApiError::Any(anyhow!(
            "unknown bucket action {:?}",
            other.as_str()
        ))),
    }
}

async fn create_bucket(
    ctx: &ProxyState,
    bck: Bck,
    action: Action,
    value: serde_json::Value,
) -> Result<String, ApiError> {
    let mut props: BucketProps = if value.is_null() {
        BucketProps::new(bck.provider)
    } else {
        serde_json::from_value(value)
            .map_err(|e| ApiError::Any(anyhow!("invalid bucket props: {}", e)))?
    };
    if action == Action::RegisterCloudBucket && props.backend_bck.is_none() {
        props.backend_bck = Some(Bck::cloud(bck.name.clone()));
    }

    if ctx.bmd.get().exists(&bck) {
        return Err(ApiError::BucketAlreadyExists(bck.to_string()));
    }

    let value = serde_json::to_value(&props).map_err(|e| ApiError::Any(e.into()))?;
    let c = prep_txn_client(ctx, &bck, action, value, false, false);

    begin_phase(ctx, &c).await?;
    bump_or_abort(ctx, &c, |bmd| bmd.add(&bck, props.clone())).await?;
    // metadata-only: no xaction, nothing to listen for
    commit_phase(ctx, &c).await?;
    Ok(c.uuid)
}

async fn make_n_copies(
    ctx: &ProxyState,
    bck: Bck,
    value: serde_json::Value,
) -> Result<String, ApiError> {
    let copies: u32 = serde_json::from_value(value.clone())
        .map_err(|e| ApiError::Any(anyhow!("invalid copies value: {}", e)))?;

    let bmd = ctx.bmd.get();
    let props = bmd
        .get(&bck)
        .ok_or_else(|| ApiError::BucketDoesNotExist(bck.to_string()))?
        .clone();

    let c = prep_txn_client(ctx, &bck, Action::MakeNCopies, value, true, false);

    begin_phase(ctx, &c).await?;

    let mut nprops = props;
    nprops.mirror.copies = copies;
    nprops.mirror.enabled = copies > 1;
    bump_or_abort(ctx, &c, |bmd| bmd.set(&bck, nprops.clone())).await?;

    register_job(ctx, &c.uuid, Action::MakeNCopies, &bck).await;
    commit_phase(ctx, &c).await?;
    Ok(c.uuid)
}

async fn set_bucket_props(
    ctx: &ProxyState,
    bck: Bck,
    action: Action,
    value: serde_json::Value,
) -> Result<String, ApiError> {
    let bmd = ctx.bmd.get();
    if !bmd.exists(&bck) {
        return Err(ApiError::BucketDoesNotExist(bck.to_string()));
    }

    let nprops: BucketProps = if action == Action::ResetBucketProps {
        BucketProps::new(bck.provider)
    } else {
        serde_json::from_value(value)
            .map_err(|e| ApiError::Any(anyhow!("invalid bucket props: {}", e)))?
    };

    let value = serde_json::to_value(&nprops).map_err(|e| ApiError::Any(e.into()))?;
    let c = prep_txn_client(ctx, &bck, action, value, true, false);

    begin_phase(ctx, &c).await?;
    bump_or_abort(ctx, &c, |bmd| bmd.set(&bck, nprops.clone())).await?;

    register_job(ctx, &c.uuid, action, &bck).await;
    commit_phase(ctx, &c).await?;
    Ok(c.uuid)
}

async fn rename_bucket(
    ctx: &ProxyState,
    bck: Bck,
    value: serde_json::Value,
) -> Result<String, ApiError> {
    let bck_to: Bck = serde_json::from_value(value.clone())
        .map_err(|e| ApiError::Any(anyhow!("invalid rename destination: {}", e)))?;

    let bmd = ctx.bmd.get();
    if !bmd.exists(&bck) {
        return Err(ApiError::BucketDoesNotExist(bck.to_string()));
    }
    if bmd.exists(&bck_to) {
        return Err(ApiError::BucketAlreadyExists(bck_to.to_string()));
    }

    let c = prep_txn_client(ctx, &bck, Action::RenameBucket, value, true, false);

    begin_phase(ctx, &c).await?;
    bump_or_abort(ctx, &c, |bmd| bmd.rename(&bck, &bck_to)).await?;

    register_job(ctx, &c.uuid, Action::RenameBucket, &bck_to).await;
    commit_phase(ctx, &c).await?;
    Ok(c.uuid)
}

async fn copy_bucket(
    ctx: &ProxyState,
    bck: Bck,
    value: serde_json::Value,
    wait_metasync: bool,
) -> Result<String, ApiError> {
    let bck_to: Bck = serde_json::from_value(value.clone())
        .map_err(|e| ApiError::Any(anyhow!("invalid copy destination: {}", e)))?;

    let bmd = ctx.bmd.get();
    let props = bmd
        .get(&bck)
        .ok_or_else(|| ApiError::BucketDoesNotExist(bck.to_string()))?
        .clone();
    if bmd.exists(&bck_to) {
        return Err(ApiError::BucketAlreadyExists(bck_to.to_string()));
    }

    let c = prep_txn_client(ctx, &bck, Action::CopyBucket, value, true, wait_metasync);

    begin_phase(ctx, &c).await?;
    bump_or_abort(ctx, &c, |bmd| bmd.add(&bck_to, props.clone())).await?;

    register_job(ctx, &c.uuid, Action::CopyBucket, &bck_to).await;
    commit_phase(ctx, &c).await?;
    Ok(c.uuid)
}

async fn ec_encode(
    ctx: &ProxyState,
    bck: Bck,
    value: serde_json::Value,
) -> Result<String, ApiError> {
    let bmd = ctx.bmd.get();
    let props = bmd
        .get(&bck)
        .ok_or_else(|| ApiError::BucketDoesNotExist(bck.to_string()))?
        .clone();

    let ec: EcConf = if value.is_null() {
        EcConf {
            enabled: true,
            data_slices: 2,
            parity_slices: 2,
        }
    } else {
        serde_json::from_value(value)
            .map_err(|e| ApiError::Any(anyhow!("invalid EC config: {}", e)))?
    };

    let value = serde_json::to_value(&ec).map_err(|e| ApiError::Any(e.into()))?;
    let c = prep_txn_client(ctx, &bck, Action::EcEncode, value, true, false);

    begin_phase(ctx, &c).await?;

    let mut nprops = props;
    nprops.ec = ec;
    nprops.ec.enabled = true;
    bump_or_abort(ctx, &c, |bmd| bmd.set(&bck, nprops.clone())).await?;

    register_job(ctx, &c.uuid, Action::EcEncode, &bck).await;
    commit_phase(ctx, &c).await?;
    Ok(c.uuid)
}
