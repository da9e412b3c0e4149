use anyhow::anyhow;
use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use common::bck::{Bck, BucketProps};
use common::error::ApiError;
use common::msg::{Action, ActionMsg, MetasyncBody, TxnPhase, TxnResp, XactStatusResp};

use crate::core::state::TargetState;
use crate::core::txn::{TxnPayload, TxnView};
use crate::core::xact::{self, bck_copy, bck_rename, ec_encode, make_n_copies};

const DEFAULT_TXN_TIMEOUT_MS: u64 = 5000;

pub fn build_router(state: TargetState) -> Router {
    Router::new()
        .route("/v1/txn/{bucket}/{phase}", post(txn_handler))
        .route(
            "/v1/xactions",
            get(xact_status_handler)
                .post(xact_start_handler)
                .delete(xact_abort_handler),
        )
        .route("/v1/metasync", post(metasync_handler))
        .route("/v1/health", get(health_handler))
        .with_state(state)
}

#[derive(Deserialize, Debug)]
pub struct TxnQuery {
    pub uuid: Option<String>,
    #[serde(rename = "tx-timeout")]
    pub tx_timeout: Option<u64>,
    pub provider: Option<String>,
    pub ns: Option<String>,
    #[serde(rename = "wait-metasync")]
    pub wait_metasync: Option<bool>,
    pub notify: Option<String>,
}

/// All of the request's context in one place, gathered before dispatch.
pub struct TxnCtx {
    pub uuid: String,
    pub phase: TxnPhase,
    pub timeout: Duration,
    pub msg: ActionMsg,
    pub bck: Bck,
    pub caller_id: String,
    pub caller_name: String,
    pub notify: Vec<String>,
    pub wait_metasync: bool,
}

fn prep_txn_ctx(
    bucket: &str,
    phase: &str,
    q: TxnQuery,
    headers: &HeaderMap,
    msg: ActionMsg,
) -> Result<TxnCtx, ApiError> {
    let phase = TxnPhase::parse(phase).map_err(ApiError::Any)?;
    let bck =
        Bck::from_query(bucket, q.provider.as_deref(), q.ns.as_deref()).map_err(ApiError::Any)?;

    let uuid = match q.uuid {
        Some(u) if !u.is_empty() => u,
        _ => msg.uuid.clone(),
    };
    if uuid.is_empty() {
        return Err(ApiError::Any(anyhow!("missing transaction uuid")));
    }

    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    Ok(TxnCtx {
        uuid,
        phase,
        timeout: Duration::from_millis(q.tx_timeout.unwrap_or(DEFAULT_TXN_TIMEOUT_MS)),
        msg,
        bck,
        caller_id: header_str(common::constants::HEADER_CALLER_ID),
        caller_name: header_str(common::constants::HEADER_CALLER_NAME),
        notify: q
            .notify
            .map(|s| s.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
        wait_metasync: q.wait_metasync.unwrap_or(false),
    })
}

// POST /v1/txn/{bucket}/{phase}
#[tracing::instrument(name = "tgt.txn", skip_all, fields(bucket = %bucket, phase = %phase, action = %msg.action))]
pub async fn txn_handler(
    State(ctx): State<TargetState>,
    Path((bucket, phase)): Path<(String, String)>,
    Query(q): Query<TxnQuery>,
    headers: HeaderMap,
    Json(msg): Json<ActionMsg>,
) -> Result<StatusCode, ApiError> {
    let c = prep_txn_ctx(&bucket, &phase, q, &headers, msg)?;

    match c.msg.action {
        Action::CreateBucket | Action::RegisterCloudBucket => create_bucket(&ctx, c).await?,
        Action::MakeNCopies => make_n_copies_txn(&ctx, c).await?,
        Action::SetBucketProps | Action::ResetBucketProps => set_bucket_props(&ctx, c).await?,
        Action::RenameBucket => rename_bucket(&ctx, c).await?,
        Action::CopyBucket => copy_bucket(&ctx, c).await?,
        Action::EcEncode => ec_encode_txn(&ctx, c).await?,
        other => {
            return Err(ApiError::Any(anyhow!(
                "unknown transaction action {:?}",
                other.as_str()
            )));
        }
    }
    Ok(StatusCode::OK)
}

async fn create_bucket(t: &TargetState, c: TxnCtx) -> Result<(), ApiError> {
    match c.phase {
        TxnPhase::Begin => {
            let view = TxnView::new(
                c.uuid.clone(),
                c.msg.action,
                c.bck.clone(),
                t.bmd.version() + 1,
                TxnPayload::CreateBucket,
            );
            t.transactions.begin(view)
        }
        TxnPhase::Abort => {
            t.transactions.abort(&c.uuid);
            Ok(())
        }
        TxnPhase::Commit => {
            t.transactions.find(&c.uuid)?;
            t.transactions.wait(&c.uuid, c.timeout).await?;
            t.transactions.done(&c.uuid);
            Ok(())
        }
    }
}

async fn make_n_copies_txn(t: &TargetState, c: TxnCtx) -> Result<(), ApiError> {
    match c.phase {
        TxnPhase::Begin => {
            let (cur_copies, new_copies) = validate_make_n_copies(t, &c)?;
            let held = t.nlps.try_lock(&c.bck)?;
            let view = TxnView::new(
                c.uuid.clone(),
                c.msg.action,
                c.bck.clone(),
                t.bmd.version() + 1,
                TxnPayload::MakeNCopies {
                    cur_copies,
                    new_copies,
                },
            );
            if let Err(e) = t.transactions.begin(view) {
                held.release();
                return Err(e);
            }
            t.transactions.attach_locks(&c.uuid, vec![held]);
            Ok(())
        }
        TxnPhase::Abort => {
            t.transactions.abort(&c.uuid);
            Ok(())
        }
        TxnPhase::Commit => {
            let view = t.transactions.find(&c.uuid)?;
            let TxnPayload::MakeNCopies { new_copies, .. } = view.payload else {
                return Err(ApiError::Any(anyhow!(
                    "{}: unexpected transaction payload",
                    c.uuid
                )));
            };
            let copies = parse_copies(&c.msg.value)?;
            if copies != new_copies {
                return Err(ApiError::Any(anyhow!(
                    "{}: copies mismatch ({} vs {})",
                    c.uuid,
                    copies,
                    new_copies
                )));
            }
            t.transactions.wait(&c.uuid, c.timeout).await?;

            let xact = t.xactions.renew(Action::MakeNCopies, Some(&c.bck), &c.uuid)?;
            t.xactions.do_abort(Action::PutCopies, Some(&c.bck));
            xact.add_notif_dsts(c.notify.clone());
            xact::spawn_bck_xact(
                t,
                xact,
                c.bck.clone(),
                make_n_copies::callback(t.mountpaths.clone(), c.bck.clone(), copies),
            );
            t.transactions.done(&c.uuid);
            Ok(())
        }
    }
}

async fn set_bucket_props(t: &TargetState, c: TxnCtx) -> Result<(), ApiError> {
    match c.phase {
        TxnPhase::Begin => {
            let (bprops, nprops) = validate_nprops(t, &c)?;
            let held = t.nlps.try_lock(&c.bck)?;
            let view = TxnView::new(
                c.uuid.clone(),
                c.msg.action,
                c.bck.clone(),
                t.bmd.version() + 1,
                TxnPayload::SetBucketProps { bprops, nprops },
            );
            if let Err(e) = t.transactions.begin(view) {
                held.release();
                return Err(e);
            }
            t.transactions.attach_locks(&c.uuid, vec![held]);
            Ok(())
        }
        TxnPhase::Abort => {
            t.transactions.abort(&c.uuid);
            Ok(())
        }
        TxnPhase::Commit => {
            let view = t.transactions.find(&c.uuid)?;
            let TxnPayload::SetBucketProps { bprops, nprops } = view.payload else {
                return Err(ApiError::Any(anyhow!(
                    "{}: unexpected transaction payload",
                    c.uuid
                )));
            };
            t.transactions.wait(&c.uuid, c.timeout).await?;

            // begin validation rejects a payload that would trigger both
            if re_mirror(&bprops, &nprops) {
                let xact = t.xactions.renew(Action::MakeNCopies, Some(&c.bck), &c.uuid)?;
                t.xactions.do_abort(Action::PutCopies, Some(&c.bck));
                xact.add_notif_dsts(c.notify.clone());
                xact::spawn_bck_xact(
                    t,
                    xact,
                    c.bck.clone(),
                    make_n_copies::callback(
                        t.mountpaths.clone(),
                        c.bck.clone(),
                        nprops.mirror.copies,
                    ),
                );
            } else if re_ec(&bprops, &nprops) {
                t.xactions.do_abort(Action::EcEncode, Some(&c.bck));
                let xact = t.xactions.renew(Action::EcEncode, Some(&c.bck), &c.uuid)?;
                xact.add_notif_dsts(c.notify.clone());
                xact::spawn_bck_xact(t, xact, c.bck.clone(), ec_encode::callback());
            }
            t.transactions.done(&c.uuid);
            Ok(())
        }
    }
}

async fn rename_bucket(t: &TargetState, c: TxnCtx) -> Result<(), ApiError> {
    match c.phase {
        TxnPhase::Begin => {
            let (bck_from, bck_to) = validate_bck_rename(t, &c)?;
            let held = lock_two(t, (&bck_from, true), (&bck_to, true))?;
            let view = TxnView::new(
                c.uuid.clone(),
                c.msg.action,
                c.bck.clone(),
                t.bmd.version() + 1,
                TxnPayload::RenameBucket { bck_from, bck_to },
            );
            if let Err(e) = t.transactions.begin(view) {
                for l in &held {
                    l.release();
                }
                return Err(e);
            }
            t.transactions.attach_locks(&c.uuid, held);
            Ok(())
        }
        TxnPhase::Abort => {
            t.transactions.abort(&c.uuid);
            Ok(())
        }
        TxnPhase::Commit => {
            let view = t.transactions.find(&c.uuid)?;
            let TxnPayload::RenameBucket { bck_from, bck_to } = view.payload else {
                return Err(ApiError::Any(anyhow!(
                    "{}: unexpected transaction payload",
                    c.uuid
                )));
            };
            t.transactions.wait(&c.uuid, c.timeout).await?;

            // must not fail at commit time; surfaced to the operator if it does
            t.mountpaths.rename_bucket_dirs(&bck_from, &bck_to)?;

            let xact = t.xactions.renew(Action::RenameBucket, Some(&bck_to), &c.uuid)?;
            xact.add_notif_dsts(c.notify.clone());
            xact::spawn_bck_xact(t, xact, bck_to, bck_rename::callback());
            t.transactions.done(&c.uuid);
            Ok(())
        }
    }
}

async fn copy_bucket(t: &TargetState, c: TxnCtx) -> Result<(), ApiError> {
    match c.phase {
        TxnPhase::Begin => {
            let (bck_from, bck_to) = validate_bck_copy(t, &c)?;
            let held = lock_two(t, (&bck_from, false), (&bck_to, true))?;
            let view = TxnView::new(
                c.uuid.clone(),
                c.msg.action,
                c.bck.clone(),
                t.bmd.version() + 1,
                TxnPayload::CopyBucket { bck_from, bck_to },
            );
            if let Err(e) = t.transactions.begin(view) {
                for l in &held {
                    l.release();
                }
                return Err(e);
            }
            t.transactions.attach_locks(&c.uuid, held);
            Ok(())
        }
        TxnPhase::Abort => {
            t.transactions.abort(&c.uuid);
            Ok(())
        }
        TxnPhase::Commit => {
            let view = t.transactions.find(&c.uuid)?;
            let TxnPayload::CopyBucket { bck_from, bck_to } = view.payload else {
                return Err(ApiError::Any(anyhow!(
                    "{}: unexpected transaction payload",
                    c.uuid
                )));
            };
            // without wait-metasync the commit is fire-and-forget
            if c.wait_metasync {
                t.transactions.wait(&c.uuid, c.timeout).await?;
            }

            let xact = t.xactions.renew(Action::CopyBucket, Some(&bck_to), &c.uuid)?;
            xact.add_notif_dsts(c.notify.clone());
            xact::spawn_bck_xact(
                t,
                xact,
                bck_from.clone(),
                bck_copy::callback(t.mountpaths.clone(), bck_from, bck_to),
            );
            t.transactions.done(&c.uuid);
            Ok(())
        }
    }
}

async fn ec_encode_txn(t: &TargetState, c: TxnCtx) -> Result<(), ApiError> {
    match c.phase {
        TxnPhase::Begin => {
            validate_ec_encode(t, &c)?;
            let held = t.nlps.try_lock(&c.bck)?;
            let view = TxnView::new(
                c.uuid.clone(),
                c.msg.action,
                c.bck.clone(),
                t.bmd.version() + 1,
                TxnPayload::EcEncode,
            );
            if let Err(e) = t.transactions.begin(view) {
                held.release();
                return Err(e);
            }
            t.transactions.attach_locks(&c.uuid, vec![held]);
            // placeholder only; the execution task is spawned at commit
            if let Err(e) = t.xactions.renew(Action::EcEncode, Some(&c.bck), &c.uuid) {
                t.transactions.abort(&c.uuid);
                return Err(e);
            }
            Ok(())
        }
        TxnPhase::Abort => {
            t.transactions.abort(&c.uuid);
            t.xactions.abort_uuid(&c.uuid);
            Ok(())
        }
        TxnPhase::Commit => {
            t.transactions.find(&c.uuid)?;
            t.transactions.wait(&c.uuid, c.timeout).await?;

            let xact = t.xactions.renew(Action::EcEncode, Some(&c.bck), &c.uuid)?;
            xact.add_notif_dsts(c.notify.clone());
            xact::spawn_bck_xact(t, xact, c.bck.clone(), ec_encode::callback());
            t.transactions.done(&c.uuid);
            Ok(())
        }
    }
}

//
// validation
//

fn parse_copies(v: &serde_json::Value) -> Result<u32, ApiError> {
    let n: u32 = serde_json::from_value(v.clone())
        .map_err(|e| ApiError::Any(anyhow!("invalid copies value: {}", e)))?;
    if n < 1 {
        return Err(ApiError::Any(anyhow!("copies must be at least 1")));
    }
    Ok(n)
}

fn validate_make_n_copies(t: &TargetState, c: &TxnCtx) -> Result<(u32, u32), ApiError> {
    let bmd = t.bmd.get();
    let props = bmd
        .get(&c.bck)
        .ok_or_else(|| ApiError::BucketDoesNotExist(c.bck.to_string()))?;
    let cur_copies = props.mirror.copies;
    let new_copies = parse_copies(&c.msg.value)?;

    let mpaths = t.mountpaths.num_avail();
    if new_copies as usize > mpaths {
        return Err(ApiError::Any(anyhow!(
            "{}: number of mountpaths {} is insufficient to configure {} as a {}-way mirror",
            t.snode,
            mpaths,
            c.bck,
            new_copies
        )));
    }
    co_exists(t, &c.bck, c.msg.action)?;

    // increasing the copy count is refused above the high watermark
    if cur_copies < new_copies {
        if let Some(err) = t.mountpaths.get_cap_status().err() {
            return Err(err);
        }
    }
    Ok((cur_copies, new_copies))
}

fn validate_nprops(t: &TargetState, c: &TxnCtx) -> Result<(BucketProps, BucketProps), ApiError> {
    let bmd = t.bmd.get();
    let bprops = bmd
        .get(&c.bck)
        .ok_or_else(|| ApiError::BucketDoesNotExist(c.bck.to_string()))?
        .clone();

    let nprops: BucketProps = if c.msg.action == Action::ResetBucketProps {
        BucketProps::new(c.bck.provider)
    } else {
        serde_json::from_value(c.msg.value.clone())
            .map_err(|e| ApiError::Any(anyhow!("invalid bucket props: {}", e)))?
    };

    co_exists(t, &c.bck, c.msg.action)?;

    let cs = t.mountpaths.get_cap_status();
    if nprops.mirror.enabled {
        let mpaths = t.mountpaths.num_avail();
        if nprops.mirror.copies as usize > mpaths {
            return Err(ApiError::Any(anyhow!(
                "{}: number of mountpaths {} is insufficient to configure {} as a {}-way mirror",
                t.snode,
                mpaths,
                c.bck,
                nprops.mirror.copies
            )));
        }
        if nprops.mirror.copies > bprops.mirror.copies {
            if let Some(err) = cs.err() {
                return Err(err);
            }
        }
    }
    if nprops.ec.enabled && !bprops.ec.enabled {
        if let Some(err) = cs.err() {
            return Err(err);
        }
    }

    // EC-encode and mirror changes never overlap on a bucket, and a single
    // transaction must not trigger both
    let will_mirror = re_mirror(&bprops, &nprops);
    let will_ec = re_ec(&bprops, &nprops);
    if will_mirror && will_ec {
        return Err(ApiError::Any(anyhow!(
            "{}: cannot change mirroring and EC on bucket {} in one transaction",
            t.snode,
            c.bck
        )));
    }
    if will_mirror {
        if let Some(x) = t.xactions.find_running(Action::EcEncode, Some(&c.bck)) {
            return Err(ApiError::Any(anyhow!(
                "{}: {} is running, cannot run {:?} on bucket {}",
                t.snode,
                x,
                c.msg.action.as_str(),
                c.bck
            )));
        }
    }
    if will_ec {
        if let Some(x) = t.xactions.find_running(Action::MakeNCopies, Some(&c.bck)) {
            return Err(ApiError::Any(anyhow!(
                "{}: {} is running, cannot run {:?} on bucket {}",
                t.snode,
                x,
                c.msg.action.as_str(),
                c.bck
            )));
        }
    }
    Ok((bprops, nprops))
}

fn validate_bck_rename(t: &TargetState, c: &TxnCtx) -> Result<(Bck, Bck), ApiError> {
    let bck_to: Bck = serde_json::from_value(c.msg.value.clone())
        .map_err(|e| ApiError::Any(anyhow!("invalid rename destination: {}", e)))?;

    if let Some(err) = t.mountpaths.get_cap_status().err() {
        return Err(err);
    }
    co_exists(t, &c.bck, c.msg.action)?;

    let bmd = t.bmd.get();
    if !bmd.exists(&c.bck) {
        return Err(ApiError::BucketDoesNotExist(c.bck.to_string()));
    }
    if bmd.exists(&bck_to) {
        return Err(ApiError::BucketAlreadyExists(bck_to.to_string()));
    }
    t.mountpaths.check_dst_dirs_clear(&bck_to)?;
    Ok((c.bck.clone(), bck_to))
}

fn validate_bck_copy(t: &TargetState, c: &TxnCtx) -> Result<(Bck, Bck), ApiError> {
    let bck_to: Bck = serde_json::from_value(c.msg.value.clone())
        .map_err(|e| ApiError::Any(anyhow!("invalid copy destination: {}", e)))?;

    if let Some(err) = t.mountpaths.get_cap_status().err() {
        return Err(err);
    }
    co_exists(t, &c.bck, c.msg.action)?;

    let bmd = t.bmd.get();
    if !bmd.exists(&c.bck) {
        return Err(ApiError::BucketDoesNotExist(c.bck.to_string()));
    }
    Ok((c.bck.clone(), bck_to))
}

fn validate_ec_encode(t: &TargetState, c: &TxnCtx) -> Result<(), ApiError> {
    if let Some(err) = t.mountpaths.get_cap_status().err() {
        return Err(err);
    }
    co_exists(t, &c.bck, c.msg.action)?;

    let bmd = t.bmd.get();
    if !bmd.exists(&c.bck) {
        return Err(ApiError::BucketDoesNotExist(c.bck.to_string()));
    }
    Ok(())
}

/// Limited coexistence: rejected while a cluster rebalance or local resilver
/// is in flight, and EC-encode never overlaps a mirror change on the same
/// bucket.
fn co_exists(t: &TargetState, bck: &Bck, action: Action) -> Result<(), ApiError> {
    if let Some(x) = t.xactions.reb_marked() {
        return Err(ApiError::Any(anyhow!(
            "{}: {} is running, cannot run {:?} on bucket {}",
            t.snode,
            x,
            action.as_str(),
            bck
        )));
    }
    if let Some(x) = t.xactions.resilver_marked() {
        return Err(ApiError::Any(anyhow!(
            "{}: {} is running, cannot run {:?} on bucket {}",
            t.snode,
            x,
            action.as_str(),
            bck
        )));
    }

    let conflict = match action {
        Action::MakeNCopies => t.xactions.find_running(Action::EcEncode, Some(bck)),
        Action::EcEncode => t.xactions.find_running(Action::MakeNCopies, Some(bck)),
        _ => None,
    };
    if let Some(x) = conflict {
        return Err(ApiError::Any(anyhow!(
            "{}: {} is running, cannot run {:?} on bucket {}",
            t.snode,
            x,
            action.as_str(),
            bck
        )));
    }
    Ok(())
}

fn re_mirror(bprops: &BucketProps, nprops: &BucketProps) -> bool {
    nprops.mirror.enabled
        && (bprops.mirror.enabled != nprops.mirror.enabled
            || bprops.mirror.copies != nprops.mirror.copies)
}

fn re_ec(bprops: &BucketProps, nprops: &BucketProps) -> bool {
    nprops.ec.enabled && (!bprops.ec.enabled || bprops.ec != nprops.ec)
}

/// Multi-bucket lock acquisition in canonical bucket order, so two
/// concurrent rename/copy transactions cannot deadlock.
fn lock_two(
    t: &TargetState,
    a: (&Bck, bool),
    b: (&Bck, bool),
) -> Result<Vec<crate::core::nlp::HeldLock>, ApiError> {
    let mut pair = [a, b];
    pair.sort_by(|x, y| x.0.cmp(y.0));

    let acquire = |(bck, exclusive): (&Bck, bool)| {
        if exclusive {
            t.nlps.try_lock(bck)
        } else {
            t.nlps.try_rlock(bck)
        }
    };

    let first = acquire(pair[0])?;
    match acquire(pair[1]) {
        Ok(second) => Ok(vec![first, second]),
        Err(e) => {
            first.release();
            Err(e)
        }
    }
}

//
// xaction admin & status
//

#[derive(Deserialize)]
pub struct XactIdQuery {
    pub id: String,
}

// GET /v1/xactions?id=
pub async fn xact_status_handler(
    State(ctx): State<TargetState>,
    Query(q): Query<XactIdQuery>,
) -> Result<Json<XactStatusResp>, ApiError> {
    let xact = ctx
        .xactions
        .find_uuid(&q.id)
        .ok_or_else(|| ApiError::XactionNotFound(q.id.clone()))?;
    Ok(Json(xact.status()))
}

// POST /v1/xactions: start a global marker xaction (rebalance, resilver)
pub async fn xact_start_handler(
    State(ctx): State<TargetState>,
    Json(msg): Json<ActionMsg>,
) -> Result<Json<TxnResp>, ApiError> {
    match msg.action {
        Action::Rebalance | Action::Resilver => {
            if msg.uuid.is_empty() {
                return Err(ApiError::Any(anyhow!("missing xaction uuid")));
            }
            let xact = ctx.xactions.renew(msg.action, None, &msg.uuid)?;
            xact::spawn_marker(&ctx, xact);
            Ok(Json(TxnResp { uuid: msg.uuid }))
        }
        other => Err(ApiError::Any(anyhow!(
            "cannot start {:?} directly",
            other.as_str()
        ))),
    }
}

// DELETE /v1/xactions?id=
pub async fn xact_abort_handler(
    State(ctx): State<TargetState>,
    Query(q): Query<XactIdQuery>,
) -> Result<StatusCode, ApiError> {
    if !ctx.xactions.abort_uuid(&q.id) {
        return Err(ApiError::XactionNotFound(q.id));
    }
    Ok(StatusCode::OK)
}

// POST /v1/metasync
pub async fn metasync_handler(
    State(ctx): State<TargetState>,
    Json(body): Json<MetasyncBody>,
) -> Result<StatusCode, ApiError> {
    if let Some(smap) = body.smap {
        match ctx.smap.synchronize(smap) {
            Ok(true) => info!("installed cluster map v{}", ctx.smap.version()),
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

#[derive(Serialize)]
pub struct HealthResp {
    pub node_id: String,
    pub smap_version: u64,
    pub bmd_version: u64,
}

// GET /v1/health
pub async fn health_handler(State(ctx): State<TargetState>) -> Json<HealthResp> {
    Json(HealthResp {
        node_id: ctx.snode.id.clone(),
        smap_version: ctx.smap.version(),
        bmd_version: ctx.bmd.version(),
    })
}
