use axum_server::Server;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use common::bmd::Bmd;
use common::constants::{BMD_FNAME, HEADER_CALLER_ID, HEADER_CALLER_NAME, SMAP_FNAME};
use common::msg::{JoinRequest, JoinResponse};
use common::owner::{BmdOwner, SmapOwner};
use common::smap::{NodeRole, Smap, Snode};

use crate::core::ic;
use crate::core::notifs::{notif_sweeper, NotifTable};
use crate::core::routes::build_router;
use crate::core::state::ProxyState;

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Stable node ID
    #[arg(long)]
    pub id: String,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// URL other nodes use to reach this proxy; derived from --listen when absent
    #[arg(long)]
    pub public_url: Option<String>,

    /// Directory for persisted cluster metadata
    #[arg(long, default_value = "./data")]
    pub data: PathBuf,

    /// Primary proxy URL to join; bootstrap a new cluster when absent
    #[arg(long)]
    pub join: Option<String>,

    /// Information-center size
    #[arg(long, default_value_t = 3)]
    pub ic_size: usize,

    /// Per-transaction timeout shipped to targets (milliseconds)
    #[arg(long, default_value_t = 5000)]
    pub txn_timeout_ms: u64,

    /// Grace period before a terminal listener is evicted (seconds)
    #[arg(long, default_value_t = 60)]
    pub notif_grace_secs: u64,

    /// Force-finish listeners running longer than this (seconds)
    #[arg(long, default_value_t = 600)]
    pub listener_timeout_secs: u64,

    /// Notification housekeeping interval (seconds)
    #[arg(long, default_value_t = 10)]
    pub sweep_secs: u64,

    /// Node-to-node HTTP timeout (seconds)
    #[arg(long, default_value_t = 10)]
    pub http_timeout_secs: u64,
}

pub async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let public_url = args
        .public_url
        .clone()
        .unwrap_or_else(|| format!("http://{}", args.listen));

    let snode = Snode {
        id: args.id.clone(),
        role: NodeRole::Proxy,
        public_url: public_url.clone(),
        intra_control_url: public_url,
    };

    let smap = Arc::new(SmapOwner::load_or(
        args.data.join(SMAP_FNAME),
        Smap::default(),
    )?);
    let bmd = Arc::new(BmdOwner::load_or(args.data.join(BMD_FNAME), Bmd::default())?);

    let state = ProxyState {
        http_client: reqwest::Client::builder()
            .timeout(Duration::from_secs(args.http_timeout_secs))
            .build()?,
        snode: Arc::new(snode.clone()),
        smap,
        bmd,
        notifs: Arc::new(NotifTable::new()),
        ic_size: args.ic_size,
        txn_timeout_ms: args.txn_timeout_ms,
        bmd_mutex: Arc::new(tokio::sync::Mutex::new(())),
        smap_mutex: Arc::new(tokio::sync::Mutex::new(())),
        keepalive: Arc::new(RwLock::new(HashMap::new())),
    };

    match &args.join {
        None => {
            if state.smap.get().version == 0 {
                // fresh cluster: this proxy is the primary
                let cluster_uuid = Uuid::new_v4().to_string();
                state
                    .smap
                    .synchronize(Smap::new(cluster_uuid.clone(), snode))?;
                state.bmd.synchronize(Bmd::new(cluster_uuid))?;
                info!(
                    "bootstrapped cluster {} as primary",
                    state.smap.get().uuid
                );
            }
        }
        Some(join_url) => {
            // UUID mismatch against persisted state is fatal here
            join_cluster(&state, join_url).await?;
            if state.is_ic_member() {
                if let Err(e) = ic::sync_ic_bundle(&state).await {
                    warn!("IC bundle bootstrap failed: {}", e);
                }
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_handle = tokio::spawn(notif_sweeper(
        state.notifs.clone(),
        Duration::from_secs(args.sweep_secs),
        Duration::from_secs(args.notif_grace_secs),
        Duration::from_secs(args.listener_timeout_secs),
        shutdown_rx,
    ));

    let app = build_router(state.clone());

    let socket_addr: std::net::SocketAddr = args.listen.parse()?;
    let server = Server::bind(socket_addr).serve(app.into_make_service());

    info!("{} listening on {}", state.snode, args.listen);

    tokio::select! {
        res = server => { res?; }
        _ = tokio::signal::ctrl_c() => {}
    }

    let _ = shutdown_tx.send(true);
    let _ = sweeper_handle.await;

    Ok(())
}

async fn join_cluster(state: &ProxyState, join_url: &str) -> anyhow::Result<()> {
    let url = format!("{}/v1/cluster/join", join_url);
    let req = JoinRequest {
        snode: (*state.snode).clone(),
    };

    let mut last_err = None;
    for _ in 0..5 {
        let res = state
            .http_client
            .post(&url)
            .json(&req)
            .header(HEADER_CALLER_ID, state.snode.id.as_str())
            .header(HEADER_CALLER_NAME, state.snode.to_string())
            .send()
            .await;
        match res {
            Ok(resp) if resp.status().is_success() => {
                let jr: JoinResponse = resp.json().await?;
                state.smap.synchronize(jr.smap)?;
                state.bmd.synchronize(jr.bmd)?;
                let smap = state.smap.get();
                info!(
                    "{} joined cluster {} (smap v{}, {})",
                    state.snode,
                    smap.uuid,
                    smap.version,
                    smap.str_ic(&state.snode.id)
                );
                return Ok(());
            }
            Ok(resp) => {
                last_err = Some(anyhow::anyhow!("join replied {}", resp.status()));
            }
            Err(e) => {
                last_err = Some(e.into());
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("failed to join cluster at {}", join_url)))
}
