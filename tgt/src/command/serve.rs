use axum_server::Server;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use common::bmd::Bmd;
use common::constants::{BMD_FNAME, SMAP_FNAME};
use common::owner::{BmdOwner, SmapOwner};
use common::smap::{NodeRole, Smap, Snode};

use crate::core::cluster::{join_cluster, keepalive_loop};
use crate::core::mountpath::{cap_sweeper, MountpathRegistry};
use crate::core::nlp::NameLockRegistry;
use crate::core::routes::build_router;
use crate::core::state::TargetState;
use crate::core::txn::{txn_gc_sweeper, TxnTable};
use crate::core::xact::XactRegistry;

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Stable node ID
    #[arg(long)]
    pub id: String,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8081")]
    pub listen: String,

    /// URL other nodes use to reach this target; derived from --listen when absent
    #[arg(long)]
    pub public_url: Option<String>,

    /// Directory for persisted cluster metadata
    #[arg(long, default_value = "./data")]
    pub data: PathBuf,

    /// Local mountpaths (repeatable)
    #[arg(long = "mountpath", required = true)]
    pub mountpaths: Vec<PathBuf>,

    /// Primary proxy URL to join; standalone when absent
    #[arg(long)]
    pub join: Option<String>,

    /// Per-mountpath capacity budget in bytes (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    pub capacity_bytes: u64,

    /// Used-capacity high watermark, percent
    #[arg(long, default_value_t = 90)]
    pub highwm: u32,

    /// Used-capacity out-of-space threshold, percent
    #[arg(long, default_value_t = 95)]
    pub oos: u32,

    /// Capacity sweep interval (seconds)
    #[arg(long, default_value_t = 10)]
    pub cap_sweep_secs: u64,

    /// Stale-transaction TTL (seconds)
    #[arg(long, default_value_t = 600)]
    pub txn_ttl_secs: u64,

    /// Keepalive interval (seconds)
    #[arg(long, default_value_t = 10)]
    pub keepalive_secs: u64,

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
        role: NodeRole::Target,
        public_url: public_url.clone(),
        intra_control_url: public_url,
    };

    let smap = Arc::new(SmapOwner::load_or(
        args.data.join(SMAP_FNAME),
        Smap::default(),
    )?);
    let bmd = Arc::new(BmdOwner::load_or(args.data.join(BMD_FNAME), Bmd::default())?);

    let mountpaths = Arc::new(MountpathRegistry::new(
        args.mountpaths.clone(),
        args.capacity_bytes,
        args.highwm,
        args.oos,
    )?);
    mountpaths.refresh_cap();

    let state = TargetState {
        http_client: reqwest::Client::builder()
            .timeout(Duration::from_secs(args.http_timeout_secs))
            .build()?,
        snode: Arc::new(snode),
        smap,
        bmd: bmd.clone(),
        mountpaths: mountpaths.clone(),
        nlps: Arc::new(NameLockRegistry::new()),
        transactions: Arc::new(TxnTable::new(bmd.subscribe())),
        xactions: Arc::new(XactRegistry::new()),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let cap_handle = tokio::spawn(cap_sweeper(
        mountpaths,
        Duration::from_secs(args.cap_sweep_secs),
        shutdown_rx.clone(),
    ));
    let gc_handle = tokio::spawn(txn_gc_sweeper(
        state.transactions.clone(),
        Duration::from_secs(args.txn_ttl_secs),
        Duration::from_secs(args.txn_ttl_secs.max(1) / 2 + 1),
        shutdown_rx.clone(),
    ));

    // membership: a UUID mismatch against persisted metadata is fatal here
    let mut keepalive_handle = None;
    if let Some(join_url) = &args.join {
        join_cluster(&state, join_url).await?;
        keepalive_handle = Some(tokio::spawn(keepalive_loop(
            state.clone(),
            Duration::from_secs(args.keepalive_secs),
            shutdown_rx.clone(),
        )));
    }

    let app = build_router(state.clone());

    let socket_addr: std::net::SocketAddr = args.listen.parse()?;
    let server = Server::bind(socket_addr).serve(app.into_make_service());

    info!("{} listening on {}", state.snode, args.listen);

    tokio::select! {
        res = server => { res?; }
        _ = tokio::signal::ctrl_c() => {}
    }

    let _ = shutdown_tx.send(true);
    let _ = cap_handle.await;
    let _ = gc_handle.await;
    if let Some(h) = keepalive_handle {
        let _ = h.await;
    }

    Ok(())
}
