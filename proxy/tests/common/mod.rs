#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::Result;
use axum_server::Server;
use reqwest::Client;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::bck::Bck;
use common::bmd::Bmd;
use common::constants::{BMD_FNAME, SMAP_FNAME};
use common::msg::{Action, ActionMsg, JoinRequest, JoinResponse, TxnResp, XactStatusResp};
use common::owner::{BmdOwner, SmapOwner};
use common::smap::{NodeRole, Smap, Snode};
use uuid::Uuid;

use proxy::core::ic;
use proxy::core::notifs::NotifTable;
use proxy::core::routes::build_router as build_proxy_router;
use proxy::core::state::ProxyState;

use tgt::core::cluster::join_cluster;
use tgt::core::mountpath::MountpathRegistry;
use tgt::core::nlp::NameLockRegistry;
use tgt::core::routes::build_router as build_target_router;
use tgt::core::state::TargetState;
use tgt::core::txn::TxnTable;
use tgt::core::xact::XactRegistry;

pub struct TestServer {
    pub handle: JoinHandle<Result<(), anyhow::Error>>,
    pub shutdown_tx: watch::Sender<bool>,
    pub addr: SocketAddr,
    pub url: String,
}

impl TestServer {
    async fn spawn(app: axum::Router) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let url = format!("http://{}", addr);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let server = Server::from_tcp(listener.into_std()?).serve(app.into_make_service());
            tokio::select! {
                res = server => res.map_err(anyhow::Error::from),
                _ = shutdown_rx.changed() => Ok(()),
            }
        });

        Ok(TestServer {
            handle,
            shutdown_tx,
            addr,
            url,
        })
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
        let _ = self.handle.await;
        Ok(())
    }
}

pub struct TestProxy {
    pub server: TestServer,
    pub state: ProxyState,
    pub data_dir: TempDir,
}

impl TestProxy {
    /// Bootstrap a fresh single-proxy cluster; this proxy is the primary.
    pub async fn primary(id: &str, ic_size: usize) -> Result<Self> {
        Self::start(id, ic_size, None).await
    }

    /// Start a proxy that joins an existing cluster via its primary.
    pub async fn join(id: &str, ic_size: usize, primary_url: &str) -> Result<Self> {
        Self::start(id, ic_size, Some(primary_url.to_string())).await
    }

    async fn start(id: &str, ic_size: usize, join_url: Option<String>) -> Result<Self> {
        let data_dir = TempDir::new()?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let url = format!("http://{}", addr);

        let snode = Snode {
            id: id.to_string(),
            role: NodeRole::Proxy,
            public_url: url.clone(),
            intra_control_url: url.clone(),
        };

        let state = ProxyState {
            http_client: Client::builder().timeout(Duration::from_secs(10)).build()?,
            snode: Arc::new(snode.clone()),
            smap: Arc::new(SmapOwner::new(
                Smap::default(),
                data_dir.path().join(SMAP_FNAME),
            )),
            bmd: Arc::new(BmdOwner::new(
                Bmd::default(),
                data_dir.path().join(BMD_FNAME),
            )),
            notifs: Arc::new(NotifTable::new()),
            ic_size,
            txn_timeout_ms: 5000,
            bmd_mutex: Arc::new(tokio::sync::Mutex::new(())),
            smap_mutex: Arc::new(tokio::sync::Mutex::new(())),
            keepalive: Arc::new(RwLock::new(HashMap::new())),
        };

        let app = build_proxy_router(state.clone());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let server = Server::from_tcp(listener.into_std()?).serve(app.into_make_service());
            tokio::select! {
                res = server => res.map_err(anyhow::Error::from),
                _ = shutdown_rx.changed() => Ok(()),
            }
        });
        let server = TestServer {
            handle,
            shutdown_tx,
            addr,
            url,
        };

        match join_url {
            None => {
                let cluster_uuid = Uuid::new_v4().to_string();
                state
                    .smap
                    .synchronize(Smap::new(cluster_uuid.clone(), snode))?;
                state.bmd.synchronize(Bmd::new(cluster_uuid))?;
            }
            Some(primary_url) => {
                let join_req = JoinRequest {
                    snode: (*state.snode).clone(),
                };
                let resp = state
                    .http_client
                    .post(format!("{}/v1/cluster/join", primary_url))
                    .json(&join_req)
                    .send()
                    .await?;
                anyhow::ensure!(resp.status().is_success(), "join failed: {}", resp.status());
                let jr: JoinResponse = resp.json().await?;
                state.smap.synchronize(jr.smap)?;
                state.bmd.synchronize(jr.bmd)?;
                if state.is_ic_member() {
                    let _ = ic::sync_ic_bundle(&state).await;
                }
            }
        }

        Ok(TestProxy {
            server,
            state,
            data_dir,
        })
    }

    pub fn url(&self) -> &str {
        &self.server.url
    }

    pub async fn shutdown(self) -> Result<()> {
        self.server.shutdown().await
    }
}

pub struct TestTarget {
    pub server: TestServer,
    pub state: TargetState,
    pub data_dir: TempDir,
    pub mountpath_dirs: Vec<PathBuf>,
}

impl TestTarget {
    pub async fn start(id: &str, primary_url: &str, n_mountpaths: usize) -> Result<Self> {
        Self::start_with_capacity(id, primary_url, n_mountpaths, 0).await
    }

    pub async fn start_with_capacity(
        id: &str,
        primary_url: &str,
        n_mountpaths: usize,
        capacity_bytes: u64,
    ) -> Result<Self> {
        let data_dir = TempDir::new()?;
        let mountpath_dirs: Vec<PathBuf> = (0..n_mountpaths)
            .map(|i| data_dir.path().join(format!("mp{}", i)))
            .collect();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let url = format!("http://{}", addr);

        let snode = Snode {
            id: id.to_string(),
            role: NodeRole::Target,
            public_url: url.clone(),
            intra_control_url: url.clone(),
        };

        let bmd = Arc::new(BmdOwner::new(
            Bmd::default(),
            data_dir.path().join(BMD_FNAME),
        ));
        let state = TargetState {
            http_client: Client::builder().timeout(Duration::from_secs(10)).build()?,
            snode: Arc::new(snode),
            smap: Arc::new(SmapOwner::new(
                Smap::default(),
                data_dir.path().join(SMAP_FNAME),
            )),
            bmd: bmd.clone(),
            mountpaths: Arc::new(MountpathRegistry::new(
                mountpath_dirs.clone(),
                capacity_bytes,
                90,
                95,
            )?),
            nlps: Arc::new(NameLockRegistry::new()),
            transactions: Arc::new(TxnTable::new(bmd.subscribe())),
            xactions: Arc::new(XactRegistry::new()),
        };

        let app = build_target_router(state.clone());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let server = Server::from_tcp(listener.into_std()?).serve(app.into_make_service());
            tokio::select! {
                res = server => res.map_err(anyhow::Error::from),
                _ = shutdown_rx.changed() => Ok(()),
            }
        });
        let server = TestServer {
            handle,
            shutdown_tx,
            addr,
            url,
        };

        join_cluster(&state, primary_url).await?;

        Ok(TestTarget {
            server,
            state,
            data_dir,
            mountpath_dirs,
        })
    }

    pub fn url(&self) -> &str {
        &self.server.url
    }

    /// Seed `count` small objects into the bucket on one mountpath.
    pub fn seed_objects(&self, bck: &Bck, mpath_idx: usize, count: usize) -> Result<()> {
        let mpath = &self.state.mountpaths.available()[mpath_idx];
        let root = mpath.bucket_path(bck);
        std::fs::create_dir_all(&root)?;
        for i in 0..count {
            std::fs::write(root.join(format!("obj-{:04}", i)), b"0123456789")?;
        }
        Ok(())
    }

    pub fn count_objects(&self, bck: &Bck, mpath_idx: usize) -> usize {
        let mpath = &self.state.mountpaths.available()[mpath_idx];
        let root = mpath.bucket_path(bck);
        if !root.exists() {
            return 0;
        }
        walkdir::WalkDir::new(&root)
            .into_iter()
            .flatten()
            .filter(|e| e.file_type().is_file())
            .count()
    }

    pub async fn shutdown(self) -> Result<()> {
        self.server.shutdown().await
    }
}

pub async fn start_targets(primary_url: &str, count: usize) -> Result<Vec<TestTarget>> {
    let mut targets = Vec::new();
    for i in 0..count {
        targets.push(TestTarget::start(&format!("t{}", i + 1), primary_url, 2).await?);
    }
    Ok(targets)
}

//
// client helpers
//

pub fn action_msg(action: Action, value: serde_json::Value) -> ActionMsg {
    ActionMsg::new(action, value)
}

pub async fn post_bucket_action(
    client: &Client,
    proxy_url: &str,
    bucket: &str,
    msg: &ActionMsg,
) -> Result<(reqwest::StatusCode, String)> {
    let resp = client
        .post(format!("{}/v1/buckets/{}", proxy_url, bucket))
        .json(msg)
        .send()
        .await?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Ok((status, body))
}

pub async fn bucket_action_uuid(
    client: &Client,
    proxy_url: &str,
    bucket: &str,
    msg: &ActionMsg,
) -> Result<String> {
    let (status, body) = post_bucket_action(client, proxy_url, bucket, msg).await?;
    anyhow::ensure!(status.is_success(), "action failed: {} ({})", status, body);
    let resp: TxnResp = serde_json::from_str(&body)?;
    Ok(resp.uuid)
}

pub async fn get_smap(client: &Client, url: &str) -> Result<Smap> {
    Ok(client
        .get(format!("{}/v1/cluster/smap", url))
        .send()
        .await?
        .json()
        .await?)
}

pub async fn get_bmd(client: &Client, url: &str) -> Result<Bmd> {
    Ok(client
        .get(format!("{}/v1/cluster/bmd", url))
        .send()
        .await?
        .json()
        .await?)
}

pub async fn xact_status(
    client: &Client,
    proxy_url: &str,
    uuid: &str,
) -> Result<(reqwest::StatusCode, Option<XactStatusResp>)> {
    let resp = client
        .get(format!("{}/v1/xactions", proxy_url))
        .query(&[("id", uuid)])
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        return Ok((status, None));
    }
    let body: XactStatusResp = resp.json().await?;
    Ok((status, Some(body)))
}

pub async fn wait_until<F, Fut>(timeout_ms: u64, mut check_fn: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    loop {
        if check_fn().await? {
            return Ok(());
        }
        if start.elapsed() > timeout {
            anyhow::bail!("wait_until timed out after {}ms", timeout_ms);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
