use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use common::owner::{BmdOwner, SmapOwner};
use common::smap::Snode;

use crate::core::notifs::NotifTable;

#[derive(Clone)]
pub struct ProxyState {
    pub http_client: reqwest::Client,
    pub snode: Arc<Snode>,
    pub smap: Arc<SmapOwner>,
    pub bmd: Arc<BmdOwner>,
    pub notifs: Arc<NotifTable>,

    pub ic_size: usize,
    pub txn_timeout_ms: u64,

    /// Single-writer gates for primary-side metadata mutations.
    pub bmd_mutex: Arc<tokio::sync::Mutex<()>>,
    pub smap_mutex: Arc<tokio::sync::Mutex<()>>,

    /// Last keepalive per node, wall-clock ms.
    pub keepalive: Arc<RwLock<HashMap<String, i128>>>,
}

impl ProxyState {
    pub fn is_primary(&self) -> bool {
        self.smap.get().is_primary(&self.snode.id)
    }

    pub fn is_ic_member(&self) -> bool {
        self.smap.get().is_ic(&self.snode.id)
    }
}
