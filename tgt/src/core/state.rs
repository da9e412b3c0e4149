use std::sync::Arc;

use common::owner::{BmdOwner, SmapOwner};
use common::smap::Snode;

use crate::core::mountpath::MountpathRegistry;
use crate::core::nlp::NameLockRegistry;
use crate::core::notif::NotifCtx;
use crate::core::txn::TxnTable;
use crate::core::xact::XactRegistry;

#[derive(Clone)]
pub struct TargetState {
    pub http_client: reqwest::Client,
    pub snode: Arc<Snode>,
    pub smap: Arc<SmapOwner>,
    pub bmd: Arc<BmdOwner>,
    pub mountpaths: Arc<MountpathRegistry>,
    pub nlps: Arc<NameLockRegistry>,
    pub transactions: Arc<TxnTable>,
    pub xactions: Arc<XactRegistry>,
}

impl TargetState {
    pub fn notif_ctx(&self) -> NotifCtx {
        NotifCtx {
            http_client: self.http_client.clone(),
            smap: self.smap.clone(),
            node_id: self.snode.id.clone(),
        }
    }
}
