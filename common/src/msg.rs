use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bmd::Bmd;
use crate::smap::{Smap, Snode};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Action {
    #[serde(rename = "create-bucket")]
    CreateBucket,
    #[serde(rename = "register-cloud-bucket")]
    RegisterCloudBucket,
    #[serde(rename = "rename-bucket")]
    RenameBucket,
    #[serde(rename = "copy-bucket")]
    CopyBucket,
    #[serde(rename = "set-bprops")]
    SetBucketProps,
    #[serde(rename = "reset-bprops")]
    ResetBucketProps,
    #[serde(rename = "make-n-copies")]
    MakeNCopies,
    #[serde(rename = "ec-encode")]
    EcEncode,
    #[serde(rename = "merge-ownership-table")]
    MergeOwnershipTbl,
    #[serde(rename = "listen-to-notif")]
    ListenToNotif,
    #[serde(rename = "rebalance")]
    Rebalance,
    #[serde(rename = "resilver")]
    Resilver,
    #[serde(rename = "put-copies")]
    PutCopies,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateBucket => "create-bucket",
            Action::RegisterCloudBucket => "register-cloud-bucket",
            Action::RenameBucket => "rename-bucket",
            Action::CopyBucket => "copy-bucket",
            Action::SetBucketProps => "set-bprops",
            Action::ResetBucketProps => "reset-bprops",
            Action::MakeNCopies => "make-n-copies",
            Action::EcEncode => "ec-encode",
            Action::MergeOwnershipTbl => "merge-ownership-table",
            Action::ListenToNotif => "listen-to-notif",
            Action::Rebalance => "rebalance",
            Action::Resilver => "resilver",
            Action::PutCopies => "put-copies",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxnPhase {
    Begin,
    Commit,
    Abort,
}

impl TxnPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnPhase::Begin => "begin",
            TxnPhase::Commit => "commit",
            TxnPhase::Abort => "abort",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "begin" => Ok(TxnPhase::Begin),
            "commit" => Ok(TxnPhase::Commit),
            "abort" => Ok(TxnPhase::Abort),
            other => Err(anyhow::anyhow!("unknown transaction phase {:?}", other)),
        }
    }
}

impl fmt::Display for TxnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control-plane action message: carried by every bucket-mutating request and
/// by IC traffic. `value` is the per-action payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionMsg {
    pub action: Action,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub smap_version: u64,
    #[serde(default)]
    pub bmd_version: u64,
    #[serde(default)]
    pub rmd_version: u64,
}

impl ActionMsg {
    pub fn new(action: Action, value: serde_json::Value) -> Self {
        Self {
            action,
            uuid: String::new(),
            value,
            smap_version: 0,
            bmd_version: 0,
            rmd_version: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct XactStats {
    pub objects: u64,
    pub bytes: u64,
}

/// Per-xaction termination event, posted by a target to interested proxies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotifMsg {
    pub uuid: String,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(default)]
    pub stats: XactStats,
    pub when_terminal: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct XactStatusResp {
    pub uuid: String,
    pub finished: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(default)]
    pub stats: XactStats,
}

/// Metasync payload: the primary replicates whichever of the two changed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetasyncBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smap: Option<Smap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bmd: Option<Bmd>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinRequest {
    pub snode: Snode,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinResponse {
    pub smap: Smap,
    pub bmd: Bmd,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeepaliveMsg {
    pub node_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxnResp {
    pub uuid: String,
}
