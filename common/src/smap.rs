use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::ApiError;

const N_TOP_BYTES_FOR_SCORE: usize = 16;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Proxy,
    Target,
}

/// Cluster node descriptor. Equality and hashing are by stable node ID.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snode {
    pub id: String,
    pub role: NodeRole,
    pub public_url: String,
    pub intra_control_url: String,
}

impl PartialEq for Snode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Snode {}

impl Hash for Snode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Snode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            NodeRole::Proxy => write!(f, "p[{}]", self.id),
            NodeRole::Target => write!(f, "t[{}]", self.id),
        }
    }
}

/// Versioned cluster map: membership, the primary proxy, and the IC subset.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Smap {
    pub version: u64,
    pub uuid: String,
    pub pmap: BTreeMap<String, Snode>,
    pub tmap: BTreeMap<String, Snode>,
    pub primary_id: String,
    pub ic: BTreeSet<String>,
}

impl Smap {
    pub fn new(uuid: String, primary: Snode) -> Self {
        let mut pmap = BTreeMap::new();
        let primary_id = primary.id.clone();
        let mut ic = BTreeSet::new();
        ic.insert(primary_id.clone());
        pmap.insert(primary_id.clone(), primary);
        Self {
            version: 1,
            uuid,
            pmap,
            tmap: BTreeMap::new(),
            primary_id,
            ic,
        }
    }

    pub fn get_proxy(&self, id: &str) -> Option<&Snode> {
        self.pmap.get(id)
    }

    pub fn get_target(&self, id: &str) -> Option<&Snode> {
        self.tmap.get(id)
    }

    pub fn get_node(&self, id: &str) -> Option<&Snode> {
        self.pmap.get(id).or_else(|| self.tmap.get(id))
    }

    pub fn primary(&self) -> Option<&Snode> {
        self.pmap.get(&self.primary_id)
    }

    pub fn is_primary(&self, id: &str) -> bool {
        self.primary_id == id
    }

    pub fn is_ic(&self, id: &str) -> bool {
        self.ic.contains(id)
    }

    /// The IC member all others bootstrap their ownership table from.
    /// Deterministic: the lexicographically-first member ID.
    pub fn oldest_ic(&self) -> Option<&Snode> {
        self.ic.iter().next().and_then(|id| self.get_proxy(id))
    }

    pub fn str_ic(&self, self_id: &str) -> String {
        let members: Vec<&str> = self.ic.iter().map(|s| s.as_str()).collect();
        format!(
            "IC[{}]{}",
            members.join(","),
            if self.is_ic(self_id) { "+self" } else { "" }
        )
    }

    /// All nodes (proxies and targets) except the given one.
    pub fn nodes_except(&self, id: &str) -> Vec<Snode> {
        self.pmap
            .values()
            .chain(self.tmap.values())
            .filter(|n| n.id != id)
            .cloned()
            .collect()
    }

    pub fn targets(&self) -> Vec<Snode> {
        self.tmap.values().cloned().collect()
    }
}

fn hrw_score(key: &str, node_id: &str) -> u128 {
    let mut h = blake3::Hasher::new();
    h.update(key.as_bytes());
    h.update(node_id.as_bytes());

    let hash = h.finalize();
    let mut score_bytes = [0u8; N_TOP_BYTES_FOR_SCORE];
    score_bytes.copy_from_slice(&hash.as_bytes()[0..N_TOP_BYTES_FOR_SCORE]);
    u128::from_be_bytes(score_bytes)
}

/// Rendezvous-hash the key over the IC members; every node computes the same
/// owner for the same (Smap, key) pair.
pub fn hrw_ic<'a>(smap: &'a Smap, key: &str) -> Result<&'a Snode, ApiError> {
    smap.ic
        .iter()
        .filter_map(|id| smap.get_proxy(id))
        .max_by_key(|n| hrw_score(key, &n.id))
        .ok_or_else(|| ApiError::Any(anyhow::anyhow!("cluster map has an empty IC")))
}
