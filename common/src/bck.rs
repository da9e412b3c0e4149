use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Ais,
    Cloud,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ais => "ais",
            Provider::Cloud => "cloud",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "ais" => Ok(Provider::Ais),
            "cloud" => Ok(Provider::Cloud),
            other => Err(anyhow::anyhow!("unknown bucket provider {:?}", other)),
        }
    }
}

/// Fully-qualified bucket name. Ordering is the canonical lock-acquisition
/// order for multi-bucket operations.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bck {
    pub name: String,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub ns: String,
}

impl Bck {
    pub fn ais(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: Provider::Ais,
            ns: String::new(),
        }
    }

    pub fn cloud(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: Provider::Cloud,
            ns: String::new(),
        }
    }

    pub fn from_query(name: &str, provider: Option<&str>, ns: Option<&str>) -> anyhow::Result<Self> {
        if name.is_empty() {
            return Err(anyhow::anyhow!("bucket name cannot be empty"));
        }
        let provider = match provider {
            Some(p) if !p.is_empty() => Provider::parse(p)?,
            _ => Provider::Ais,
        };
        Ok(Self {
            name: name.to_string(),
            provider,
            ns: ns.unwrap_or_default().to_string(),
        })
    }

    /// Unique name: the key under which the bucket appears in the BMD and the
    /// name-lock registry.
    pub fn uname(&self) -> String {
        format!("{}/{}/{}", self.provider.as_str(), self.ns, self.name)
    }
}

impl fmt::Display for Bck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ns.is_empty() {
            write!(f, "{}://{}", self.provider.as_str(), self.name)
        } else {
            write!(f, "{}://{}/{}", self.provider.as_str(), self.ns, self.name)
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MirrorConf {
    pub enabled: bool,
    pub copies: u32,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EcConf {
    pub enabled: bool,
    pub data_slices: u32,
    pub parity_slices: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BucketProps {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub mirror: MirrorConf,
    #[serde(default)]
    pub ec: EcConf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_bck: Option<Bck>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, String>,
}

impl BucketProps {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            mirror: MirrorConf {
                enabled: false,
                copies: 1,
            },
            ..Default::default()
        }
    }
}
