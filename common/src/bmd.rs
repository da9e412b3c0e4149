use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bck::{Bck, BucketProps};
use crate::error::ApiError;

/// Versioned cluster-wide bucket metadata. Every mutation produces a new Bmd
/// whose version is exactly one above the source; there is no in-place or
/// partial mutation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Bmd {
    pub version: u64,
    pub uuid: String,
    pub buckets: BTreeMap<String, BucketProps>,
}

impl Bmd {
    pub fn new(uuid: String) -> Self {
        Self {
            version: 1,
            uuid,
            buckets: BTreeMap::new(),
        }
    }

    pub fn get(&self, bck: &Bck) -> Option<&BucketProps> {
        self.buckets.get(&bck.uname())
    }

    pub fn exists(&self, bck: &Bck) -> bool {
        self.buckets.contains_key(&bck.uname())
    }

    pub fn add(&self, bck: &Bck, props: BucketProps) -> Result<Bmd, ApiError> {
        if self.exists(bck) {
            return Err(ApiError::BucketAlreadyExists(bck.to_string()));
        }
        let mut next = self.clone();
        next.buckets.insert(bck.uname(), props);
        next.version += 1;
        Ok(next)
    }

    pub fn set(&self, bck: &Bck, props: BucketProps) -> Result<Bmd, ApiError> {
        if !self.exists(bck) {
            return Err(ApiError::BucketDoesNotExist(bck.to_string()));
        }
        let mut next = self.clone();
        next.buckets.insert(bck.uname(), props);
        next.version += 1;
        Ok(next)
    }

    pub fn del(&self, bck: &Bck) -> Result<Bmd, ApiError> {
        if !self.exists(bck) {
            return Err(ApiError::BucketDoesNotExist(bck.to_string()));
        }
        let mut next = self.clone();
        next.buckets.remove(&bck.uname());
        next.version += 1;
        Ok(next)
    }

    pub fn rename(&self, from: &Bck, to: &Bck) -> Result<Bmd, ApiError> {
        if !self.exists(from) {
            return Err(ApiError::BucketDoesNotExist(from.to_string()));
        }
        if self.exists(to) {
            return Err(ApiError::BucketAlreadyExists(to.to_string()));
        }
        let mut next = self.clone();
        let props = next.buckets.remove(&from.uname()).unwrap_or_default();
        next.buckets.insert(to.uname(), props);
        next.version += 1;
        Ok(next)
    }
}
