//! In-memory call registry for one asset class
//!
//! Calls are kept in insertion order and are never removed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

use crate::types::{AssetClass, Call, CallRequest, Snapshot};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{asset_class} call for {asset_id} already exists")]
    Duplicate {
        asset_class: AssetClass,
        asset_id: String,
    },

    #[error("{asset_id} has no usable baseline price ({price})")]
    InvalidBaseline { asset_id: String, price: Decimal },

    #[error("call belongs to {found}, registry holds {expected}")]
    WrongAssetClass {
        expected: AssetClass,
        found: AssetClass,
    },
}

#[derive(Debug)]
pub struct CallRegistry {
    asset_class: AssetClass,
    calls: Vec<Call>,
    index: HashMap<String, usize>,
}

impl CallRegistry {
    pub fn new(asset_class: AssetClass) -> Self {
        Self {
            asset_class,
            calls: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn asset_class(&self) -> AssetClass {
        self.asset_class
    }

    /// Register a new call with `snapshot` as its baseline
    pub fn create(
        &mut self,
        request: &CallRequest,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> Result<Call, RegistryError> {
        if self.contains(&request.asset_id) {
            return Err(RegistryError::Duplicate {
                asset_class: self.asset_class,
                asset_id: request.asset_id.clone(),
            });
        }
        if !snapshot.has_price() {
            return Err(RegistryError::InvalidBaseline {
                asset_id: request.asset_id.clone(),
                price: snapshot.reference_price,
            });
        }

        let call = Call {
            asset_class: self.asset_class,
            asset_id: request.asset_id.clone(),
            chain: request.chain.clone(),
            display_name: snapshot.display_name.clone(),
            baseline_price: snapshot.reference_price,
            last_price: snapshot.reference_price,
            caller_id: request.caller_id.clone(),
            channel_id: request.channel_id.clone(),
            created_at: now,
            last_update: now,
            achieved_milestones: BTreeSet::new(),
            market_url: snapshot.market_url.clone(),
            image_url: snapshot.image_url.clone(),
        };
        self.push(call.clone());
        Ok(call)
    }

    /// Insert an already-built call, e.g. one restored from the journal
    pub fn insert(&mut self, call: Call) -> Result<(), RegistryError> {
        if call.asset_class != self.asset_class {
            return Err(RegistryError::WrongAssetClass {
                expected: self.asset_class,
                found: call.asset_class,
            });
        }
        if self.contains(&call.asset_id) {
            return Err(RegistryError::Duplicate {
                asset_class: self.asset_class,
                asset_id: call.asset_id,
            });
        }
        if call.baseline_price <= Decimal::ZERO {
            return Err(RegistryError::InvalidBaseline {
                asset_id: call.asset_id,
                price: call.baseline_price,
            });
        }
        self.push(call);
        Ok(())
    }

    fn push(&mut self, call: Call) {
        self.index.insert(call.asset_id.clone(), self.calls.len());
        self.calls.push(call);
    }

    pub fn get(&self, asset_id: &str) -> Option<&Call> {
        self.index.get(asset_id).map(|&i| &self.calls[i])
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        self.index.contains_key(asset_id)
    }

    /// Owned copy of every call, in insertion order
    pub fn list_all(&self) -> Vec<Call> {
        self.calls.clone()
    }

    /// Returns true if `milestone` was newly added
    pub fn record_milestone(&mut self, asset_id: &str, milestone: Decimal) -> bool {
        match self.get_mut(asset_id) {
            Some(call) => call.achieved_milestones.insert(milestone),
            None => false,
        }
    }

    /// Refresh `last_update` (and the last observed price, when known)
    pub fn touch(&mut self, asset_id: &str, price: Option<Decimal>, now: DateTime<Utc>) -> bool {
        let Some(call) = self.get_mut(asset_id) else {
            return false;
        };
        if let Some(price) = price {
            call.last_price = price;
        }
        call.last_update = now;
        true
    }

    fn get_mut(&mut self, asset_id: &str) -> Option<&mut Call> {
        let i = *self.index.get(asset_id)?;
        self.calls.get_mut(i)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
