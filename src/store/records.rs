//! Typed record access on top of [`LedgerDb`].

use serde::de::DeserializeOwned;

use crate::assets::{
    AssetHeader, AssetType, ComputePlan, ComputePlanWorkerState, GenericTuple, Tuple,
};
use crate::error::{Error, Result};
use crate::store::db::LedgerDb;

impl LedgerDb<'_> {
    fn asset_type_of(&self, key: &str) -> Result<(AssetType, Vec<u8>)> {
        let bytes = self.get_raw(key)?;
        let header: AssetHeader = serde_json::from_slice(&bytes)
            .map_err(|_| Error::NotFound(format!("no asset with key {}", key)))?;
        Ok((header.asset_type, bytes))
    }

    fn get_typed<T: DeserializeOwned>(&self, key: &str, expected: AssetType) -> Result<T> {
        let (asset_type, bytes) = self.asset_type_of(key)?;
        if asset_type != expected {
            return Err(Error::NotFound(format!(
                "no {} with key {} (found {})",
                expected, key, asset_type
            )));
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Internal(format!("corrupt {} {}: {}", expected, key, e)))
    }

    /// Load a tuple of any kind.
    pub fn get_tuple(&self, key: &str) -> Result<Tuple> {
        let (asset_type, _) = self.asset_type_of(key)?;
        match asset_type {
            AssetType::Traintuple => self.get_typed(key, asset_type).map(Tuple::Train),
            AssetType::CompositeTraintuple => {
                self.get_typed(key, asset_type).map(Tuple::Composite)
            }
            AssetType::Aggregatetuple => self.get_typed(key, asset_type).map(Tuple::Aggregate),
            AssetType::Testtuple => self.get_typed(key, asset_type).map(Tuple::Test),
            other => Err(Error::NotFound(format!(
                "no tuple with key {} (found {})",
                key, other
            ))),
        }
    }

    /// Load only the fields shared by every tuple kind.
    pub fn get_generic_tuple(&self, key: &str) -> Result<GenericTuple> {
        let (asset_type, bytes) = self.asset_type_of(key)?;
        if !asset_type.is_tuple() {
            return Err(Error::NotFound(format!(
                "no tuple with key {} (found {})",
                key, asset_type
            )));
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Internal(format!("corrupt tuple {}: {}", key, e)))
    }

    pub fn put_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let key = tuple.key().to_string();
        match tuple {
            Tuple::Train(t) => self.put(&key, t),
            Tuple::Composite(t) => self.put(&key, t),
            Tuple::Aggregate(t) => self.put(&key, t),
            Tuple::Test(t) => self.put(&key, t),
        }
    }

    /// Create a tuple; `Conflict` if the key is already committed.
    pub fn add_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let key = tuple.key().to_string();
        match tuple {
            Tuple::Train(t) => self.add(&key, t),
            Tuple::Composite(t) => self.add(&key, t),
            Tuple::Aggregate(t) => self.add(&key, t),
            Tuple::Test(t) => self.add(&key, t),
        }
    }

    pub fn get_compute_plan(&self, key: &str) -> Result<ComputePlan> {
        self.get_typed(key, AssetType::ComputePlan)
    }

    pub fn put_compute_plan(&mut self, plan: &ComputePlan) -> Result<()> {
        self.put(&plan.key, plan)
    }

    pub fn get_worker_state(&self, key: &str) -> Result<ComputePlanWorkerState> {
        self.get_typed(key, AssetType::ComputePlanWorkerState)
    }

    pub fn put_worker_state(&mut self, state: &ComputePlanWorkerState) -> Result<()> {
        self.put(&state.key, state)
    }
}
