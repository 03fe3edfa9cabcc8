//! Storage abstraction for the import pipeline
//!
//! The pipeline talks to storage only through [`StoreTx`], one transaction
//! per run. Two implementations exist:
//! - `PgAccrualStore` (db module) for production
//! - [`MemoryStore`] for offline file checks and tests

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;

use crate::types::{
    AccrualWrite, MarketLocation, MarketLocationType, MarketSpace, NewMarketSpace,
    NewTenant, NewTenantAccrual, SpacePatch, Tenant,
};

/// Optional schema features, resolved once at the start of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// Location type/location tables and `market_spaces.location_id`
    pub locations: bool,
    /// `market_spaces.activity_type`
    pub space_activity_type: bool,
    /// `market_spaces.tenant_id`
    pub space_tenant_link: bool,
    /// `tenant_accruals.source_payload`
    pub accrual_source_payload: bool,
    /// `tenant_accruals.superseded_at`
    pub accrual_supersession: bool,
}

impl StoreCapabilities {
    pub fn full() -> Self {
        Self {
            locations: true,
            space_activity_type: true,
            space_tenant_link: true,
            accrual_source_payload: true,
            accrual_supersession: true,
        }
    }
}

/// Logical identity of an accrual used to retire stale facts
#[derive(Debug, Clone)]
pub struct SupersedeKey<'a> {
    pub market_id: i64,
    pub period: NaiveDate,
    pub tenant_name: &'a str,
    pub place_code: Option<&'a str>,
    /// Hashes written by the current run; never superseded
    pub keep_hashes: &'a HashSet<String>,
}

/// Storage backend able to open import transactions
#[async_trait]
pub trait AccrualStore: Send + Sync {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Operations available inside one import transaction
#[async_trait]
pub trait StoreTx: Send + Sized {
    async fn capabilities(&mut self) -> Result<StoreCapabilities>;

    async fn market_exists(&mut self, market_id: i64) -> Result<bool>;

    /// Exact, case-sensitive lookup by (market, name)
    async fn find_tenant(&mut self, market_id: i64, name: &str) -> Result<Option<Tenant>>;
    async fn create_tenant(&mut self, tenant: &NewTenant) -> Result<Tenant>;

    /// Lookup by (market, number OR code)
    async fn find_space(&mut self, market_id: i64, place_code: &str) -> Result<Option<MarketSpace>>;
    async fn create_space(&mut self, space: &NewMarketSpace) -> Result<MarketSpace>;
    async fn update_space(&mut self, space_id: i64, patch: &SpacePatch) -> Result<()>;

    async fn find_location_type(&mut self, market_id: i64, code: &str) -> Result<Option<MarketLocationType>>;
    async fn create_location_type(&mut self, market_id: i64, code: &str, name: &str) -> Result<MarketLocationType>;
    async fn rename_location_type(&mut self, location_type_id: i64, name: &str) -> Result<()>;

    async fn find_location(&mut self, market_id: i64, code: &str) -> Result<Option<MarketLocation>>;
    async fn create_location(
        &mut self,
        market_id: i64,
        location_type_id: i64,
        code: &str,
        name: &str,
    ) -> Result<MarketLocation>;

    /// Insert keyed by (market, period, hash) or refresh the volatile fields
    async fn upsert_accrual(&mut self, accrual: &NewTenantAccrual) -> Result<AccrualWrite>;

    /// Stamp older facts of the same logical key; returns how many
    async fn supersede_accruals(&mut self, key: &SupersedeKey<'_>) -> Result<u64>;

    async fn commit(self) -> Result<()>;
    async fn rollback(self) -> Result<()>;
}

// ==========================================================================
// MemoryStore Implementation
// ==========================================================================

/// Accrual row as kept by [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct StoredAccrual {
    pub id: i64,
    pub fact: NewTenantAccrual,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub superseded_at: Option<DateTime<Utc>>,
}

/// Full content of a [`MemoryStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub markets: BTreeSet<i64>,
    pub tenants: Vec<Tenant>,
    pub spaces: Vec<MarketSpace>,
    pub location_types: Vec<MarketLocationType>,
    pub locations: Vec<MarketLocation>,
    pub accruals: Vec<StoredAccrual>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn space(&self, market_id: i64, code: &str) -> Option<&MarketSpace> {
        self.spaces.iter().find(|s| {
            s.market_id == market_id
                && (s.number.as_deref() == Some(code) || s.code.as_deref() == Some(code))
        })
    }

    pub fn space_mut(&mut self, space_id: i64) -> Option<&mut MarketSpace> {
        self.spaces.iter_mut().find(|s| s.id == space_id)
    }

    pub fn tenant(&self, market_id: i64, name: &str) -> Option<&Tenant> {
        self.tenants.iter().find(|t| t.market_id == market_id && t.name == name)
    }
}

/// In-memory store. Transactions work on a copy of the state that replaces
/// the shared state on commit.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    capabilities: StoreCapabilities,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capabilities(StoreCapabilities::full())
    }

    pub fn with_capabilities(capabilities: StoreCapabilities) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            capabilities,
        }
    }

    pub fn add_market(&self, market_id: i64) {
        self.state.lock().markets.insert(market_id);
    }

    /// Copy of the committed state
    pub fn snapshot(&self) -> MemoryState {
        self.state.lock().clone()
    }

    /// Edit committed state directly, as an operator would through the UI
    pub fn edit<F: FnOnce(&mut MemoryState)>(&self, f: F) {
        f(&mut self.state.lock());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccrualStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        Ok(MemoryTx {
            shared: Arc::clone(&self.state),
            working: self.state.lock().clone(),
            capabilities: self.capabilities,
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Transaction of a [`MemoryStore`]
pub struct MemoryTx {
    shared: Arc<Mutex<MemoryState>>,
    working: MemoryState,
    capabilities: StoreCapabilities,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn capabilities(&mut self) -> Result<StoreCapabilities> {
        Ok(self.capabilities)
    }

    async fn market_exists(&mut self, market_id: i64) -> Result<bool> {
        Ok(self.working.markets.contains(&market_id))
    }

    async fn find_tenant(&mut self, market_id: i64, name: &str) -> Result<Option<Tenant>> {
        Ok(self.working.tenant(market_id, name).cloned())
    }

    async fn create_tenant(&mut self, tenant: &NewTenant) -> Result<Tenant> {
        if self.working.tenant(tenant.market_id, &tenant.name).is_some() {
            bail!("duplicate tenant '{}' in market {}", tenant.name, tenant.market_id);
        }
        let created = Tenant {
            id: self.working.next_id(),
            market_id: tenant.market_id,
            name: tenant.name.clone(),
            legal_form_hint: tenant.legal_form_hint,
            is_active: true,
        };
        self.working.tenants.push(created.clone());
        Ok(created)
    }

    async fn find_space(&mut self, market_id: i64, place_code: &str) -> Result<Option<MarketSpace>> {
        Ok(self.working.space(market_id, place_code).cloned())
    }

    async fn create_space(&mut self, space: &NewMarketSpace) -> Result<MarketSpace> {
        if self.working.space(space.market_id, &space.code).is_some() {
            bail!("duplicate space '{}' in market {}", space.code, space.market_id);
        }
        let created = MarketSpace {
            id: self.working.next_id(),
            market_id: space.market_id,
            number: Some(space.code.clone()),
            code: Some(space.code.clone()),
            area: space.area,
            status: space.status,
            display_name: Some(space.display_name.clone()),
            activity_type: space.activity_type.clone(),
            location_id: space.location_id,
            tenant_id: None,
        };
        self.working.spaces.push(created.clone());
        Ok(created)
    }

    async fn update_space(&mut self, space_id: i64, patch: &SpacePatch) -> Result<()> {
        match self.working.space_mut(space_id) {
            Some(space) => {
                patch.apply_to(space);
                Ok(())
            }
            None => bail!("space {} not found", space_id),
        }
    }

    async fn find_location_type(&mut self, market_id: i64, code: &str) -> Result<Option<MarketLocationType>> {
        Ok(self
            .working
            .location_types
            .iter()
            .find(|t| t.market_id == market_id && t.code == code)
            .cloned())
    }

    async fn create_location_type(&mut self, market_id: i64, code: &str, name: &str) -> Result<MarketLocationType> {
        let created = MarketLocationType {
            id: self.working.next_id(),
            market_id,
            code: code.to_string(),
            name: name.to_string(),
        };
        self.working.location_types.push(created.clone());
        Ok(created)
    }

    async fn rename_location_type(&mut self, location_type_id: i64, name: &str) -> Result<()> {
        if let Some(t) = self
            .working
            .location_types
            .iter_mut()
            .find(|t| t.id == location_type_id)
        {
            t.name = name.to_string();
        }
        Ok(())
    }

    async fn find_location(&mut self, market_id: i64, code: &str) -> Result<Option<MarketLocation>> {
        Ok(self
            .working
            .locations
            .iter()
            .find(|l| l.market_id == market_id && l.code == code)
            .cloned())
    }

    async fn create_location(
        &mut self,
        market_id: i64,
        location_type_id: i64,
        code: &str,
        name: &str,
    ) -> Result<MarketLocation> {
        let created = MarketLocation {
            id: self.working.next_id(),
            market_id,
            location_type_id,
            code: code.to_string(),
            name: name.to_string(),
        };
        self.working.locations.push(created.clone());
        Ok(created)
    }

    async fn upsert_accrual(&mut self, accrual: &NewTenantAccrual) -> Result<AccrualWrite> {
        let now = Utc::now();
        let existing = self.working.accruals.iter_mut().find(|a| {
            a.fact.market_id == accrual.market_id
                && a.fact.period == accrual.period
                && a.fact.content_hash == accrual.content_hash
        });

        if let Some(stored) = existing {
            stored.updated_at = now;
            stored.fact.status = accrual.status;
            // a re-imported fact is current again
            stored.superseded_at = None;
            return Ok(AccrualWrite::Updated);
        }

        let id = self.working.next_id();
        let mut fact = accrual.clone();
        if !self.capabilities.accrual_source_payload {
            fact.source_payload = serde_json::Value::Null;
        }
        self.working.accruals.push(StoredAccrual {
            id,
            fact,
            created_at: now,
            updated_at: now,
            superseded_at: None,
        });
        Ok(AccrualWrite::Inserted)
    }

    async fn supersede_accruals(&mut self, key: &SupersedeKey<'_>) -> Result<u64> {
        let now = Utc::now();
        let mut count = 0;
        for stored in self.working.accruals.iter_mut() {
            let f = &stored.fact;
            if f.market_id == key.market_id
                && f.period == key.period
                && f.tenant_name == key.tenant_name
                && f.place_code.as_deref() == key.place_code
                && stored.superseded_at.is_none()
                && !key.keep_hashes.contains(&f.content_hash)
            {
                stored.superseded_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn commit(self) -> Result<()> {
        *self.shared.lock() = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
