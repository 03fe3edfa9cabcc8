//! PostgreSQL implementation of the import store

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::db::queries;
use crate::services::accrual_import::store::{AccrualStore, StoreTx, SupersedeKey};
use crate::services::accrual_import::StoreCapabilities;
use crate::types::{
    AccrualWrite, MarketLocation, MarketLocationType, MarketSpace, NewMarketSpace,
    NewTenant, NewTenantAccrual, SpacePatch, Tenant,
};

/// Store backed by a connection pool; every run gets its own transaction
#[derive(Clone)]
pub struct PgAccrualStore {
    pool: PgPool,
}

impl PgAccrualStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccrualStore for PgAccrualStore {
    type Tx = PgStoreTx;

    async fn begin(&self) -> Result<PgStoreTx> {
        let tx = self.pool.begin().await?;
        Ok(PgStoreTx { tx, capabilities: None })
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
    capabilities: Option<StoreCapabilities>,
}

impl PgStoreTx {
    /// Capabilities are introspected once per transaction
    async fn caps(&mut self) -> Result<StoreCapabilities> {
        if let Some(caps) = self.capabilities {
            return Ok(caps);
        }
        let caps = queries::schema::load_capabilities(&mut self.tx).await?;
        self.capabilities = Some(caps);
        Ok(caps)
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn capabilities(&mut self) -> Result<StoreCapabilities> {
        self.caps().await
    }

    async fn market_exists(&mut self, market_id: i64) -> Result<bool> {
        queries::market::market_exists(&mut self.tx, market_id).await
    }

    async fn find_tenant(&mut self, market_id: i64, name: &str) -> Result<Option<Tenant>> {
        queries::tenant::find_tenant(&mut self.tx, market_id, name).await
    }

    async fn create_tenant(&mut self, tenant: &NewTenant) -> Result<Tenant> {
        queries::tenant::create_tenant(&mut self.tx, tenant).await
    }

    async fn find_space(&mut self, market_id: i64, place_code: &str) -> Result<Option<MarketSpace>> {
        let caps = self.caps().await?;
        queries::space::find_space(&mut self.tx, &caps, market_id, place_code).await
    }

    async fn create_space(&mut self, space: &NewMarketSpace) -> Result<MarketSpace> {
        let caps = self.caps().await?;
        queries::space::create_space(&mut self.tx, &caps, space).await
    }

    async fn update_space(&mut self, space_id: i64, patch: &SpacePatch) -> Result<()> {
        let caps = self.caps().await?;
        queries::space::update_space(&mut self.tx, &caps, space_id, patch).await
    }

    async fn find_location_type(&mut self, market_id: i64, code: &str) -> Result<Option<MarketLocationType>> {
        queries::location::find_location_type(&mut self.tx, market_id, code).await
    }

    async fn create_location_type(&mut self, market_id: i64, code: &str, name: &str) -> Result<MarketLocationType> {
        queries::location::create_location_type(&mut self.tx, market_id, code, name).await
    }

    async fn rename_location_type(&mut self, location_type_id: i64, name: &str) -> Result<()> {
        queries::location::rename_location_type(&mut self.tx, location_type_id, name).await
    }

    async fn find_location(&mut self, market_id: i64, code: &str) -> Result<Option<MarketLocation>> {
        queries::location::find_location(&mut self.tx, market_id, code).await
    }

    async fn create_location(
        &mut self,
        market_id: i64,
        location_type_id: i64,
        code: &str,
        name: &str,
    ) -> Result<MarketLocation> {
        queries::location::create_location(&mut self.tx, market_id, location_type_id, code, name).await
    }

    async fn upsert_accrual(&mut self, accrual: &NewTenantAccrual) -> Result<AccrualWrite> {
        let caps = self.caps().await?;
        queries::accrual::upsert_accrual(&mut self.tx, &caps, accrual).await
    }

    async fn supersede_accruals(&mut self, key: &SupersedeKey<'_>) -> Result<u64> {
        queries::accrual::supersede_accruals(&mut self.tx, key).await
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
