//! Process-wide connection pools, one per data source and principal.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use parking_lot::RwLock;
use postgres_native_tls::MakeTlsConnector;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_postgres::NoTls;

use crate::config::PoolSettings;

use super::datasource::DataSource;
use super::driver::{ConnectionProvider, DriverConnection};
use super::error::ExecError;
use super::params::Principal;
use super::postgres::PgConnection;

static FACTORY: RwLock<Option<Arc<PoolFactory>>> = parking_lot::const_rwlock(None);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub data_source: String,
    pub principal: Option<String>,
}

impl PoolKey {
    pub fn new(data_source: &DataSource, principal: Option<&Principal>) -> Self {
        Self {
            data_source: data_source.identity().to_string(),
            principal: principal.map(|p| p.user.clone()),
        }
    }
}

struct PoolEntry {
    pool: Pool,
    tls: Option<MakeTlsConnector>,
}

/// Creates pools on first use and hands out providers backed by them.
pub struct PoolFactory {
    settings: PoolSettings,
    pools: RwLock<HashMap<PoolKey, Arc<PoolEntry>>>,
}

impl PoolFactory {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// The shared factory. The first caller's settings win.
    pub fn global(settings: &PoolSettings) -> Arc<PoolFactory> {
        if let Some(factory) = FACTORY.read().as_ref() {
            return factory.clone();
        }
        let mut slot = FACTORY.write();
        if let Some(factory) = slot.as_ref() {
            return factory.clone();
        }
        let factory = Arc::new(PoolFactory::new(settings.clone()));
        *slot = Some(factory.clone());
        factory
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    /// Connection provider for the data source, creating its pool if needed.
    pub fn provider(
        &self,
        data_source: &DataSource,
        principal: Option<&Principal>,
    ) -> Result<PostgresProvider, ExecError> {
        let key = PoolKey::new(data_source, principal);
        let entry = self.entry(&key, data_source)?;
        Ok(PostgresProvider {
            data_source: key.data_source,
            entry,
        })
    }

    fn entry(&self, key: &PoolKey, data_source: &DataSource) -> Result<Arc<PoolEntry>, ExecError> {
        if let Some(entry) = self.pools.read().get(key) {
            return Ok(entry.clone());
        }
        let mut pools = self.pools.write();
        if let Some(entry) = pools.get(key) {
            return Ok(entry.clone());
        }
        let entry = Arc::new(self.build(data_source)?);
        tracing::debug!(
            data_source = %key.data_source,
            principal = ?key.principal,
            max_size = entry.pool.status().max_size,
            "created connection pool"
        );
        pools.insert(key.clone(), entry.clone());
        Ok(entry)
    }

    fn build(&self, data_source: &DataSource) -> Result<PoolEntry, ExecError> {
        let fail = |e: &dyn std::fmt::Display| ExecError::connection(data_source.identity(), e);

        if !matches!(data_source.driver.as_str(), "postgres" | "postgresql") {
            return Err(fail(&format!("no driver registered for '{}'", data_source.driver)));
        }

        let mut pg_config = data_source
            .connection_string()
            .parse::<tokio_postgres::Config>()
            .map_err(|e| fail(&e))?;
        if data_source.url.is_some() && !data_source.password.is_empty() {
            pg_config.password(&data_source.password);
        }
        pg_config.options(&format!(
            "-c default_transaction_isolation={}",
            data_source.isolation.as_sql().replace(' ', "\\ ")
        ));

        let mut manager_config = ManagerConfig::default();
        manager_config.recycling_method = RecyclingMethod::Fast;
        let tls = data_source.tls_connector().map_err(|e| fail(&e))?;
        let manager = match &tls {
            Some(tls) => Manager::from_config(pg_config, tls.clone(), manager_config),
            None => Manager::from_config(pg_config, NoTls, manager_config),
        };

        let pool = Pool::builder(manager)
            .max_size(data_source.pool_size.unwrap_or(self.settings.max_size))
            .wait_timeout(Some(self.settings.wait_timeout()))
            .create_timeout(Some(self.settings.create_timeout()))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| fail(&e))?;

        Ok(PoolEntry { pool, tls })
    }
}

/// Provider backed by a PostgreSQL pool.
pub struct PostgresProvider {
    data_source: String,
    entry: Arc<PoolEntry>,
}

#[async_trait]
impl ConnectionProvider for PostgresProvider {
    async fn acquire(&self) -> Result<Box<dyn DriverConnection>, ExecError> {
        let client = self
            .entry
            .pool
            .get()
            .await
            .map_err(|e| ExecError::connection(self.data_source.clone(), e))?;
        Ok(Box::new(PgConnection::new(client, self.entry.tls.clone())))
    }
}
