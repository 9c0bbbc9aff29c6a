use anyhow::{Context, Result};
use postgres_native_tls::MakeTlsConnector;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

use crate::dialect::Product;
use crate::generator::{RenderOptions, TableQualification};

pub const DEFAULT_DRIVER: &str = "postgres";

/// A configured database connection target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    /// Unique name; identifies the data source's pools.
    pub name: String,
    #[serde(default = "default_driver")]
    pub driver: String,
    /// Driver URL, used instead of host/port/database when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Configured product; detected from the server when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub isolation: IsolationLevel,
    /// Overrides the dialect's join style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ansi_join: Option<bool>,
    #[serde(default)]
    pub table_qualification: TableQualification,
    #[serde(default)]
    pub ssl_mode: SslMode,
    /// Skip certificate verification in `prefer`/`require` modes.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// PEM file with an extra root certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<String>,
    /// Overrides the engine's pool size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<usize>,
    #[serde(skip)]
    detected_product: Arc<OnceLock<String>>,
}

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

/// Transaction isolation applied to every pooled connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "read uncommitted",
            IsolationLevel::ReadCommitted => "read committed",
            IsolationLevel::RepeatableRead => "repeatable read",
            IsolationLevel::Serializable => "serializable",
        }
    }
}

/// SSL/TLS modes, matching the PostgreSQL `sslmode` parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

impl DataSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: default_driver(),
            url: None,
            host: default_host(),
            port: default_port(),
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            product: None,
            version: None,
            isolation: IsolationLevel::default(),
            ansi_join: None,
            table_qualification: TableQualification::default(),
            ssl_mode: SslMode::default(),
            accept_invalid_certs: false,
            ca_cert_path: None,
            pool_size: None,
            detected_product: Arc::default(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.name
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            ansi_join: self.ansi_join,
            qualification: self.table_qualification,
        }
    }

    /// Product name reported by the server, once detected.
    pub fn detected_product(&self) -> Option<&str> {
        self.detected_product.get().map(String::as_str)
    }

    /// Record the server-reported product name. Later calls are ignored.
    pub fn remember_product(&self, reported: impl Into<String>) {
        let _ = self.detected_product.set(reported.into());
    }

    pub fn display_string(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("{}@{}:{}/{}", self.username, self.host, self.port, self.database),
        }
    }

    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={} connect_timeout=10",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.database),
            quote_conn_value(&self.username),
            quote_conn_value(&self.password),
            self.ssl_mode.as_str()
        )
    }

    /// TLS connector for this data source; `None` when TLS is disabled.
    pub fn tls_connector(&self) -> Result<Option<MakeTlsConnector>> {
        match self.ssl_mode {
            SslMode::Disable => Ok(None),
            SslMode::Prefer | SslMode::Require => self.build_tls_connector(false).map(Some),
            SslMode::VerifyCa | SslMode::VerifyFull => self.build_tls_connector(true).map(Some),
        }
    }

    fn build_tls_connector(&self, strict_verify: bool) -> Result<MakeTlsConnector> {
        let mut builder = native_tls::TlsConnector::builder();

        if self.accept_invalid_certs && !strict_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        } else if let Some(ca_path) = &self.ca_cert_path {
            let pem = std::fs::read(ca_path)
                .with_context(|| format!("Failed to read CA certificate file: {}", ca_path))?;
            let cert = native_tls::Certificate::from_pem(&pem)
                .context("Failed to parse CA certificate")?;
            builder.add_root_certificate(cert);
        }

        let connector = builder.build().context("Failed to build TLS connector")?;
        Ok(MakeTlsConnector::new(connector))
    }
}

impl Default for DataSource {
    fn default() -> Self {
        Self::new("local")
    }
}

/// Quote a libpq connection-string value when it needs it.
fn quote_conn_value(value: &str) -> String {
    if !value.is_empty() && !value.contains([' ', '\'', '\\']) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
