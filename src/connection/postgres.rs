//! PostgreSQL connector.

use async_trait::async_trait;
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, warn};

use super::{ConnectError, ConnectResult, Connector, TlsBuilder};
use crate::catalog::PgCatalog;
use crate::config::ConnectParams;

/// Opens [`PgCatalog`] sessions with `tokio-postgres`.
#[derive(Debug, Clone, Default)]
pub struct PgConnector;

impl PgConnector {
    pub fn new() -> Self {
        Self
    }

    fn config(params: &ConnectParams) -> PgConfig {
        let mut config = PgConfig::new();
        config
            .host(&params.host)
            .port(params.port)
            .dbname(&params.database)
            .user(&params.username)
            .password(&params.secret)
            .application_name("schemalens");
        if params.ssl.mode.requires_tls() {
            config.ssl_mode(PgSslMode::Require);
        }
        config
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Session = PgCatalog;

    async fn connect(&self, params: &ConnectParams) -> ConnectResult<PgCatalog> {
        let config = Self::config(params);
        let target = params.display_target();

        let client = match TlsBuilder::new(&params.ssl).build()? {
            Some(tls) => {
                let (client, connection) = config
                    .connect(tls)
                    .await
                    .map_err(|e| ConnectError::failed(params, e))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        warn!(error = %e, "postgres connection closed with error");
                    }
                });
                client
            }
            None => {
                let (client, connection) = config
                    .connect(NoTls)
                    .await
                    .map_err(|e| ConnectError::failed(params, e))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        warn!(error = %e, "postgres connection closed with error");
                    }
                });
                client
            }
        };

        debug!(%target, "postgres session opened");
        Ok(PgCatalog::new(client))
    }
}
