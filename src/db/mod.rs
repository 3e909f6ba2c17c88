//! MySQL loading: one connection, optionally through an SSH tunnel.

pub mod tables;
pub mod tunnel;
pub mod upsert;

pub use tables::{find_table, ALL_TABLES};
pub use tunnel::SshTunnel;
pub use upsert::{build_upsert_sql, upsert_all, upsert_table, ColumnMap, TableSpec, UpsertReport};

use crate::config::Config;
use crate::error::Result;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};
use tracing::info;

pub struct Database {
    // Declared before the tunnel so the connection closes first.
    conn: MySqlConnection,
    tunnel: Option<SshTunnel>,
}

impl Database {
    pub async fn connect(config: &Config) -> Result<Self> {
        let db = &config.database;
        let (tunnel, host, port) = match &config.ssh {
            Some(ssh) => {
                let tunnel = SshTunnel::open(ssh, &db.host, db.port).await?;
                let port = tunnel.local_port();
                (Some(tunnel), "127.0.0.1".to_string(), port)
            }
            None => (None, db.host.clone(), db.port),
        };

        let conn = MySqlConnectOptions::new()
            .host(&host)
            .port(port)
            .username(&db.user)
            .password(&db.password)
            .database(&db.name)
            .charset("utf8mb4")
            .connect()
            .await?;
        info!("Connected to MySQL database {} at {}:{}", db.name, host, port);
        Ok(Self { conn, tunnel })
    }

    pub fn connection(&mut self) -> &mut MySqlConnection {
        &mut self.conn
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        if let Some(tunnel) = self.tunnel {
            tunnel.close().await?;
        }
        Ok(())
    }
}
