//! Connection parameters for an [`Engine`](crate::Engine)
//!
//! Loading these from files or the environment is left to the host; the
//! struct derives `Deserialize` so any serde format can feed it.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Engine families the execution layer can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    MySql,
    Sqlite,
    Postgres,
}

impl EngineKind {
    /// Parse an engine name; unknown names are a configuration error.
    pub fn parse(engine: &str) -> Result<Self> {
        match engine.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(EngineKind::MySql),
            "sqlite" | "sqlite3" => Ok(EngineKind::Sqlite),
            "pgsql" | "postgres" | "postgresql" => Ok(EngineKind::Postgres),
            _ => Err(Error::unsupported_engine(engine)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub engine: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    /// Database file for file-based engines; `:memory:` for an in-memory SQLite
    #[serde(default)]
    pub path: Option<String>,
    /// Record timings and call sites for every executed statement
    #[serde(default)]
    pub diagnostics: bool,
}

impl DatabaseConfig {
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            engine: "sqlite".to_string(),
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            path: Some(path.into()),
            diagnostics: false,
        }
    }

    pub fn mysql(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            engine: "mysql".to_string(),
            host: Some(host.into()),
            port: None,
            user: Some(user.into()),
            password: Some(password.into()),
            database: Some(database.into()),
            path: None,
            diagnostics: false,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    pub fn kind(&self) -> Result<EngineKind> {
        EngineKind::parse(&self.engine)
    }

    /// Render the sqlx connection URL.
    pub fn to_url(&self) -> Result<String> {
        match self.kind()? {
            EngineKind::Sqlite => {
                let path = self
                    .path
                    .as_deref()
                    .or(self.database.as_deref())
                    .ok_or_else(|| Error::configuration("sqlite engine needs a file path"))?;
                if path == ":memory:" {
                    Ok("sqlite::memory:".to_string())
                } else {
                    Ok(format!("sqlite://{}?mode=rwc", path))
                }
            }
            EngineKind::MySql => self.server_url("mysql"),
            EngineKind::Postgres => self.server_url("postgres"),
        }
    }

    fn server_url(&self, scheme: &str) -> Result<String> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| Error::configuration(format!("{} engine needs a host", scheme)))?;

        let mut url = format!("{}://", scheme);
        if let Some(user) = &self.user {
            url.push_str(&encode(user));
            if let Some(password) = &self.password {
                url.push(':');
                url.push_str(&encode(password));
            }
            url.push('@');
        }
        url.push_str(host);
        if let Some(port) = self.port {
            url.push_str(&format!(":{}", port));
        }
        if let Some(database) = &self.database {
            url.push('/');
            url.push_str(database);
        }
        Ok(url)
    }
}

fn encode(part: &str) -> String {
    utf8_percent_encode(part, NON_ALPHANUMERIC).to_string()
}
