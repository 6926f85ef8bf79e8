//! Connection settings for [`super::PostgresEventStore`], built from the
//! environment with secure handling of the database password.
//!
//! Grounded on `examples/jwilger-mneme/src/kurrent_adapter/settings.rs`'s
//! `ConnectionSettings`: a builder, an `from_env` constructor, and a
//! `Debug` impl that never prints the password.
use std::fmt;

use crate::error::Error;

/// Settings for connecting to the relational store backing
/// [`super::PostgresEventStore`]. The password is never exposed through
/// `Debug` or any other introspection the struct offers.
#[derive(Clone)]
pub struct PostgresSettings {
    host: String,
    port: u16,
    database: String,
    username: String,
    password: SecureString,
}

impl fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl PostgresSettings {
    pub fn builder() -> PostgresSettingsBuilder {
        PostgresSettingsBuilder::default()
    }

    /// Builds settings from the environment.
    ///
    /// Expected variables:
    /// - `LEDGERSAGA_PG_HOST` (default: "localhost")
    /// - `LEDGERSAGA_PG_PORT` (default: 5432)
    /// - `LEDGERSAGA_PG_DATABASE` (default: "ledgersaga")
    /// - `LEDGERSAGA_PG_USERNAME` (default: "ledgersaga")
    /// - `LEDGERSAGA_PG_PASSWORD` (required)
    pub fn from_env() -> Result<Self, Error> {
        let host = std::env::var("LEDGERSAGA_PG_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = std::env::var("LEDGERSAGA_PG_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5432);
        let database =
            std::env::var("LEDGERSAGA_PG_DATABASE").unwrap_or_else(|_| "ledgersaga".to_string());
        let username =
            std::env::var("LEDGERSAGA_PG_USERNAME").unwrap_or_else(|_| "ledgersaga".to_string());
        let password = std::env::var("LEDGERSAGA_PG_PASSWORD").map_err(|_| Error::InvalidConfig {
            message: "LEDGERSAGA_PG_PASSWORD environment variable is required".to_string(),
            parameter: Some("password".to_string()),
        })?;

        Ok(Self {
            host,
            port,
            database,
            username,
            password: SecureString::new(password),
        })
    }

    /// Converts the settings into a `postgres://` connection URL suitable for
    /// [`super::PostgresEventStore::connect`].
    pub fn to_connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username,
            self.password.as_str(),
            self.host,
            self.port,
            self.database
        )
    }
}

/// Builder for [`PostgresSettings`].
#[derive(Default)]
pub struct PostgresSettingsBuilder {
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    username: Option<String>,
    password: Option<SecureString>,
}

impl PostgresSettingsBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecureString::new(password.into()));
        self
    }

    pub fn build(self) -> Result<PostgresSettings, Error> {
        Ok(PostgresSettings {
            host: self.host.unwrap_or_else(|| "localhost".to_string()),
            port: self.port.unwrap_or(5432),
            database: self.database.unwrap_or_else(|| "ledgersaga".to_string()),
            username: self.username.unwrap_or_else(|| "ledgersaga".to_string()),
            password: self.password.ok_or_else(|| Error::InvalidConfig {
                message: "password is required".to_string(),
                parameter: Some("password".to_string()),
            })?,
        })
    }
}

/// A string that never prints its contents through `Debug`.
struct SecureString {
    inner: String,
}

impl SecureString {
    fn new(s: String) -> Self {
        Self { inner: s }
    }

    fn as_str(&self) -> &str {
        &self.inner
    }
}

impl Clone for SecureString {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_defaults() {
        let settings = PostgresSettings::builder().password("pw").build().unwrap();
        assert_eq!(settings.host, "localhost");
        assert_eq!(settings.port, 5432);
        assert_eq!(settings.database, "ledgersaga");
        assert_eq!(settings.username, "ledgersaga");
    }

    #[test]
    fn requires_password() {
        let result = PostgresSettings::builder().build();
        assert!(matches!(
            result,
            Err(Error::InvalidConfig { parameter: Some(p), .. }) if p == "password"
        ));
    }

    #[test]
    fn debug_output_hides_password() {
        let settings = PostgresSettings::builder()
            .password("supersecret")
            .build()
            .unwrap();
        let debug_str = format!("{settings:?}");
        assert!(!debug_str.contains("supersecret"));
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn generates_connection_string() {
        let settings = PostgresSettings::builder()
            .host("db.internal")
            .port(6543)
            .database("ledger")
            .username("svc")
            .password("pw")
            .build()
            .unwrap();
        assert_eq!(
            settings.to_connection_string(),
            "postgres://svc:pw@db.internal:6543/ledger"
        );
    }
}
