use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use donorbridge::connect_and_migrate;
use donorbridge::destination::RateLimitedClient;
use donorbridge::donorperfect::DonorPerfectClient;
use donorbridge::http::reqwest_transport::ReqwestTransport;
use donorbridge::source::InMemorySource;
use donorbridge::sync::SyncEngine;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::Config;

/// Output format for report commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

pub(crate) type Destination = RateLimitedClient<DonorPerfectClient<ReqwestTransport>>;
pub(crate) type Engine = SyncEngine<InMemorySource, Destination>;

/// What a command needs beyond the sync log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// Log and stats only.
    LogOnly,
    /// Destination calls, no donations.
    Destination,
    /// Donations from the source and destination calls.
    Full,
}

impl Access {
    fn needs_source(self) -> bool {
        self == Self::Full
    }

    fn needs_api_key(self) -> bool {
        self != Self::LogOnly
    }
}

/// Everything a command needs to open an engine.
pub(crate) struct Context {
    pub(crate) config: Config,
    pub(crate) database_url: String,
    /// `--source`, overriding `[source] path`.
    pub(crate) source: Option<PathBuf>,
}

impl Context {
    fn source_path(&self) -> Option<&PathBuf> {
        self.source.as_ref().or(self.config.source.path.as_ref())
    }

    /// Whether a source export is configured, by flag or config.
    pub(crate) fn has_source(&self) -> bool {
        self.source_path().is_some()
    }

    /// Connect, migrate and assemble the engine.
    pub(crate) async fn open_engine(
        &self,
        access: Access,
    ) -> Result<Engine, Box<dyn std::error::Error>> {
        if access.needs_api_key() && self.config.api_key().is_none() {
            return Err("No DonorPerfect API key configured. \
                        Set [destination] api_key or DONORBRIDGE_API_KEY."
                .into());
        }

        let source = match self.source_path() {
            Some(path) => InMemorySource::from_json_file(path)?,
            None if access.needs_source() => {
                return Err("No source export configured. \
                            Pass --source or set [source] path."
                    .into());
            }
            None => InMemorySource::new(),
        };

        let db = connect_and_migrate(&self.database_url).await?;

        let transport =
            ReqwestTransport::with_timeout(Duration::from_secs(self.config.destination.timeout_secs))?;
        let client = DonorPerfectClient::new(transport, self.config.api_key().unwrap_or_default())
            .with_base_url(&self.config.destination.base_url)?;
        let destination =
            RateLimitedClient::new(client, self.config.destination.requests_per_second);

        Ok(SyncEngine::new(
            Arc::new(db),
            source,
            destination,
            self.config.sync_settings(),
        ))
    }
}

/// Print rows as a rounded table or pretty JSON.
pub(crate) fn print_rows<T>(rows: Vec<T>, format: OutputFormat) -> Result<(), serde_json::Error>
where
    T: Serialize + tabled::Tabled,
{
    match format {
        OutputFormat::Table => {
            let mut table = tabled::Table::new(rows);
            table.with(tabled::settings::Style::rounded());
            println!("{}", table);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render an amount with two decimals.
pub(crate) fn money(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

/// `-` for absent values in tables.
pub(crate) fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_uses_two_decimals() {
        assert_eq!(money(Decimal::new(25, 0)), "25.00");
        assert_eq!(money(Decimal::new(1999, 2)), "19.99");
    }

    #[test]
    fn or_dash_fills_missing_values() {
        assert_eq!(or_dash(Some(41)), "41");
        assert_eq!(or_dash::<i64>(None), "-");
    }

    #[test]
    fn access_levels_require_what_they_touch() {
        assert!(!Access::LogOnly.needs_api_key());
        assert!(!Access::LogOnly.needs_source());
        assert!(Access::Destination.needs_api_key());
        assert!(!Access::Destination.needs_source());
        assert!(Access::Full.needs_api_key());
        assert!(Access::Full.needs_source());
    }

    #[test]
    fn source_flag_or_config_counts_as_a_source() {
        let mut ctx = Context {
            config: Config::default(),
            database_url: "sqlite::memory:".to_string(),
            source: None,
        };
        assert!(!ctx.has_source());

        ctx.config.source.path = Some(PathBuf::from("export.json"));
        assert!(ctx.has_source());

        ctx.config.source.path = None;
        ctx.source = Some(PathBuf::from("other.json"));
        assert!(ctx.has_source());
    }

    #[tokio::test]
    async fn missing_api_key_is_reported_before_connecting() {
        let ctx = Context {
            config: Config::default(),
            database_url: "sqlite::memory:".to_string(),
            source: None,
        };
        let err = ctx.open_engine(Access::Destination).await.err().unwrap();
        assert!(err.to_string().contains("API key"));
    }

    #[tokio::test]
    async fn log_only_engine_opens_without_source_or_key() {
        let ctx = Context {
            config: Config::default(),
            database_url: "sqlite::memory:".to_string(),
            source: None,
        };
        let engine = ctx.open_engine(Access::LogOnly).await.unwrap();
        assert_eq!(engine.count_unsynced().await.unwrap(), 0);
    }
}
