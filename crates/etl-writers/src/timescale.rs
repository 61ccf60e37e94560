//! TimescaleDB writer for time-series event data.
//!
//! Owns the connection pool and the schema bootstrap. Writes go through a
//! bounded retry on connection-level failures; statement errors surface
//! immediately.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use etl_core::domain::EnrichedEvent;
use etl_core::retry::{retry_with, RetryPolicy};
use etl_core::PgConfig;

use crate::error::{sqlx_is_transient, StoreError, StoreResult};
use crate::schema::TIMESCALE_DDL;
use crate::store_traits::EventStore;

const ENRICHED_UPSERT: &str = r#"
    INSERT INTO events (id, type, source, timestamp, env, rdns, metadata, payload)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (id, created_at) DO UPDATE SET
        type = EXCLUDED.type,
        source = EXCLUDED.source,
        timestamp = EXCLUDED.timestamp,
        env = EXCLUDED.env,
        rdns = EXCLUDED.rdns,
        metadata = EXCLUDED.metadata,
        payload = EXCLUDED.payload
"#;

const RAW_INSERT: &str = r#"
    INSERT INTO events_raw (ts, host_id, event_type, payload_json)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (ts, host_id, event_type) DO NOTHING
"#;

/// Writer for storing events in TimescaleDB.
pub struct TimescaleWriter {
    pool: PgPool,
    retry: RetryPolicy,
}

impl TimescaleWriter {
    /// Connect with pooling and run the idempotent schema bootstrap.
    #[instrument(skip_all, fields(host = %config.host, db = %config.db))]
    pub async fn connect(config: &PgConfig) -> StoreResult<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.db)
            .username(&config.user)
            .password(&config.password)
            .options([("statement_timeout", "10s")]);

        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!("created TimescaleDB connection pool (min=1, max=10)");

        let writer = Self {
            pool,
            retry: RetryPolicy::transient(),
        };
        writer.init_schema().await?;
        Ok(writer)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        for stmt in TIMESCALE_DDL {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::SchemaSetup(e.to_string()))?;
        }
        info!("TimescaleDB schema initialized");
        Ok(())
    }

    fn ts_from_millis(ts_ms: i64) -> StoreResult<DateTime<Utc>> {
        Utc.timestamp_millis_opt(ts_ms)
            .single()
            .ok_or_else(|| StoreError::InvalidRecord(format!("timestamp out of range: {ts_ms}")))
    }
}

#[async_trait]
impl EventStore for TimescaleWriter {
    #[instrument(skip(self, payload_json))]
    async fn write_raw_event(
        &self,
        ts_ms: i64,
        host_id: &str,
        event_type: &str,
        payload_json: &Value,
    ) -> StoreResult<()> {
        let ts = Self::ts_from_millis(ts_ms)?;

        retry_with(self.retry, "timescale.write_raw_event", sqlx_is_transient, || {
            sqlx::query(RAW_INSERT)
                .bind(ts)
                .bind(host_id)
                .bind(event_type)
                .bind(payload_json)
                .execute(&self.pool)
        })
        .await?;

        debug!(host_id, event_type, "written raw event");
        Ok(())
    }

    #[instrument(skip(self, event), fields(event_id = %event.event.id))]
    async fn write_enriched_event(&self, event: &EnrichedEvent) -> StoreResult<()> {
        let ts_ms = event
            .event
            .timestamp_ms()
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        let metadata = serde_json::to_value(&event.event.metadata)?;
        let payload = event.event.payload.as_ref().map(|p| p.as_bytes().to_vec());

        retry_with(self.retry, "timescale.write_enriched_event", sqlx_is_transient, || {
            sqlx::query(ENRICHED_UPSERT)
                .bind(&event.event.id)
                .bind(&event.event.event_type)
                .bind(&event.event.source)
                .bind(ts_ms)
                .bind(&event.context.env)
                .bind(event.context.rdns.as_deref())
                .bind(&metadata)
                .bind(payload.as_deref())
                .execute(&self.pool)
        })
        .await?;

        debug!(event_id = %event.event.id, "written enriched event");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("closed TimescaleDB connection pool");
    }
}
