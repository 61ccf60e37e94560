//! Store schema bootstrap statements.
//!
//! Every statement is idempotent (`IF NOT EXISTS` / `if_not_exists`) so
//! the writers can run the full set on every connect.

/// TimescaleDB DDL, executed in order on first connect.
pub const TIMESCALE_DDL: [&str; 11] = [
    // Raw event rows, partitioned on the event timestamp.
    r#"
    CREATE TABLE IF NOT EXISTS events_raw (
        ts TIMESTAMPTZ NOT NULL,
        host_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        payload_json JSONB NOT NULL,
        created_at TIMESTAMPTZ DEFAULT NOW(),
        PRIMARY KEY (ts, host_id, event_type)
    )
    "#,
    "SELECT create_hypertable('events_raw', 'ts', if_not_exists => TRUE)",
    // Enriched events, partitioned on insertion time.
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id TEXT NOT NULL,
        type TEXT NOT NULL,
        source TEXT NOT NULL,
        timestamp BIGINT NOT NULL,
        env TEXT,
        rdns TEXT,
        metadata JSONB,
        payload BYTEA,
        created_at TIMESTAMPTZ DEFAULT NOW(),
        PRIMARY KEY (id, created_at)
    )
    "#,
    "SELECT create_hypertable('events', 'created_at', if_not_exists => TRUE)",
    "CREATE INDEX IF NOT EXISTS idx_events_raw_ts ON events_raw (ts DESC)",
    "CREATE INDEX IF NOT EXISTS idx_events_raw_host_id ON events_raw (host_id)",
    "CREATE INDEX IF NOT EXISTS idx_events_raw_event_type ON events_raw (event_type)",
    "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events (timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_events_type ON events (type)",
    "CREATE INDEX IF NOT EXISTS idx_events_env ON events (env)",
    "CREATE INDEX IF NOT EXISTS idx_events_metadata ON events USING GIN (metadata)",
];

/// Neo4j constraints and indexes, executed in order on first connect.
pub const NEO4J_SCHEMA: [&str; 4] = [
    "CREATE CONSTRAINT host_id_unique IF NOT EXISTS \
     FOR (h:Host) REQUIRE h.host_id IS UNIQUE",
    "CREATE CONSTRAINT network_endpoint_id_unique IF NOT EXISTS \
     FOR (n:NetworkEndpoint) REQUIRE n.endpoint_id IS UNIQUE",
    "CREATE INDEX host_rdns_index IF NOT EXISTS FOR (h:Host) ON (h.rdns)",
    "CREATE INDEX network_endpoint_ip_index IF NOT EXISTS FOR (n:NetworkEndpoint) ON (n.ip)",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_timescale_statement_is_idempotent() {
        for stmt in TIMESCALE_DDL {
            assert!(
                stmt.contains("IF NOT EXISTS") || stmt.contains("if_not_exists"),
                "not idempotent: {stmt}"
            );
        }
    }

    #[test]
    fn raw_table_keys_and_partitioning() {
        assert!(TIMESCALE_DDL[0].contains("PRIMARY KEY (ts, host_id, event_type)"));
        assert!(TIMESCALE_DDL[1].contains("create_hypertable('events_raw', 'ts'"));
    }

    #[test]
    fn enriched_table_keys_and_partitioning() {
        assert!(TIMESCALE_DDL[2].contains("PRIMARY KEY (id, created_at)"));
        assert!(TIMESCALE_DDL[3].contains("create_hypertable('events', 'created_at'"));
    }

    #[test]
    fn metadata_index_is_gin() {
        assert!(TIMESCALE_DDL[10].contains("USING GIN (metadata)"));
    }

    #[test]
    fn graph_constraints_cover_both_node_kinds() {
        assert!(NEO4J_SCHEMA[0].contains("h.host_id IS UNIQUE"));
        assert!(NEO4J_SCHEMA[1].contains("n.endpoint_id IS UNIQUE"));
        for stmt in NEO4J_SCHEMA {
            assert!(stmt.contains("IF NOT EXISTS"), "not idempotent: {stmt}");
        }
    }
}
