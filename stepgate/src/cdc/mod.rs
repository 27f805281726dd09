//! CDC validators: Debezium connector health and schema history coverage.

mod debezium;
mod schema_history;

pub use debezium::{
    is_restart_loop, ConnectorStatus, DebeziumHealthCheck, DebeziumInspector, TaskStatus,
    CHECK_DEBEZIUM_HEALTH, STATE_RUNNING,
};
pub use schema_history::{missing_tables, KafkaInspector, SchemaHistoryCheck, CHECK_SCHEMA_HISTORY};
