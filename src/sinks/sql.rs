//! # Relational Changes Sink
//!
//! Upserts change data into a single identifier/value column pair of a
//! PostgreSQL table.
//!
//! Each write runs an `UPDATE` and, when no row matched, an `INSERT`, inside
//! one transaction and bounded by a one-minute timeout. Values are always
//! bound as parameters; table and column names come from configuration and
//! are validated as plain identifiers before any statement is built.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::Postgres;
use tracing::info;

use crate::config::{SqlSinkConfig, ValueKind};
use crate::error::{ProcessError, ToolkitError, ToolkitResult};
use crate::service::{ChangeEvent, ChangesProcessor};

const WRITE_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_CONNECTIONS: u32 = 5;

/// Converted value of one change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeValue {
    Text(String),
    Int(i64),
}

/// How change data becomes a column value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChangeValueConverter {
    /// Data as text, `,` replaced by `;`
    #[default]
    Text,
    /// Data parsed as an integer
    Int,
}

impl ChangeValueConverter {
    pub fn convert(&self, event: &ChangeEvent) -> ToolkitResult<ChangeValue> {
        match self {
            Self::Text => Ok(ChangeValue::Text(event.data.replace(',', ";"))),
            Self::Int => event
                .data
                .trim()
                .parse::<i64>()
                .map(ChangeValue::Int)
                .map_err(|e| {
                    ToolkitError::processing(format!("cannot convert data '{}': {e}", event.data))
                }),
        }
    }
}

impl From<ValueKind> for ChangeValueConverter {
    fn from(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Text => Self::Text,
            ValueKind::Int => Self::Int,
        }
    }
}

/// Accept `name` or `schema.name` made of ASCII letters, digits and underscores
pub fn validate_identifier(identifier: &str) -> ToolkitResult<()> {
    let parts: Vec<&str> = identifier.split('.').collect();
    if parts.len() > 2 {
        return Err(ToolkitError::configuration(
            "sql_sink",
            format!("identifier '{identifier}' has too many parts"),
        ));
    }

    for part in parts {
        let valid = part
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(ToolkitError::configuration(
                "sql_sink",
                format!("invalid identifier '{identifier}'"),
            ));
        }
    }
    Ok(())
}

/// Statements of the update-then-insert upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertStatements {
    pub update: String,
    pub insert: String,
}

impl UpsertStatements {
    pub fn new(table: &str, item_column: &str, data_column: &str) -> ToolkitResult<Self> {
        validate_identifier(table)?;
        validate_identifier(item_column)?;
        validate_identifier(data_column)?;

        Ok(Self {
            update: format!("UPDATE {table} SET {data_column} = $2 WHERE {item_column} = $1"),
            insert: format!("INSERT INTO {table} ({item_column}, {data_column}) VALUES ($1, $2)"),
        })
    }

    pub fn from_config(config: &SqlSinkConfig) -> ToolkitResult<Self> {
        Self::new(
            &config.item_flags_table,
            &config.item_column,
            &config.data_column,
        )
    }
}

/// Executes one upsert
#[async_trait]
pub trait SqlChangeWriter: Send + Sync + 'static {
    async fn write(&self, identifier: &str, value: &ChangeValue) -> ToolkitResult<()>;
}

/// Upsert writer over a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgChangeWriter {
    pool: PgPool,
    statements: UpsertStatements,
}

impl PgChangeWriter {
    pub fn new(pool: PgPool, statements: UpsertStatements) -> Self {
        Self { pool, statements }
    }

    /// Build a pool that connects on first use
    pub fn connect_lazy(config: &SqlSinkConfig) -> ToolkitResult<Self> {
        config.validate()?;
        let statements = UpsertStatements::from_config(config)?;
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(WRITE_TIMEOUT)
            .connect_lazy(&config.conn_string)?;
        Ok(Self::new(pool, statements))
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q ChangeValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        ChangeValue::Text(text) => query.bind(text.as_str()),
        ChangeValue::Int(number) => query.bind(*number),
    }
}

#[async_trait]
impl SqlChangeWriter for PgChangeWriter {
    async fn write(&self, identifier: &str, value: &ChangeValue) -> ToolkitResult<()> {
        let mut tx = self.pool.begin().await?;

        let updated = bind_value(sqlx::query(&self.statements.update).bind(identifier), value)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            bind_value(sqlx::query(&self.statements.insert).bind(identifier), value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Change processor writing through a [`SqlChangeWriter`]
pub struct SqlChangesSaver {
    writer: Arc<dyn SqlChangeWriter>,
    converter: ChangeValueConverter,
    timeout: Duration,
}

impl std::fmt::Debug for SqlChangesSaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlChangesSaver")
            .field("converter", &self.converter)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SqlChangesSaver {
    pub fn new(writer: Arc<dyn SqlChangeWriter>, converter: ChangeValueConverter) -> Self {
        Self {
            writer,
            converter,
            timeout: WRITE_TIMEOUT,
        }
    }

    /// Saver over a lazily connected PostgreSQL pool
    pub fn from_config(config: &SqlSinkConfig) -> ToolkitResult<Self> {
        let writer = PgChangeWriter::connect_lazy(config)?;
        Ok(Self::new(Arc::new(writer), config.value_kind.into()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ChangesProcessor for SqlChangesSaver {
    async fn process(&self, event: &ChangeEvent) -> Result<(), ProcessError> {
        let value = self.converter.convert(event)?;

        tokio::time::timeout(
            self.timeout,
            self.writer.write(&event.object_identifier, &value),
        )
        .await
        .map_err(|_| {
            ProcessError::failed(format!(
                "write for {} timed out after {}s",
                event.object_identifier,
                self.timeout.as_secs()
            ))
        })??;

        info!(
            object_type = %event.object_type,
            object_identifier = %event.object_identifier,
            data = %event.data,
            "Change value saved"
        );
        Ok(())
    }
}
