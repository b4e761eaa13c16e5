//! `SQLite` implementation of the message store.
//!
//! One table per collection. Nested message fields are flattened into
//! columns and the timestamp is stored as microseconds since the epoch so
//! that `MAX` orders correctly. Indexes, the full-text table and its
//! triggers are named after the collection, so several collections can
//! share one database file.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};

use super::MessageStore;
use crate::config::{StoreConfig, is_identifier};
use crate::message::{
    Direction, Guest, Message, MessageType, Property, Reservation, StoredMessage, UpsertOutcome,
};
use crate::{Error, Result};

/// Largest page `list` returns.
pub const MAX_PAGE_SIZE: u32 = 100;

const COLUMNS: &str = "message_id, property_id, property_name, guest_name, guest_email, \
    guest_phone, guest_nationality, content, timestamp, direction, reservation_id, \
    reservation_price, message_type, created_at, updated_at";

/// Message store backed by a `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteMessageStore {
    /// Connects using `config`, retrying with a fixed pause.
    ///
    /// Creates the collection table if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] once every attempt failed, or an
    /// error if the configuration is invalid or schema creation fails.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let url = config.connection_url();
        let attempts = config.connect_attempts.max(1);

        let mut attempt = 0;
        let pool = loop {
            attempt += 1;
            match SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
            {
                Ok(pool) => break pool,
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        error = %e,
                        "store connection failed, retrying"
                    );
                    tokio::time::sleep(config.connect_retry_delay).await;
                }
                Err(source) => {
                    tracing::error!(attempts = attempt, error = %source, "store unavailable");
                    return Err(Error::StoreUnavailable {
                        attempts: attempt,
                        source,
                    });
                }
            }
        };

        tracing::info!(collection = %config.collection, "connected to store");
        let store = Self {
            pool,
            table: config.collection.clone(),
        };
        store.initialize().await?;
        Ok(store)
    }

    /// Opens an existing store without writing to it.
    ///
    /// When the database file or the collection table doesn't exist, an
    /// empty in-memory store stands in. Nothing is created on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the stand-in
    /// store cannot be created.
    pub async fn connect_read_only(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let options = SqliteConnectOptions::from_str(&config.connection_url())?
            .read_only(true)
            .create_if_missing(false);

        match SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
        {
            Ok(pool) => {
                let store = Self {
                    pool,
                    table: config.collection.clone(),
                };
                if store.table_exists().await? {
                    tracing::info!(collection = %config.collection, "opened store read-only");
                    return Ok(store);
                }
                store.close().await;
                tracing::info!(
                    collection = %config.collection,
                    "collection not found, using an empty store"
                );
            }
            Err(e) => tracing::info!(error = %e, "store not readable, using an empty store"),
        }
        Self::memory(&config.collection).await
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        Self::memory("messages").await
    }

    async fn memory(table: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self {
            pool,
            table: table.to_string(),
        };
        store.initialize().await?;
        Ok(store)
    }

    async fn table_exists(&self) -> Result<bool> {
        let name: Option<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&self.table)
                .fetch_optional(&self.pool)
                .await?;
        Ok(name.is_some())
    }

    fn fts_table(&self) -> String {
        format!("{}_content_text", self.table)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        debug_assert!(is_identifier(&self.table));
        let sql = format!(
            r"
            CREATE TABLE IF NOT EXISTS {table} (
                message_id TEXT NOT NULL,
                property_id TEXT NOT NULL DEFAULT '',
                property_name TEXT,
                guest_name TEXT,
                guest_email TEXT,
                guest_phone TEXT,
                guest_nationality TEXT,
                content TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                direction TEXT NOT NULL,
                reservation_id TEXT,
                reservation_price TEXT,
                message_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
            table = self.table
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Get a message by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, message_id: &str) -> Result<Option<StoredMessage>> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE message_id = ?", self.table);
        let row = sqlx::query(&sql)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    /// Lists messages newest first. `limit` is clamped to `1..=100`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, skip: u32, limit: u32) -> Result<Vec<StoredMessage>> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let sql = format!(
            "SELECT {COLUMNS} FROM {} ORDER BY timestamp DESC, message_id LIMIT ? OFFSET ?",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .bind(i64::from(skip))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    /// Number of stored messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Full-text search over message content, best matches first.
    ///
    /// Each whitespace-separated word must appear. Requires
    /// [`MessageStore::ensure_indexes`] to have run.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn search_content(&self, query: &str, limit: u32) -> Result<Vec<StoredMessage>> {
        let Some(expr) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let columns = COLUMNS
            .split(", ")
            .map(|c| format!("m.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r"
            SELECT {columns}
            FROM {fts}
            JOIN {table} m ON m.rowid = {fts}.rowid
            WHERE {fts} MATCH ?
            ORDER BY rank
            LIMIT ?
            ",
            fts = self.fts_table(),
            table = self.table
        );
        let rows = sqlx::query(&sql)
            .bind(expr)
            .bind(i64::from(limit.clamp(1, MAX_PAGE_SIZE)))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    /// Closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn upsert(&self, message: &Message) -> Result<UpsertOutcome> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(Error::StoreWrite)?;

        let select = format!("SELECT 1 FROM {} WHERE message_id = ?", self.table);
        let exists = sqlx::query(&select)
            .bind(&message.message_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::StoreWrite)?
            .is_some();

        let (sql, outcome) = if exists {
            (
                format!(
                    r"
                    UPDATE {} SET
                        property_id = ?, property_name = ?, guest_name = ?, guest_email = ?,
                        guest_phone = ?, guest_nationality = ?, content = ?, timestamp = ?,
                        direction = ?, reservation_id = ?, reservation_price = ?,
                        message_type = ?, updated_at = ?
                    WHERE message_id = ?
                    ",
                    self.table
                ),
                UpsertOutcome::Updated,
            )
        } else {
            (
                format!(
                    r"
                    INSERT INTO {} (
                        property_id, property_name, guest_name, guest_email,
                        guest_phone, guest_nationality, content, timestamp,
                        direction, reservation_id, reservation_price,
                        message_type, updated_at, message_id, created_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ",
                    self.table
                ),
                UpsertOutcome::Inserted,
            )
        };

        let reservation = message.reservation.as_ref();
        let mut query = sqlx::query(&sql)
            .bind(&message.property.id)
            .bind(&message.property.name)
            .bind(&message.guest.name)
            .bind(&message.guest.email)
            .bind(&message.guest.phone)
            .bind(&message.guest.nationality)
            .bind(&message.content)
            .bind(message.timestamp.timestamp_micros())
            .bind(message.direction.as_str())
            .bind(reservation.map(|r| r.id.as_str()))
            .bind(reservation.and_then(|r| r.price).map(|p| p.to_string()))
            .bind(message.message_type.as_str())
            .bind(&now)
            .bind(&message.message_id);
        if outcome == UpsertOutcome::Inserted {
            query = query.bind(&now);
        }
        query.execute(&mut *tx).await.map_err(Error::StoreWrite)?;
        tx.commit().await.map_err(Error::StoreWrite)?;

        tracing::debug!(message_id = %message.message_id, ?outcome, "upserted message");
        Ok(outcome)
    }

    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let sql = format!("SELECT MAX(timestamp) FROM {}", self.table);
        let micros: Option<i64> = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(micros.and_then(DateTime::from_timestamp_micros))
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let table = &self.table;
        let fts = self.fts_table();
        let mut tx = self.pool.begin().await?;

        let statements = [
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {table}_message_id_unique ON {table}(message_id)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_property_timestamp \
                 ON {table}(property_id, timestamp)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_nationality_timestamp \
                 ON {table}(guest_nationality, timestamp)"
            ),
        ];
        for sql in &statements {
            sqlx::query(sql).execute(&mut *tx).await?;
        }

        let fts_exists: Option<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&fts)
                .fetch_optional(&mut *tx)
                .await?;

        if fts_exists.is_none() {
            let statements = [
                format!(
                    "CREATE VIRTUAL TABLE {fts} \
                     USING fts5(content, content='{table}', content_rowid='rowid')"
                ),
                format!(
                    r"
                    CREATE TRIGGER IF NOT EXISTS {fts}_insert AFTER INSERT ON {table} BEGIN
                        INSERT INTO {fts}(rowid, content) VALUES (new.rowid, new.content);
                    END
                    "
                ),
                format!(
                    r"
                    CREATE TRIGGER IF NOT EXISTS {fts}_delete AFTER DELETE ON {table} BEGIN
                        INSERT INTO {fts}({fts}, rowid, content)
                        VALUES ('delete', old.rowid, old.content);
                    END
                    "
                ),
                format!(
                    r"
                    CREATE TRIGGER IF NOT EXISTS {fts}_update AFTER UPDATE ON {table} BEGIN
                        INSERT INTO {fts}({fts}, rowid, content)
                        VALUES ('delete', old.rowid, old.content);
                        INSERT INTO {fts}(rowid, content) VALUES (new.rowid, new.content);
                    END
                    "
                ),
                format!("INSERT INTO {fts}({fts}) VALUES ('rebuild')"),
            ];
            for sql in &statements {
                sqlx::query(sql).execute(&mut *tx).await?;
            }
            tracing::info!(collection = %table, "created full-text index");
        }

        tx.commit().await?;
        tracing::debug!(collection = %table, "indexes ensured");
        Ok(())
    }
}

/// Decodes one row. A column holding a value the model can't represent
/// is an error naming the message and the column.
fn decode_row(row: &SqliteRow) -> Result<StoredMessage> {
    let message_id: String = row.try_get("message_id")?;
    let corrupt = |column: &str, value: &dyn std::fmt::Debug| {
        Error::Database(sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: format!("message {message_id}: unexpected value {value:?}").into(),
        })
    };

    let instant = |column: &str| -> Result<DateTime<Utc>> {
        let value: String = row.try_get(column)?;
        DateTime::parse_from_rfc3339(&value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| corrupt(column, &value))
    };
    let created_at = instant("created_at")?;
    let updated_at = instant("updated_at")?;

    let micros: i64 = row.try_get("timestamp")?;
    let timestamp =
        DateTime::from_timestamp_micros(micros).ok_or_else(|| corrupt("timestamp", &micros))?;

    let direction: String = row.try_get("direction")?;
    let direction = Direction::parse(&direction).ok_or_else(|| corrupt("direction", &direction))?;
    let message_type: String = row.try_get("message_type")?;
    let message_type =
        MessageType::parse(&message_type).ok_or_else(|| corrupt("message_type", &message_type))?;

    let reservation = match row.try_get::<Option<String>, _>("reservation_id")? {
        Some(id) => {
            let price = match row.try_get::<Option<String>, _>("reservation_price")? {
                Some(p) => Some(
                    Decimal::from_str(&p).map_err(|_| corrupt("reservation_price", &p))?,
                ),
                None => None,
            };
            Some(Reservation { id, price })
        }
        None => None,
    };

    Ok(StoredMessage {
        message: Message {
            property: Property {
                id: row.try_get("property_id")?,
                name: row.try_get("property_name")?,
            },
            guest: Guest {
                name: row.try_get("guest_name")?,
                email: row.try_get("guest_email")?,
                phone: row.try_get("guest_phone")?,
                nationality: row.try_get("guest_nationality")?,
            },
            content: row.try_get("content")?,
            timestamp,
            direction,
            reservation,
            message_type,
            message_id,
        },
        created_at,
        updated_at,
    })
}

/// Turns free text into an FTS5 expression of quoted terms.
fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}
