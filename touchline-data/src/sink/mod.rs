//! SQLite warehouse for raw payload rows.
//!
//! Each stage writes into its own raw table, created on first use. A batch is
//! written inside one transaction, so a failing row rolls back every row of
//! the batch.
#![forbid(unsafe_code)]

mod schema;

use std::time::{Duration, UNIX_EPOCH};

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use rusqlite::{Connection, Error as SqliteError, params};
use thiserror::Error;
use touchline_core::{Batch, Row, Sink, SinkError, TableSpec};

/// Errors raised by [`SqliteSink`].
#[derive(Debug, Error)]
pub enum SqliteSinkError {
    /// Failed to create the parent directory for the database file.
    #[error("failed to create parent directory of {path}")]
    CreateDirectory {
        /// Database path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}")]
    Open {
        /// Database path.
        path: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Configuring the connection failed.
    #[error("failed to configure SQLite connection ({setting})")]
    Configure {
        /// Setting being applied.
        setting: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// A table or column name is not a plain identifier.
    #[error("refusing to use {identifier:?} as an SQL identifier")]
    InvalidIdentifier {
        /// The rejected name.
        identifier: String,
    },
    /// Beginning the transaction failed.
    #[error("failed to begin batch transaction")]
    BeginTransaction {
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Creating a raw table failed.
    #[error("failed to create table {table}")]
    CreateTable {
        /// Table being created.
        table: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Preparing the insert statement failed.
    #[error("failed to prepare insert into {table}")]
    PrepareInsert {
        /// Destination table.
        table: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// A payload could not be serialised.
    #[error("failed to serialise payload of row {position} for {table}")]
    SerializePayload {
        /// Destination table.
        table: String,
        /// Position of the row within the batch.
        position: usize,
        /// Source error produced by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// Writing a row failed.
    #[error("failed to insert row {position} into {table}")]
    InsertRow {
        /// Destination table.
        table: String,
        /// Position of the row within the batch.
        position: usize,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Committing the transaction failed.
    #[error("failed to commit batch transaction")]
    Commit {
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Counting the rows of a table failed.
    #[error("failed to count rows in {table}")]
    Count {
        /// Table being counted.
        table: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
}

/// How long a write waits for another connection's lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// [`Sink`] writing raw rows into SQLite.
///
/// # Examples
///
/// ```
/// use std::time::SystemTime;
/// use serde_json::json;
/// use touchline_core::{
///     Batch, CompetitionId, Document, Row, RowKeys, Season, Sink, TableSpec,
/// };
/// use touchline_data::SqliteSink;
///
/// let table = TableSpec { name: "raw_teams_info", entity_column: Some("team_id") };
/// let row = Row::new(
///     RowKeys { competition: CompetitionId(39), season: Season(2024), entity: Some(33) },
///     SystemTime::now(),
///     "https://www.api-football.com/",
///     Document::new(json!({"team": {"id": 33}})),
/// );
/// let mut sink = SqliteSink::open_in_memory().expect("open database");
/// sink.insert_batch(&Batch { table: &table, rows: &[row] }).expect("commit batch");
/// assert_eq!(sink.row_count(&table).expect("count rows"), 1);
/// ```
#[derive(Debug)]
pub struct SqliteSink {
    connection: Connection,
    location: String,
}

impl SqliteSink {
    /// Open (or create) the database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteSinkError`] when the directory or database cannot be
    /// created or configured.
    pub fn open(path: &Utf8Path) -> Result<Self, SqliteSinkError> {
        touchline_fs::ensure_parent_dir(path).map_err(|source| {
            SqliteSinkError::CreateDirectory {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let connection =
            Connection::open(path.as_std_path()).map_err(|source| SqliteSinkError::Open {
                path: path.to_string(),
                source,
            })?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|source| SqliteSinkError::Configure {
                setting: "busy_timeout",
                source,
            })?;
        Ok(Self {
            connection,
            location: path.to_string(),
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteSinkError::Open`] when SQLite cannot allocate it.
    pub fn open_in_memory() -> Result<Self, SqliteSinkError> {
        let connection = Connection::open_in_memory().map_err(|source| SqliteSinkError::Open {
            path: ":memory:".to_owned(),
            source,
        })?;
        Ok(Self {
            connection,
            location: ":memory:".to_owned(),
        })
    }

    /// Where the database lives.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Underlying connection, for read-only inspection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Create the raw tables up front.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteSinkError`] when a table cannot be created.
    pub fn prepare_tables<'t>(
        &mut self,
        tables: impl IntoIterator<Item = &'t TableSpec>,
    ) -> Result<(), SqliteSinkError> {
        let transaction = self
            .connection
            .transaction()
            .map_err(|source| SqliteSinkError::BeginTransaction { source })?;
        for table in tables {
            schema::ensure_table(&transaction, table)?;
        }
        transaction
            .commit()
            .map_err(|source| SqliteSinkError::Commit { source })
    }

    /// Number of rows committed to `table`; zero when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteSinkError`] when the table name is invalid or the
    /// query fails.
    pub fn row_count(&self, table: &TableSpec) -> Result<u64, SqliteSinkError> {
        let name = schema::identifier(table.name)?;
        let count_error = |source| SqliteSinkError::Count {
            table: table.name.to_owned(),
            source,
        };
        let exists: bool = self
            .connection
            .query_row(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                [name],
                |row| row.get(0),
            )
            .map_err(count_error)?;
        if !exists {
            return Ok(0);
        }
        let count: i64 = self
            .connection
            .query_row(&format!("SELECT COUNT(*) FROM {name}"), [], |row| {
                row.get(0)
            })
            .map_err(count_error)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn write_batch(&mut self, batch: &Batch<'_>) -> Result<(), SqliteSinkError> {
        if batch.is_empty() {
            return Ok(());
        }
        let table = batch.table.name;
        let sql = schema::insert_sql(batch.table, &batch.columns())?;

        let transaction = self
            .connection
            .transaction()
            .map_err(|source| SqliteSinkError::BeginTransaction { source })?;
        schema::ensure_table(&transaction, batch.table)?;
        {
            let mut statement =
                transaction
                    .prepare_cached(&sql)
                    .map_err(|source| SqliteSinkError::PrepareInsert {
                        table: table.to_owned(),
                        source,
                    })?;
            for (position, row) in batch.rows.iter().enumerate() {
                let payload = serde_json::to_string(row.payload()).map_err(|source| {
                    SqliteSinkError::SerializePayload {
                        table: table.to_owned(),
                        position,
                        source,
                    }
                })?;
                let keys = row.keys();
                let ingested_at = epoch_millis(row);
                let league = i64::from(keys.competition.0);
                let season = i64::from(keys.season.0);
                let written = if batch.table.entity_column.is_some() {
                    statement.execute(params![
                        ingested_at,
                        league,
                        season,
                        keys.entity,
                        row.provenance(),
                        payload
                    ])
                } else {
                    statement.execute(params![
                        ingested_at,
                        league,
                        season,
                        row.provenance(),
                        payload
                    ])
                };
                written.map_err(|source| SqliteSinkError::InsertRow {
                    table: table.to_owned(),
                    position,
                    source,
                })?;
            }
        }
        transaction
            .commit()
            .map_err(|source| SqliteSinkError::Commit { source })?;
        debug!("committed {} rows to {table} in {}", batch.len(), self.location);
        Ok(())
    }
}

impl Sink for SqliteSink {
    fn insert_batch(&mut self, batch: &Batch<'_>) -> Result<(), SinkError> {
        self.write_batch(batch)
            .map_err(|source| SinkError::new(batch, source))
    }
}

fn epoch_millis(row: &Row) -> i64 {
    row.ingested_at()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}
