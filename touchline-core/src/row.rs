//! Rows produced by the transform step and the batches handed to sinks.

use std::time::SystemTime;

use crate::{CompetitionId, Document, Season, TableSpec};

/// Dimension keys attached to every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowKeys {
    /// Competition the row belongs to.
    pub competition: CompetitionId,
    /// Season the row belongs to.
    pub season: Season,
    /// Entity identifier, when the stage is keyed by one.
    pub entity: Option<i64>,
}

/// An immutable raw record awaiting persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    keys: RowKeys,
    ingested_at: SystemTime,
    provenance: String,
    payload: Document,
}

impl Row {
    /// Assemble a row.
    #[must_use]
    pub fn new(
        keys: RowKeys,
        ingested_at: SystemTime,
        provenance: impl Into<String>,
        payload: Document,
    ) -> Self {
        Self {
            keys,
            ingested_at,
            provenance: provenance.into(),
            payload,
        }
    }

    /// Dimension keys.
    #[must_use]
    pub const fn keys(&self) -> &RowKeys {
        &self.keys
    }

    /// When the payload was fetched.
    #[must_use]
    pub const fn ingested_at(&self) -> SystemTime {
        self.ingested_at
    }

    /// Where the payload came from.
    #[must_use]
    pub fn provenance(&self) -> &str {
        &self.provenance
    }

    /// Raw payload.
    #[must_use]
    pub const fn payload(&self) -> &Document {
        &self.payload
    }
}

/// Rows bound for one table, committed together.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    /// Destination table.
    pub table: &'a TableSpec,
    /// Rows in commit order.
    pub rows: &'a [Row],
}

impl Batch<'_> {
    /// Column names in insertion order.
    ///
    /// # Examples
    ///
    /// ```
    /// use touchline_core::{Batch, TableSpec};
    ///
    /// let table = TableSpec { name: "raw_teams_info", entity_column: Some("team_id") };
    /// let batch = Batch { table: &table, rows: &[] };
    /// assert_eq!(
    ///     batch.columns(),
    ///     vec!["ingested_at", "league_id", "season", "team_id", "source", "payload"]
    /// );
    /// ```
    #[must_use]
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = vec!["ingested_at", "league_id", "season"];
        columns.extend(self.table.entity_column);
        columns.extend(["source", "payload"]);
        columns
    }

    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch carries no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
