//! Turning provider documents into rows.
//!
//! Field-level shaping belongs to the warehouse; the default transform keeps
//! payloads raw and only attaches dimension keys and provenance.

use std::time::SystemTime;

use serde_json::Value;

use crate::{Document, Row, RowKeys, RowShape, WorkUnit};

/// Provenance tag recorded on rows fetched from API-Football.
pub const DEFAULT_PROVENANCE: &str = "https://www.api-football.com/";

/// Maps fetched data for a work unit onto rows.
pub trait Transform {
    /// Row for a single listing item, or `None` to drop it.
    fn item_row(&self, unit: &WorkUnit<'_>, item: &Value, fetched_at: SystemTime) -> Option<Row>;

    /// Rows for a per-entity response.
    fn response_rows(&self, unit: &WorkUnit<'_>, document: &Document, fetched_at: SystemTime)
    -> Vec<Row>;
}

/// Stores payloads verbatim.
#[derive(Debug, Clone)]
pub struct RawPayloadTransform {
    provenance: String,
}

impl RawPayloadTransform {
    /// Tag rows with `provenance`.
    #[must_use]
    pub fn new(provenance: impl Into<String>) -> Self {
        Self {
            provenance: provenance.into(),
        }
    }

    fn row(&self, unit: &WorkUnit<'_>, payload: Value, fetched_at: SystemTime) -> Row {
        let keys = RowKeys {
            competition: unit.competition,
            season: unit.season,
            entity: unit.entity.id,
        };
        Row::new(keys, fetched_at, self.provenance.as_str(), Document::new(payload))
    }
}

impl Default for RawPayloadTransform {
    fn default() -> Self {
        Self::new(DEFAULT_PROVENANCE)
    }
}

impl Transform for RawPayloadTransform {
    fn item_row(&self, unit: &WorkUnit<'_>, item: &Value, fetched_at: SystemTime) -> Option<Row> {
        Some(self.row(unit, item.clone(), fetched_at))
    }

    fn response_rows(
        &self,
        unit: &WorkUnit<'_>,
        document: &Document,
        fetched_at: SystemTime,
    ) -> Vec<Row> {
        match unit.spec.shape {
            RowShape::PerItem => document
                .items()
                .iter()
                .map(|item| self.row(unit, item.clone(), fetched_at))
                .collect(),
            RowShape::WholeResponse => match document.response() {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) if items.is_empty() => Vec::new(),
                Some(payload) => vec![self.row(unit, payload.clone(), fetched_at)],
            },
        }
    }
}
