//! Raw table DDL.

use rusqlite::Transaction;
use touchline_core::TableSpec;

use super::SqliteSinkError;

/// Create `table` and its dimension index when they do not exist yet.
///
/// `ingested_at` holds milliseconds since the Unix epoch and `payload` the
/// raw provider JSON.
pub(super) fn ensure_table(
    transaction: &Transaction<'_>,
    table: &TableSpec,
) -> Result<(), SqliteSinkError> {
    let name = identifier(table.name)?;
    let entity = table
        .entity_column
        .map(identifier)
        .transpose()?
        .map(|column| format!("\n            {column} INTEGER,"))
        .unwrap_or_default();

    run_migration_step(
        transaction,
        table.name,
        &format!(
            "CREATE TABLE IF NOT EXISTS {name} (
            id INTEGER PRIMARY KEY,
            ingested_at INTEGER NOT NULL,
            league_id INTEGER NOT NULL,
            season INTEGER NOT NULL,{entity}
            source TEXT NOT NULL,
            payload TEXT NOT NULL CHECK (json_valid(payload))
        )"
        ),
    )?;
    run_migration_step(
        transaction,
        table.name,
        &format!(
            "CREATE INDEX IF NOT EXISTS idx_{name}_dimensions ON {name} (league_id, season)"
        ),
    )
}

/// `INSERT` statement for the columns of `table`, in [`touchline_core::Batch::columns`] order.
pub(super) fn insert_sql(table: &TableSpec, columns: &[&str]) -> Result<String, SqliteSinkError> {
    let name = identifier(table.name)?;
    let columns = columns
        .iter()
        .map(|column| identifier(column))
        .collect::<Result<Vec<_>, _>>()?;
    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(format!(
        "INSERT INTO {name} ({}) VALUES ({placeholders})",
        columns.join(", ")
    ))
}

/// Accept plain `snake_case` identifiers only; they are spliced into SQL.
pub(super) fn identifier(name: &str) -> Result<&str, SqliteSinkError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|first| first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(SqliteSinkError::InvalidIdentifier {
            identifier: name.to_owned(),
        })
    }
}

fn run_migration_step(
    transaction: &Transaction<'_>,
    table: &str,
    sql: &str,
) -> Result<(), SqliteSinkError> {
    transaction
        .execute_batch(sql)
        .map_err(|source| SqliteSinkError::CreateTable {
            table: table.to_owned(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("raw_teams_info", true)]
    #[case("_scratch2", true)]
    #[case("2fast", false)]
    #[case("raw teams", false)]
    #[case("raw_league; DROP TABLE raw_league", false)]
    #[case("", false)]
    fn identifiers_are_restricted(#[case] name: &str, #[case] accepted: bool) {
        assert_eq!(identifier(name).is_ok(), accepted);
    }

    #[rstest]
    fn insert_statement_lists_batch_columns() {
        let table = TableSpec {
            name: "raw_teams_info",
            entity_column: Some("team_id"),
        };
        let sql = insert_sql(
            &table,
            &["ingested_at", "league_id", "season", "team_id", "source", "payload"],
        )
        .expect("valid identifiers");
        assert_eq!(
            sql,
            "INSERT INTO raw_teams_info (ingested_at, league_id, season, team_id, source, payload) \
             VALUES (?, ?, ?, ?, ?, ?)"
        );
    }
}
