//! Model definitions for the NBA tables
//!
//! Column names follow the stats API headers, lowercased.

use crate::schema::{ColumnDef, ModelDescriptor, Relationship};
use bettr_common::ColumnType::{Integer, Real, Text};
use bettr_common::{RecordBatch, Row, Value};

/// Franchise info, one row per team
pub fn team() -> ModelDescriptor {
    ModelDescriptor::new("Team")
        .column(ColumnDef::new("team_id", Integer).primary_key())
        .column(ColumnDef::new("team_name", Text).required())
        .column(ColumnDef::new("team_city", Text))
        .column(ColumnDef::new("team_abbreviation", Text))
        .column(ColumnDef::new("team_conference", Text))
        .column(ColumnDef::new("team_division", Text))
        .column(ColumnDef::new("min_year", Integer))
        .column(ColumnDef::new("max_year", Integer))
}

/// Key of a team game log row. Both teams of a game share a `game_id`.
pub const TEAM_GAME_ID: &str = "team_game_id";

/// Box score totals of a team in one game, keyed by [`TEAM_GAME_ID`]
pub fn team_game_log() -> ModelDescriptor {
    let counting = [
        "fgm", "fga", "fg3m", "fg3a", "ftm", "fta", "oreb", "dreb", "reb", "ast", "tov", "stl",
        "blk", "blka", "pf", "pfd",
    ];
    let rates = ["min", "fg_pct", "fg3_pct", "ft_pct", "plus_minus"];

    let mut model = ModelDescriptor::new("TeamGameLog")
        .column(ColumnDef::new(TEAM_GAME_ID, Text).primary_key())
        .column(ColumnDef::new("game_id", Text).required())
        .column(ColumnDef::new("team_id", Integer).required())
        .column(ColumnDef::new("season_year", Text).required())
        .column(ColumnDef::new("team_abbreviation", Text))
        .column(ColumnDef::new("team_name", Text))
        .column(ColumnDef::new("game_date", Text).required())
        .column(ColumnDef::new("matchup", Text))
        .column(ColumnDef::new("wl", Text))
        .column(ColumnDef::new("pts", Integer).required());

    for name in counting {
        model = model.column(ColumnDef::new(name, Integer));
    }
    for name in rates {
        model = model.column(ColumnDef::new(name, Real));
    }

    model.relationship(Relationship::new("team", "Team").via("team_id"))
}

/// Derive the columns a source doesn't carry for a table.
///
/// `team_game_log` rows get `team_game_id = "{game_id}_{team_id}"` unless
/// already set. Rows missing either part are left alone for validation.
pub fn shape(table: &str, batch: RecordBatch) -> RecordBatch {
    if table != "team_game_log" {
        return batch;
    }
    batch
        .into_iter()
        .map(|mut row| {
            if !row.contains_key(TEAM_GAME_ID) {
                if let Some(id) = team_game_id(&row) {
                    row.insert(TEAM_GAME_ID.to_string(), Value::Text(id));
                }
            }
            row
        })
        .collect()
}

fn team_game_id(row: &Row) -> Option<String> {
    let game = row.get("game_id").filter(|v| !v.is_null())?;
    let team = row.get("team_id").filter(|v| !v.is_null())?;
    Some(format!("{}_{}", game, team))
}

/// Look up a model by table name
pub fn by_table(table: &str) -> Option<ModelDescriptor> {
    [team(), team_game_log()]
        .into_iter()
        .find(|m| m.table_name() == table)
}
