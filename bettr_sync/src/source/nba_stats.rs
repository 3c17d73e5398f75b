//! NBA stats API: team game logs per season
//!
//! The API answers with named "result sets", each a header list plus rows of
//! positional values. These are reshaped into record batches with lowercased
//! column names.

use crate::error::SourceError;
use bettr_common::{RecordBatch, Row, Value};
use chrono::Datelike;
use serde::Deserialize;
use std::time::Duration;

const TEAM_GAME_LOGS_URL: &str = "https://stats.nba.com/stats/teamgamelogs";

/// The stats API rejects requests without browser-like headers
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) bettr_sync/0.1";
const REFERER: &str = "https://www.nba.com/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// First season pulled when no start year is given
pub const DEFAULT_START_YEAR: i32 = 2010;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    result_sets: Vec<ResultSet>,
}

/// One named table of a stats API response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    pub name: String,
    pub headers: Vec<String>,
    pub row_set: Vec<Vec<serde_json::Value>>,
}

impl ResultSet {
    /// Reshape positional rows into a batch keyed by lowercased header
    pub fn into_batch(self) -> Result<RecordBatch, SourceError> {
        let headers: Vec<String> = self.headers.iter().map(|h| h.to_lowercase()).collect();
        let mut batch = RecordBatch::new();

        for (i, values) in self.row_set.into_iter().enumerate() {
            if values.len() != headers.len() {
                return Err(SourceError::Shape(format!(
                    "{} row {} has {} values for {} headers",
                    self.name,
                    i,
                    values.len(),
                    headers.len()
                )));
            }

            let mut row = Row::new();
            for (header, json) in headers.iter().zip(values.iter()) {
                let value = Value::from_json(json).ok_or_else(|| {
                    SourceError::Shape(format!("{} row {}: {} is not a scalar", self.name, i, header))
                })?;
                row.insert(header.clone(), value);
            }
            batch.push(row);
        }

        Ok(batch)
    }
}

/// Decode a stats API response body and take the named result set
pub fn parse_result_set(body: &str, name: &str) -> Result<RecordBatch, SourceError> {
    let response: StatsResponse = serde_json::from_str(body)?;
    let set = response
        .result_sets
        .into_iter()
        .find(|s| s.name == name)
        .ok_or_else(|| SourceError::Shape(format!("no result set named {}", name)))?;
    set.into_batch()
}

/// Season label for the season starting in `year`: `2010` -> `"2010-11"`
pub fn season(year: i32) -> String {
    format!("{}-{:02}", year, (year + 1).rem_euclid(100))
}

/// Season labels for every start year in `start..=end`
pub fn seasons(start: i32, end: i32) -> Vec<String> {
    (start..=end).map(season).collect()
}

/// Current calendar year in US Central time
pub fn current_year() -> i32 {
    chrono::Utc::now().with_timezone(&chrono_tz::America::Chicago).year()
}

/// Fetch team game logs for one season
pub async fn fetch_team_game_logs(
    client: &reqwest::Client,
    season: &str,
    season_type: &str,
) -> Result<RecordBatch, SourceError> {
    log::info!("Pulling game data for {} season ({})", season, season_type);

    let response = client
        .get(TEAM_GAME_LOGS_URL)
        .query(&[
            ("LeagueID", "00"),
            ("Season", season),
            ("SeasonType", season_type),
        ])
        .header("User-Agent", USER_AGENT)
        .header("Referer", REFERER)
        .header("Accept", "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(SourceError::HttpStatus(response.status()));
    }

    let body = response.text().await?;
    let batch = parse_result_set(&body, "TeamGameLogs")?;
    log::info!("Fetched {} game log rows for {}", batch.len(), season);
    Ok(batch)
}

/// Fetch and concatenate team game logs for the seasons starting in `start..=end`
pub async fn fetch_team_game_logs_range(
    start: i32,
    end: i32,
    season_type: &str,
) -> Result<RecordBatch, SourceError> {
    let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

    let mut all = RecordBatch::new();
    for season in seasons(start, end) {
        let batch = fetch_team_game_logs(&client, &season, season_type).await?;
        all.extend(batch);
    }

    log::info!("Fetched {} game log rows for seasons {}-{}", all.len(), start, end);
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "resource": "teamgamelogs",
        "parameters": {"Season": "2023-24"},
        "resultSets": [{
            "name": "TeamGameLogs",
            "headers": ["SEASON_YEAR", "TEAM_ID", "GAME_ID", "WL", "PTS", "FG_PCT"],
            "rowSet": [
                ["2023-24", 1610612747, "0022300061", "L", 107, 0.412],
                ["2023-24", 1610612743, "0022300061", "W", 119, null]
            ]
        }]
    }"#;

    #[test]
    fn season_labels() {
        assert_eq!(season(2010), "2010-11");
        assert_eq!(season(1999), "1999-00");
        assert_eq!(season(2009), "2009-10");
        assert_eq!(seasons(2021, 2023), vec!["2021-22", "2022-23", "2023-24"]);
        assert!(seasons(2024, 2023).is_empty());
    }

    #[test]
    fn result_set_becomes_batch() {
        let batch = parse_result_set(BODY, "TeamGameLogs").unwrap();
        assert_eq!(batch.len(), 2);

        let first = &batch.rows()[0];
        assert_eq!(first["team_id"], Value::Int(1610612747));
        assert_eq!(first["game_id"], Value::from("0022300061"));
        assert_eq!(first["fg_pct"], Value::Float(0.412));
        assert_eq!(batch.rows()[1]["fg_pct"], Value::Null);
    }

    #[test]
    fn unknown_result_set_name() {
        let err = parse_result_set(BODY, "LeagueGameLog").unwrap_err();
        assert!(matches!(err, SourceError::Shape(_)));
    }

    #[test]
    fn ragged_row_is_rejected() {
        let body = r#"{"resultSets": [{"name": "T", "headers": ["A", "B"], "rowSet": [[1]]}]}"#;
        assert!(matches!(parse_result_set(body, "T"), Err(SourceError::Shape(_))));
    }

    #[test]
    fn nested_value_is_rejected() {
        let body = r#"{"resultSets": [{"name": "T", "headers": ["A"], "rowSet": [[[1, 2]]]}]}"#;
        assert!(matches!(parse_result_set(body, "T"), Err(SourceError::Shape(_))));
    }

    #[test]
    fn malformed_body_is_parse_error() {
        assert!(matches!(
            parse_result_set("<html>", "TeamGameLogs"),
            Err(SourceError::Parse(_))
        ));
    }
}
