//! OMDb-compatible title lookup
//!
//! `GET /v1/omdb?i=<id>` answers with a subset of the OMDb title body built
//! from the local title row. Lookup misses and malformed ids are reported in
//! the OMDb way: status 200 with `{"Response":"False","Error":...}`.

use axum::extract::{Query, State};
use axum::Json;
use imdb_common::ImdbId;
use imdb_ingest::datasets::TitleDetails;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::AppError;

const SERIES: &str = "tvSeries";

#[derive(Debug, Deserialize)]
pub struct OmdbQuery {
    /// IMDb id, with or without the `tt` prefix
    pub i: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OmdbTitle {
    pub title: String,
    pub year: String,
    pub runtime: String,
    pub genre: String,
    #[serde(rename = "imdbID")]
    pub imdb_id: String,
    #[serde(rename = "Type")]
    pub kind: String,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OmdbError {
    pub response: String,
    pub error: String,
}

impl OmdbError {
    fn new(error: &str) -> Self {
        Self {
            response: "False".into(),
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OmdbResponse {
    Found(OmdbTitle),
    Failed(OmdbError),
}

impl From<&TitleDetails> for OmdbTitle {
    fn from(title: &TitleDetails) -> Self {
        let (kind, year) = if title.title_type == SERIES {
            // Running series have no end year yet
            let end = match title.end_year {
                0 => String::new(),
                end => end.to_string(),
            };
            ("series", format!("{}-{}", title.start_year, end))
        } else {
            ("", title.start_year.to_string())
        };

        Self {
            title: title.primary_title.clone(),
            year,
            runtime: format!("{} mn", title.runtime_minutes),
            genre: title.genres.join(", "),
            imdb_id: title.tconst.clone(),
            kind: kind.into(),
            response: "True".into(),
        }
    }
}

pub async fn get_omdb_title(
    State(state): State<AppState>,
    Query(query): Query<OmdbQuery>,
) -> Result<Json<OmdbResponse>, AppError> {
    let Some(id) = query.i.as_deref().and_then(|raw| raw.parse::<ImdbId>().ok()) else {
        return Ok(Json(OmdbResponse::Failed(OmdbError::new("Incorrect IMDb ID."))));
    };

    let response = match state.titles.find_title(&id).await? {
        Some(title) => OmdbResponse::Found(OmdbTitle::from(&title)),
        None => OmdbResponse::Failed(OmdbError::new("Error getting data.")),
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use imdb_ingest::datasets::Title;
    use serde_json::json;

    fn details(kind: &str, start: i64, end: i64) -> TitleDetails {
        let title = Title {
            tconst: "tt0903747".into(),
            title_type: kind.into(),
            primary_title: "Breaking Bad".into(),
            original_title: "Breaking Bad".into(),
            start_year: start,
            end_year: end,
            runtime_minutes: 49,
            genres: vec!["Crime".into(), "Drama".into(), "Thriller".into()],
            ..Title::default()
        };
        TitleDetails::new(title, [])
    }

    #[test]
    fn test_series_year_range() {
        let omdb = OmdbTitle::from(&details("tvSeries", 2008, 2013));
        assert_eq!(omdb.year, "2008-2013");
        assert_eq!(omdb.kind, "series");

        let running = OmdbTitle::from(&details("tvSeries", 2008, 0));
        assert_eq!(running.year, "2008-");
    }

    #[test]
    fn test_movie_body() {
        let omdb = OmdbTitle::from(&details("movie", 2008, 0));
        assert_eq!(
            serde_json::to_value(OmdbResponse::Found(omdb)).unwrap(),
            json!({
                "Title": "Breaking Bad",
                "Year": "2008",
                "Runtime": "49 mn",
                "Genre": "Crime, Drama, Thriller",
                "imdbID": "tt0903747",
                "Type": "",
                "Response": "True",
            })
        );
    }

    #[test]
    fn test_error_body() {
        let body = OmdbResponse::Failed(OmdbError::new("Incorrect IMDb ID."));
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({"Response": "False", "Error": "Incorrect IMDb ID."})
        );
    }
}
