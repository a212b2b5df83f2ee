//! `title.basics`: one row per title

use serde::{Deserialize, Serialize};

use super::TitleAka;
use crate::decode::{ConfigurationError, FieldValue, Schema};
use crate::store::StoredRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Title {
    pub tconst: String,
    pub title_type: String,
    pub primary_title: String,
    pub original_title: String,
    pub is_adult: bool,
    pub start_year: i64,
    pub end_year: i64,
    pub runtime_minutes: i64,
    pub genres: Vec<String>,
}

impl Title {
    pub fn schema() -> Result<Schema<Title>, ConfigurationError> {
        Schema::<Title>::builder()
            .text("id", "tconst", |t, v| t.tconst = v)
            .text("type", "titleType", |t, v| t.title_type = v)
            .text("title", "primaryTitle", |t, v| t.primary_title = v)
            .text("original_title", "originalTitle", |t, v| t.original_title = v)
            .boolean("is_adult", "isAdult", |t, v| t.is_adult = v)
            .integer("year", "startYear", |t, v| t.start_year = v)
            .integer("end_year", "endYear", |t, v| t.end_year = v)
            .integer("runtime_minutes", "runtimeMinutes", |t, v| t.runtime_minutes = v)
            .list("genres", "genres", |t, v| t.genres = v)
            .build()
    }
}

impl StoredRecord for Title {
    const TABLE: &'static str = "imdb_titles";
    const COLUMNS: &'static [&'static str] = &[
        "tconst",
        "title_type",
        "primary_title",
        "original_title",
        "is_adult",
        "start_year",
        "end_year",
        "runtime_minutes",
        "genres",
    ];
    const KEY: &'static [&'static str] = &["tconst"];

    fn to_values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Text(self.tconst.clone()),
            FieldValue::Text(self.title_type.clone()),
            FieldValue::Text(self.primary_title.clone()),
            FieldValue::Text(self.original_title.clone()),
            FieldValue::Boolean(self.is_adult),
            FieldValue::Integer(self.start_year),
            FieldValue::Integer(self.end_year),
            FieldValue::Integer(self.runtime_minutes),
            FieldValue::List(self.genres.clone()),
        ]
    }
}

/// A title and its alternative titles, as served by point lookups
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleDetails {
    #[serde(rename = "imdb")]
    pub tconst: String,
    #[serde(rename = "type")]
    pub title_type: String,
    #[serde(rename = "title")]
    pub primary_title: String,
    pub original_title: String,
    pub is_adult: bool,
    pub start_year: i64,
    pub end_year: i64,
    pub runtime_minutes: i64,
    pub genres: Vec<String>,
    pub akas: Vec<AkaSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AkaSummary {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub language: String,
    pub title: String,
}

impl From<TitleAka> for AkaSummary {
    fn from(aka: TitleAka) -> Self {
        Self {
            region: aka.region,
            language: aka.language,
            title: aka.title,
        }
    }
}

impl TitleDetails {
    pub fn new(title: Title, akas: impl IntoIterator<Item = AkaSummary>) -> Self {
        Self {
            tconst: title.tconst,
            title_type: title.title_type,
            primary_title: title.primary_title,
            original_title: title.original_title,
            is_adult: title.is_adult,
            start_year: title.start_year,
            end_year: title.end_year,
            runtime_minutes: title.runtime_minutes,
            genres: title.genres,
            akas: akas.into_iter().collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_details_json_keys() {
        let title = Title {
            tconst: "tt0000001".into(),
            title_type: "short".into(),
            primary_title: "Carmencita".into(),
            original_title: "Carmencita".into(),
            start_year: 1894,
            runtime_minutes: 1,
            genres: vec!["Documentary".into(), "Short".into()],
            ..Title::default()
        };
        let akas = [
            AkaSummary {
                region: "DE".into(),
                language: String::new(),
                title: "Carmencita - spanischer Tanz".into(),
            },
            AkaSummary {
                region: String::new(),
                language: String::new(),
                title: "Carmencita".into(),
            },
        ];

        let body = serde_json::to_value(TitleDetails::new(title, akas)).unwrap();
        assert_eq!(
            body,
            json!({
                "imdb": "tt0000001",
                "type": "short",
                "title": "Carmencita",
                "originalTitle": "Carmencita",
                "isAdult": false,
                "startYear": 1894,
                "endYear": 0,
                "runtimeMinutes": 1,
                "genres": ["Documentary", "Short"],
                "akas": [
                    {"region": "DE", "title": "Carmencita - spanischer Tanz"},
                    {"title": "Carmencita"},
                ],
            })
        );
    }
}
