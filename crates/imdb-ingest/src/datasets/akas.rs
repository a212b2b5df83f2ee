//! `title.akas`: localized and alternative titles
//!
//! Rows have no natural id. The stored key is (title id, region, language,
//! title) and the first row written for a key wins.

use serde::{Deserialize, Serialize};

use crate::decode::{ConfigurationError, FieldValue, Schema};
use crate::store::StoredRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleAka {
    pub title_id: String,
    pub title: String,
    pub region: String,
    pub language: String,
    pub is_original_title: bool,
}

impl TitleAka {
    pub fn schema() -> Result<Schema<TitleAka>, ConfigurationError> {
        Schema::<TitleAka>::builder()
            .text("id", "titleId", |a, v| a.title_id = v)
            .text("title", "title", |a, v| a.title = v)
            .text("region", "region", |a, v| a.region = v)
            .text("language", "language", |a, v| a.language = v)
            .boolean("is_original", "isOriginalTitle", |a, v| a.is_original_title = v)
            .build()
    }
}

impl StoredRecord for TitleAka {
    const TABLE: &'static str = "imdb_title_akas";
    const COLUMNS: &'static [&'static str] =
        &["title_id", "title", "region", "language", "is_original_title"];
    const KEY: &'static [&'static str] = &["title_id", "region", "language", "title"];

    fn to_values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Text(self.title_id.clone()),
            FieldValue::Text(self.title.clone()),
            FieldValue::Text(self.region.clone()),
            FieldValue::Text(self.language.clone()),
            FieldValue::Boolean(self.is_original_title),
        ]
    }
}
