//! `title.episode`: links episodes to their parent series

use serde::{Deserialize, Serialize};

use crate::decode::{ConfigurationError, FieldValue, Schema};
use crate::store::StoredRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub tconst: String,
    pub parent_tconst: String,
    pub season_number: i64,
    pub episode_number: i64,
}

impl Episode {
    pub fn schema() -> Result<Schema<Episode>, ConfigurationError> {
        Schema::<Episode>::builder()
            .text("id", "tconst", |e, v| e.tconst = v)
            .text("parent_id", "parentTconst", |e, v| e.parent_tconst = v)
            .integer("season", "seasonNumber", |e, v| e.season_number = v)
            .integer("episode", "episodeNumber", |e, v| e.episode_number = v)
            .build()
    }
}

impl StoredRecord for Episode {
    const TABLE: &'static str = "imdb_episodes";
    const COLUMNS: &'static [&'static str] =
        &["tconst", "parent_tconst", "season_number", "episode_number"];
    const KEY: &'static [&'static str] = &["tconst"];

    fn to_values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Text(self.tconst.clone()),
            FieldValue::Text(self.parent_tconst.clone()),
            FieldValue::Integer(self.season_number),
            FieldValue::Integer(self.episode_number),
        ]
    }
}
