//! `title.ratings`

use serde::{Deserialize, Serialize};

use crate::decode::{ConfigurationError, FieldValue, Schema};
use crate::store::StoredRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub tconst: String,
    pub average_rating: f64,
    pub num_votes: i64,
}

impl Rating {
    pub fn schema() -> Result<Schema<Rating>, ConfigurationError> {
        Schema::<Rating>::builder()
            .text("id", "tconst", |r, v| r.tconst = v)
            .real("rating", "averageRating", |r, v| r.average_rating = v)
            .integer("votes", "numVotes", |r, v| r.num_votes = v)
            .build()
    }
}

impl StoredRecord for Rating {
    const TABLE: &'static str = "imdb_ratings";
    const COLUMNS: &'static [&'static str] = &["tconst", "average_rating", "num_votes"];
    const KEY: &'static [&'static str] = &["tconst"];

    fn to_values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Text(self.tconst.clone()),
            FieldValue::Real(self.average_rating),
            FieldValue::Integer(self.num_votes),
        ]
    }
}
