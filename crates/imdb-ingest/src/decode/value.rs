//! Field kinds and decoded values

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{ConfigurationError, LIST_SEPARATOR};

/// Declared kind of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Boolean,
    Integer,
    Real,
    List,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Boolean => "boolean",
            FieldKind::Integer => "integer",
            FieldKind::Real => "real",
            FieldKind::List => "list",
        }
    }

    /// Value an absent cell decodes to
    pub fn zero(self) -> FieldValue {
        match self {
            FieldKind::Text => FieldValue::Text(String::new()),
            FieldKind::Boolean => FieldValue::Boolean(false),
            FieldKind::Integer => FieldValue::Integer(0),
            FieldKind::Real => FieldValue::Real(0.0),
            FieldKind::List => FieldValue::List(Vec::new()),
        }
    }

    /// Coerce a raw cell into a value of this kind
    ///
    /// The empty string and every token in `empty_values` decode to
    /// [`FieldKind::zero`]; text is the exception and keeps sentinels only
    /// when they are not configured.
    pub(crate) fn coerce(
        self,
        raw: &str,
        empty_values: &HashSet<String>,
        normalize: Option<fn(&str) -> String>,
    ) -> Result<FieldValue, String> {
        if raw.is_empty() || empty_values.contains(raw) {
            return Ok(self.zero());
        }

        match self {
            FieldKind::Text => Ok(FieldValue::Text(match normalize {
                Some(normalize) => normalize(raw),
                None => raw.to_string(),
            })),
            FieldKind::Boolean => parse_bool(raw).map(FieldValue::Boolean),
            FieldKind::Integer => raw
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|e| e.to_string()),
            FieldKind::Real => raw
                .parse::<f64>()
                .map(FieldValue::Real)
                .map_err(|e| e.to_string()),
            FieldKind::List => Ok(FieldValue::List(
                raw.split(LIST_SEPARATOR).map(str::to_string).collect(),
            )),
        }
    }
}

/// Accepts the textual and numeric flag spellings used by the datasets
fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err("expected true/false or 1/0".to_string()),
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FieldKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "string" => Ok(FieldKind::Text),
            "bool" | "boolean" => Ok(FieldKind::Boolean),
            "int" | "integer" => Ok(FieldKind::Integer),
            "real" | "float" => Ok(FieldKind::Real),
            "list" | "array" => Ok(FieldKind::List),
            _ => Err(ConfigurationError::UnsupportedKind(s.to_string())),
        }
    }
}

/// A decoded cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Boolean(bool),
    Integer(i64),
    Real(f64),
    List(Vec<String>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Boolean(_) => FieldKind::Boolean,
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Real(_) => FieldKind::Real,
            FieldValue::List(_) => FieldKind::List,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

/// Renders the value back into dataset cell syntax
impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Boolean(b) => f.write_str(if *b { "1" } else { "0" }),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Real(r) => write!(f, "{r}"),
            FieldValue::List(items) => f.write_str(&items.join(",")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sentinels() -> HashSet<String> {
        HashSet::from(["\\N".to_string()])
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("TEXT".parse::<FieldKind>().unwrap(), FieldKind::Text);
        assert_eq!("bool".parse::<FieldKind>().unwrap(), FieldKind::Boolean);
        assert_eq!("float".parse::<FieldKind>().unwrap(), FieldKind::Real);
        assert_eq!("array".parse::<FieldKind>().unwrap(), FieldKind::List);
        assert_eq!(
            "date".parse::<FieldKind>(),
            Err(ConfigurationError::UnsupportedKind("date".to_string()))
        );
    }

    #[test]
    fn test_sentinel_and_empty_decode_to_zero() {
        let empty = sentinels();
        for kind in [
            FieldKind::Text,
            FieldKind::Boolean,
            FieldKind::Integer,
            FieldKind::Real,
            FieldKind::List,
        ] {
            assert_eq!(kind.coerce("\\N", &empty, None).unwrap(), kind.zero());
            assert_eq!(kind.coerce("", &empty, None).unwrap(), kind.zero());
        }
    }

    #[test]
    fn test_sentinel_is_literal_without_configuration() {
        let none = HashSet::new();
        assert_eq!(
            FieldKind::Text.coerce("\\N", &none, None).unwrap(),
            FieldValue::Text("\\N".to_string())
        );
        assert!(FieldKind::Integer.coerce("\\N", &none, None).is_err());
    }

    #[test]
    fn test_coerce_values() {
        let none = HashSet::new();
        assert_eq!(FieldKind::Integer.coerce("07", &none, None).unwrap(), FieldValue::Integer(7));
        assert_eq!(FieldKind::Real.coerce("5.7", &none, None).unwrap(), FieldValue::Real(5.7));
        assert_eq!(FieldKind::Boolean.coerce("1", &none, None).unwrap(), FieldValue::Boolean(true));
        assert_eq!(
            FieldKind::Boolean.coerce("false", &none, None).unwrap(),
            FieldValue::Boolean(false)
        );
        assert_eq!(
            FieldKind::List.coerce("Documentary,Short", &none, None).unwrap(),
            FieldValue::List(vec!["Documentary".to_string(), "Short".to_string()])
        );
    }

    #[test]
    fn test_coerce_rejects_malformed() {
        let none = HashSet::new();
        assert!(FieldKind::Boolean.coerce("yes", &none, None).is_err());
        assert!(FieldKind::Integer.coerce("12a", &none, None).is_err());
        assert!(FieldKind::Integer.coerce("99999999999999999999", &none, None).is_err());
        assert!(FieldKind::Real.coerce("1,5", &none, None).is_err());
    }

    #[test]
    fn test_text_normalizer_applies_to_text_only() {
        let none = HashSet::new();
        let upper: fn(&str) -> String = |s| s.to_uppercase();
        assert_eq!(
            FieldKind::Text.coerce("abc", &none, Some(upper)).unwrap(),
            FieldValue::Text("ABC".to_string())
        );
        assert_eq!(
            FieldKind::List.coerce("a,b", &none, Some(upper)).unwrap(),
            FieldValue::List(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_display_renders_cell_syntax() {
        assert_eq!(FieldValue::Integer(7).to_string(), "7");
        assert_eq!(FieldValue::Boolean(false).to_string(), "0");
        assert_eq!(FieldValue::Real(5.5).to_string(), "5.5");
        assert_eq!(
            FieldValue::List(vec!["Drama".to_string(), "Short".to_string()]).to_string(),
            "Drama,Short"
        );
    }
}
