//! Dynamic records for schemas declared at runtime

use serde::Serialize;

use super::{ConfigurationError, FieldKind, FieldValue, Schema, SchemaBuilder};

/// Parsed `name:kind[:column]` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDeclaration {
    pub name: String,
    pub kind: FieldKind,
    pub column: Option<String>,
}

impl std::str::FromStr for FieldDeclaration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let name = parts.next().unwrap_or_default().trim();
        let kind = parts
            .next()
            .ok_or_else(|| ConfigurationError::InvalidDeclaration(s.to_string()))?;
        let column = parts.next().map(str::trim).filter(|c| !c.is_empty());

        if name.is_empty() {
            return Err(ConfigurationError::InvalidDeclaration(s.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            kind: kind.trim().parse()?,
            column: column.map(str::to_string),
        })
    }
}

/// One decoded line as a list of values in field order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    pub values: Vec<FieldValue>,
}

impl Row {
    /// Build a schema whose records are [`Row`]s
    ///
    /// Fields that are not populated by a line keep their kind's zero value.
    pub fn schema(declarations: &[FieldDeclaration]) -> Result<Schema<Row>, ConfigurationError> {
        let zeros: Vec<FieldValue> = declarations.iter().map(|d| d.kind.zero()).collect();
        let builder = SchemaBuilder::with_init(move || Row {
            values: zeros.clone(),
        });

        declarations
            .iter()
            .enumerate()
            .fold(builder, |builder, (index, decl)| {
                builder.field(
                    decl.name.clone(),
                    decl.kind,
                    decl.column.as_deref(),
                    move |row: &mut Row, value| {
                        if let Some(slot) = row.values.get_mut(index) {
                            *slot = value;
                        }
                    },
                )
            })
            .build()
    }

    /// Render back to a tab-separated line
    pub fn to_line(&self) -> String {
        self.values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\t")
    }
}
