//! Statically built field catalogs
//!
//! A [`Schema`] is the ordered list of fields a record type is decoded into.
//! It is assembled once per dataset with [`SchemaBuilder`] and validated before
//! any row is read; decoding then dispatches on [`FieldKind`] only.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{ConfigurationError, FieldKind, FieldValue};

type Setter<R> = Arc<dyn Fn(&mut R, FieldValue) + Send + Sync>;
type Init<R> = Arc<dyn Fn() -> R + Send + Sync>;

/// One declared field: identifier, kind, optional bound column and setter
pub struct FieldSpec<R> {
    name: String,
    kind: FieldKind,
    column: Option<String>,
    setter: Setter<R>,
}

impl<R> FieldSpec<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub(crate) fn assign(&self, record: &mut R, value: FieldValue) {
        (self.setter)(record, value)
    }
}

impl<R> std::fmt::Debug for FieldSpec<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("column", &self.column)
            .finish_non_exhaustive()
    }
}

/// Validated, ordered field catalog for record type `R`
pub struct Schema<R> {
    fields: Vec<FieldSpec<R>>,
    init: Init<R>,
}

impl<R: Default + 'static> Schema<R> {
    /// Start a schema whose records begin as `R::default()`
    pub fn builder() -> SchemaBuilder<R> {
        SchemaBuilder::with_init(R::default)
    }
}

impl<R> Schema<R> {
    pub fn fields(&self) -> &[FieldSpec<R>] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&FieldSpec<R>> {
        self.fields.get(index)
    }

    pub(crate) fn new_record(&self) -> R {
        (self.init)()
    }
}

impl<R> std::fmt::Debug for Schema<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema").field("fields", &self.fields).finish()
    }
}

/// Builder for [`Schema`]
pub struct SchemaBuilder<R> {
    fields: Vec<FieldSpec<R>>,
    init: Init<R>,
}

impl<R: 'static> SchemaBuilder<R> {
    /// Start a schema whose records are produced by `init`
    pub fn with_init(init: impl Fn() -> R + Send + Sync + 'static) -> Self {
        Self {
            fields: Vec::new(),
            init: Arc::new(init),
        }
    }

    /// Declare a field of any kind
    ///
    /// The setter always receives a [`FieldValue`] of the declared kind.
    pub fn field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        column: Option<&str>,
        setter: impl Fn(&mut R, FieldValue) + Send + Sync + 'static,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            column: column.map(str::to_string),
            setter: Arc::new(setter),
        });
        self
    }

    pub fn text(self, name: &str, column: &str, set: fn(&mut R, String)) -> Self {
        self.field(name, FieldKind::Text, Some(column), move |record, value| {
            if let FieldValue::Text(v) = value {
                set(record, v)
            }
        })
    }

    pub fn boolean(self, name: &str, column: &str, set: fn(&mut R, bool)) -> Self {
        self.field(name, FieldKind::Boolean, Some(column), move |record, value| {
            if let FieldValue::Boolean(v) = value {
                set(record, v)
            }
        })
    }

    pub fn integer(self, name: &str, column: &str, set: fn(&mut R, i64)) -> Self {
        self.field(name, FieldKind::Integer, Some(column), move |record, value| {
            if let FieldValue::Integer(v) = value {
                set(record, v)
            }
        })
    }

    pub fn real(self, name: &str, column: &str, set: fn(&mut R, f64)) -> Self {
        self.field(name, FieldKind::Real, Some(column), move |record, value| {
            if let FieldValue::Real(v) = value {
                set(record, v)
            }
        })
    }

    pub fn list(self, name: &str, column: &str, set: fn(&mut R, Vec<String>)) -> Self {
        self.field(name, FieldKind::List, Some(column), move |record, value| {
            if let FieldValue::List(v) = value {
                set(record, v)
            }
        })
    }

    /// Validate and freeze the catalog
    pub fn build(self) -> Result<Schema<R>, ConfigurationError> {
        if self.fields.is_empty() {
            return Err(ConfigurationError::EmptySchema);
        }

        let mut names = HashSet::new();
        let mut columns: HashMap<&str, &str> = HashMap::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(ConfigurationError::DuplicateField(field.name.clone()));
            }
            if let Some(column) = field.column.as_deref() {
                if let Some(first) = columns.insert(column, field.name.as_str()) {
                    return Err(ConfigurationError::DuplicateColumn {
                        column: column.to_string(),
                        first: first.to_string(),
                        second: field.name.clone(),
                    });
                }
            }
        }

        Ok(Schema {
            fields: self.fields,
            init: self.init,
        })
    }
}
