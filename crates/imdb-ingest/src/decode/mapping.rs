//! Header-to-field resolution

use super::Schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingMode {
    /// Only columns named by a field binding populate fields
    Bound,
    /// Column `i` populates field `i`
    Positional,
}

/// Column → field index table for one input stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    mode: MappingMode,
    targets: Vec<Option<usize>>,
    field_count: usize,
}

impl FieldMapping {
    /// Resolve a header against a schema
    ///
    /// If no declared column matches any header column, every column maps
    /// positionally; columns past the last field are ignored.
    pub fn resolve<R>(header: &[&str], schema: &Schema<R>) -> Self {
        let targets: Vec<Option<usize>> = header
            .iter()
            .map(|column| {
                schema
                    .fields()
                    .iter()
                    .position(|field| field.column() == Some(*column))
            })
            .collect();

        let mode = if targets.iter().any(Option::is_some) {
            MappingMode::Bound
        } else {
            MappingMode::Positional
        };

        Self {
            mode,
            targets,
            field_count: schema.len(),
        }
    }

    pub fn mode(&self) -> MappingMode {
        self.mode
    }

    /// Field index populated by the column at `column`, if any
    pub fn target(&self, column: usize) -> Option<usize> {
        match self.mode {
            MappingMode::Bound => self.targets.get(column).copied().flatten(),
            MappingMode::Positional => (column < self.field_count).then_some(column),
        }
    }

    /// Number of header columns that populate a field
    pub fn mapped_columns(&self) -> usize {
        match self.mode {
            MappingMode::Bound => self.targets.iter().filter(|t| t.is_some()).count(),
            MappingMode::Positional => self.targets.len().min(self.field_count),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Pair {
        left: String,
        right: String,
    }

    fn schema() -> Schema<Pair> {
        Schema::<Pair>::builder()
            .text("left", "a", |p, v| p.left = v)
            .text("right", "b", |p, v| p.right = v)
            .build()
            .unwrap()
    }

    #[test]
    fn test_bound_mapping_ignores_unknown_columns() {
        let mapping = FieldMapping::resolve(&["x", "b", "a"], &schema());
        assert_eq!(mapping.mode(), MappingMode::Bound);
        assert_eq!(mapping.target(0), None);
        assert_eq!(mapping.target(1), Some(1));
        assert_eq!(mapping.target(2), Some(0));
        assert_eq!(mapping.target(3), None);
        assert_eq!(mapping.mapped_columns(), 2);
    }

    #[test]
    fn test_single_binding_selects_bound_mode() {
        let mapping = FieldMapping::resolve(&["b", "y"], &schema());
        assert_eq!(mapping.mode(), MappingMode::Bound);
        assert_eq!(mapping.target(0), Some(1));
        assert_eq!(mapping.target(1), None);
    }

    #[test]
    fn test_positional_fallback() {
        let mapping = FieldMapping::resolve(&["x", "y", "z"], &schema());
        assert_eq!(mapping.mode(), MappingMode::Positional);
        assert_eq!(mapping.target(0), Some(0));
        assert_eq!(mapping.target(1), Some(1));
        assert_eq!(mapping.target(2), None);
        assert_eq!(mapping.mapped_columns(), 2);
    }
}
