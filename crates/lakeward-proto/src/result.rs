//! Query results.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Normalized result of a read-only query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Output column names, in projection order.
    pub columns: Vec<String>,
    /// Rows, each ordered like `columns`.
    pub rows: Vec<Vec<Value>>,
    /// Number of rows returned.
    pub row_count: usize,
}

impl QueryResult {
    /// Create a result; `row_count` is derived from `rows`.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
        }
    }

    /// Index of a column by name, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// All values of one column.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(idx)).collect())
    }

    /// Whether the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_count_follows_rows() {
        let result = QueryResult::new(
            vec!["a".into(), "B".into()],
            vec![
                vec![Value::Int64(1), Value::String("x".into())],
                vec![Value::Int64(2), Value::Null],
            ],
        );
        assert_eq!(result.row_count, 2);
        assert_eq!(result.column_index("b"), Some(1));
        let values = result.column_values("A").unwrap();
        assert_eq!(values, vec![&Value::Int64(1), &Value::Int64(2)]);
        assert!(!result.is_empty());
    }
}
