//! Read manifests.
//!
//! A manifest hands an already-authorized principal the file list of a
//! table together with the row-filter predicates and column-mask
//! expressions that the downstream reader must enforce itself. Manifests
//! are built on demand and never persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A column in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestColumn {
    /// Column name.
    pub name: String,
    /// Declared data type.
    pub data_type: String,
}

/// Time-boxed bundle describing how to read a table's files directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Table name.
    pub table: String,
    /// Schema name.
    pub schema: String,
    /// Table columns.
    pub columns: Vec<ManifestColumn>,
    /// File locations, presigned where the deployment supports it.
    pub files: Vec<String>,
    /// Unevaluated row-filter predicates. All of them must hold.
    pub row_filters: Vec<String>,
    /// Unevaluated mask expressions keyed by column name.
    pub column_masks: BTreeMap<String, String>,
    /// Instant after which the manifest and its file URLs are void.
    pub expires_at: DateTime<Utc>,
}

impl Manifest {
    /// Whether the manifest is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the reader must apply any policy before returning rows.
    pub fn has_policies(&self) -> bool {
        !self.row_filters.is_empty() || !self.column_masks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expiry_and_policies() {
        let now = Utc::now();
        let manifest = Manifest {
            table: "titanic".into(),
            schema: "main".into(),
            columns: vec![],
            files: vec![],
            row_filters: vec!["\"Pclass\" = 1".into()],
            column_masks: BTreeMap::new(),
            expires_at: now + Duration::hours(1),
        };
        assert!(!manifest.is_expired_at(now));
        assert!(manifest.is_expired_at(now + Duration::hours(2)));
        assert!(manifest.has_policies());
    }

    #[test]
    fn test_json_shape() {
        let manifest = Manifest {
            table: "titanic".into(),
            schema: "main".into(),
            columns: vec![ManifestColumn {
                name: "Name".into(),
                data_type: "TEXT".into(),
            }],
            files: vec!["s3://lake/main/titanic/part-0.parquet".into()],
            row_filters: vec![],
            column_masks: BTreeMap::from([("Name".to_string(), "'***'".to_string())]),
            expires_at: "2026-01-01T00:00:00Z".parse().unwrap(),
        };
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["columns"][0]["data_type"], "TEXT");
        assert_eq!(json["column_masks"]["Name"], "'***'");
        assert_eq!(json["expires_at"], "2026-01-01T00:00:00Z");

        let back: Manifest = serde_json::from_value(json).unwrap();
        assert_eq!(back, manifest);
    }
}
