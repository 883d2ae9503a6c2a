//! Manifest assembly and file URL presigning.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lakeward_proto::{Manifest, ManifestColumn};
use thiserror::Error;

use crate::governance::TableInfo;

/// Turns a file location into a URL a reader may fetch until `expires_at`.
pub trait FilePresigner: Send + Sync {
    /// Presign one file location.
    fn presign(&self, path: &str, expires_at: DateTime<Utc>) -> String;
}

/// Returns locations unchanged. For deployments where readers access
/// storage with their own credentials.
#[derive(Debug, Default)]
pub struct PassthroughPresigner;

impl FilePresigner for PassthroughPresigner {
    fn presign(&self, path: &str, _expires_at: DateTime<Utc>) -> String {
        path.to_string()
    }
}

/// Error for a signing key that cannot be used.
#[derive(Debug, Error)]
pub enum PresignKeyError {
    #[error("invalid signing key: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("signing key must be 32 bytes, got {0}")]
    WrongLength(usize),
}

/// Signs `path` and expiry with a keyed BLAKE3 hash.
///
/// URLs have the form `{base}/{path}?expires={unix}&signature={hex}`; the
/// file server checks them with [`verify`](Self::verify).
pub struct SignedUrlPresigner {
    base_url: String,
    key: [u8; 32],
}

impl SignedUrlPresigner {
    /// Create a presigner with a 32-byte key.
    pub fn new(base_url: impl Into<String>, key: [u8; 32]) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key,
        }
    }

    /// Create a presigner from a hex-encoded 32-byte key.
    pub fn from_hex_key(
        base_url: impl Into<String>,
        key_hex: &str,
    ) -> Result<Self, PresignKeyError> {
        let bytes = hex::decode(key_hex.trim())?;
        let key = <[u8; 32]>::try_from(bytes.as_slice())
            .map_err(|_| PresignKeyError::WrongLength(bytes.len()))?;
        Ok(Self::new(base_url, key))
    }

    fn signature(&self, path: &str, expires: i64) -> blake3::Hash {
        let message = format!("{}\n{}", path, expires);
        blake3::keyed_hash(&self.key, message.as_bytes())
    }

    /// Check a signature produced by this presigner.
    pub fn verify(&self, path: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        if expires <= now.timestamp() {
            return false;
        }
        match blake3::Hash::from_hex(signature) {
            // Hash equality is constant-time.
            Ok(given) => given == self.signature(path, expires),
            Err(_) => false,
        }
    }
}

impl FilePresigner for SignedUrlPresigner {
    fn presign(&self, path: &str, expires_at: DateTime<Utc>) -> String {
        let expires = expires_at.timestamp();
        let signature = self.signature(path, expires);
        format!(
            "{}/{}?expires={}&signature={}",
            self.base_url,
            path.trim_start_matches('/'),
            expires,
            signature.to_hex()
        )
    }
}

/// Build a manifest for `table` valid for `ttl` from `now`.
pub fn build_manifest(
    table: &TableInfo,
    row_filters: Vec<String>,
    column_masks: BTreeMap<String, String>,
    presigner: &dyn FilePresigner,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Manifest {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
    let expires_at = now + ttl;

    Manifest {
        table: table.name.clone(),
        schema: table.schema.clone(),
        columns: table
            .columns
            .iter()
            .map(|c| ManifestColumn {
                name: c.name.clone(),
                data_type: c.data_type.clone(),
            })
            .collect(),
        files: table
            .files
            .iter()
            .map(|f| presigner.presign(f, expires_at))
            .collect(),
        row_filters,
        column_masks,
        expires_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::ColumnInfo;

    fn table() -> TableInfo {
        TableInfo {
            id: 1,
            catalog_id: 1,
            schema_id: 1,
            catalog: "lake".into(),
            schema: "main".into(),
            name: "titanic".into(),
            columns: vec![ColumnInfo::new("Pclass", "INTEGER")],
            owner: None,
            physical_name: vec![],
            files: vec!["warehouse/titanic/part-0.parquet".into()],
            size_bytes: 61_194,
        }
    }

    #[test]
    fn test_signed_urls_verify() {
        let presigner = SignedUrlPresigner::new("https://files.example.com/", [7u8; 32]);
        let now = Utc::now();
        let expires_at = now + chrono::Duration::hours(1);
        let url = presigner.presign("/warehouse/a.parquet", expires_at);
        assert!(url.starts_with("https://files.example.com/warehouse/a.parquet?expires="));

        let signature = url.rsplit("signature=").next().unwrap();
        let expires = expires_at.timestamp();
        assert!(presigner.verify("/warehouse/a.parquet", expires, signature, now));
        assert!(!presigner.verify("/warehouse/b.parquet", expires, signature, now));
        assert!(!presigner.verify("/warehouse/a.parquet", expires + 1, signature, now));
        assert!(!presigner.verify(
            "/warehouse/a.parquet",
            expires,
            signature,
            now + chrono::Duration::hours(2)
        ));
        assert!(!presigner.verify("/warehouse/a.parquet", expires, "zz", now));
    }

    #[test]
    fn test_hex_key() {
        let key = "00".repeat(32);
        assert!(SignedUrlPresigner::from_hex_key("http://x", &key).is_ok());
        assert!(matches!(
            SignedUrlPresigner::from_hex_key("http://x", "abcd"),
            Err(PresignKeyError::WrongLength(2))
        ));
        assert!(matches!(
            SignedUrlPresigner::from_hex_key("http://x", "not hex"),
            Err(PresignKeyError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_build_manifest() {
        let now = Utc::now();
        let mut masks = BTreeMap::new();
        masks.insert("Name".to_string(), "'***'".to_string());
        let manifest = build_manifest(
            &table(),
            vec!["\"Pclass\" = 1".into()],
            masks,
            &PassthroughPresigner,
            now,
            Duration::from_secs(3600),
        );
        assert_eq!(manifest.table, "titanic");
        assert_eq!(manifest.schema, "main");
        assert_eq!(manifest.files, vec!["warehouse/titanic/part-0.parquet"]);
        assert_eq!(manifest.columns[0].data_type, "INTEGER");
        assert_eq!(manifest.expires_at, now + chrono::Duration::hours(1));
        assert!(manifest.has_policies());
    }
}
