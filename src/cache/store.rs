//! Snapshot persistence.
//!
//! Each cached response is one JSON file under the store root, named by its
//! [`CacheKey`]. Writes go through a temp file and an atomic rename so a
//! concurrent reader only ever observes a complete record.

use std::io::Write;
use std::path::PathBuf;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::fs;

use super::keys::CacheKey;

/// Errors raised by the snapshot store.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed snapshot record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Response headers as persisted in a snapshot record.
///
/// Encodes as a JSON object in original header order; a name that carries a
/// single value encodes as a string, repeated names collapse to an array.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SnapshotHeaders {
    entries: Vec<(String, Vec<String>)>,
}

impl SnapshotHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, collapsing into an existing entry for the same name.
    pub fn push(&mut self, name: &str, value: &str) {
        if let Some((_, values)) = self.entries.iter_mut().find(|(n, _)| n == name) {
            values.push(value.to_string());
        } else {
            self.entries
                .push((name.to_string(), vec![value.to_string()]));
        }
    }

    /// Iterate `(name, value)` pairs in stored order, one pair per value.
    pub fn iter_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(name, values)| {
            values.iter().map(move |value| (name.as_str(), value.as_str()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for SnapshotHeaders {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, values) in &self.entries {
            if values.len() == 1 {
                map.serialize_entry(name, &values[0])?;
            } else {
                map.serialize_entry(name, values)?;
            }
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl<'de> Deserialize<'de> for SnapshotHeaders {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = SnapshotHeaders;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of header names to a value or list of values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((name, value)) = access.next_entry::<String, OneOrMany>()? {
                    let values = match value {
                        OneOrMany::One(v) => vec![v],
                        OneOrMany::Many(vs) => vs,
                    };
                    entries.push((name, values));
                }
                Ok(SnapshotHeaders { entries })
            }
        }

        deserializer.deserialize_map(HeadersVisitor)
    }
}

/// A persisted full-page response: headers, rewritten body, and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub headers: SnapshotHeaders,
    pub body: String,
    pub status_code: u16,
    pub status: String,
}

/// Filesystem-backed snapshot storage rooted at a single directory.
#[derive(Debug)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Open a store rooted at the provided directory, creating it if necessary.
    pub fn open(root: PathBuf) -> Result<Self, SnapshotError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Whether a snapshot exists for the key. Storage errors read as absent.
    pub async fn exists(&self, key: &CacheKey) -> bool {
        fs::try_exists(self.path_for(key)).await.unwrap_or(false)
    }

    /// Load the snapshot for a key.
    ///
    /// A missing file is `Ok(None)`; a file that fails to decode is
    /// `Err(Malformed)` so the caller can purge it and fall through to a
    /// normal render.
    pub async fn read(&self, key: &CacheKey) -> Result<Option<ResponseSnapshot>, SnapshotError> {
        let bytes = match fs::read(self.path_for(key)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let snapshot = serde_json::from_slice(&bytes)?;
        Ok(Some(snapshot))
    }

    /// Persist a snapshot, replacing any prior record for the key.
    ///
    /// The record is written to a temp file in the store root and renamed
    /// into place, so readers see either the old or the new complete record.
    pub async fn write(
        &self,
        key: &CacheKey,
        snapshot: &ResponseSnapshot,
    ) -> Result<(), SnapshotError> {
        let bytes = serde_json::to_vec(snapshot)?;
        let root = self.root.clone();
        let target = self.path_for(key);

        tokio::task::spawn_blocking(move || -> Result<(), SnapshotError> {
            std::fs::create_dir_all(&root)?;
            let mut tmp = NamedTempFile::new_in(&root)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|err| err.error)?;
            Ok(())
        })
        .await
        .map_err(|err| SnapshotError::Io(std::io::Error::other(err)))?
    }

    /// Remove the snapshot for a key; absent entries are not an error.
    pub async fn delete(&self, key: &CacheKey) -> Result<(), SnapshotError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove every snapshot in the store. An empty or missing root succeeds.
    pub async fn delete_all(&self) -> Result<(), SnapshotError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> ResponseSnapshot {
        let mut headers = SnapshotHeaders::new();
        headers.push("content-type", "text/html; charset=utf-8");
        headers.push("set-cookie", "a=1");
        headers.push("set-cookie", "b=2");
        ResponseSnapshot {
            headers,
            body: "<html><body>hello</body></html>".to_string(),
            status_code: 200,
            status: "200 OK".to_string(),
        }
    }

    #[test]
    fn headers_collapse_duplicates_into_arrays() {
        let snapshot = sample_snapshot();
        let json = serde_json::to_value(&snapshot).expect("encode");
        assert_eq!(json["headers"]["content-type"], "text/html; charset=utf-8");
        assert_eq!(
            json["headers"]["set-cookie"],
            serde_json::json!(["a=1", "b=2"])
        );
    }

    #[test]
    fn record_encoding_round_trips() {
        let snapshot = sample_snapshot();
        let json = serde_json::to_string(&snapshot).expect("encode");
        let decoded: ResponseSnapshot = serde_json::from_str(&json).expect("decode");
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn empty_body_round_trips() {
        let snapshot = ResponseSnapshot {
            headers: SnapshotHeaders::new(),
            body: String::new(),
            status_code: 200,
            status: "200 OK".to_string(),
        };
        let json = serde_json::to_string(&snapshot).expect("encode");
        let decoded: ResponseSnapshot = serde_json::from_str(&json).expect("decode");
        assert_eq!(decoded, snapshot);
    }

    #[tokio::test]
    async fn write_then_read_returns_same_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::open(dir.path().join("pages")).expect("open");
        let key = CacheKey::for_path("/posts/hello");
        let snapshot = sample_snapshot();

        assert!(!store.exists(&key).await);
        store.write(&key, &snapshot).await.expect("write");
        assert!(store.exists(&key).await);

        let read = store.read(&key).await.expect("read").expect("present");
        assert_eq!(read, snapshot);
    }

    #[tokio::test]
    async fn write_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::open(dir.path().to_path_buf()).expect("open");
        let key = CacheKey::for_path("/");

        let mut first = sample_snapshot();
        first.body = "first".to_string();
        let mut second = sample_snapshot();
        second.body = "second".to_string();

        store.write(&key, &first).await.expect("write first");
        store.write(&key, &second).await.expect("write second");

        let read = store.read(&key).await.expect("read").expect("present");
        assert_eq!(read.body, "second");
    }

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::open(dir.path().to_path_buf()).expect("open");
        let key = CacheKey::for_path("/nowhere");
        assert!(store.read(&key).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn corrupt_record_reads_as_malformed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::open(dir.path().to_path_buf()).expect("open");
        let key = CacheKey::for_path("/broken");

        tokio::fs::write(dir.path().join(key.as_str()), b"not json")
            .await
            .expect("write corrupt file");

        assert!(matches!(
            store.read(&key).await,
            Err(SnapshotError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::open(dir.path().to_path_buf()).expect("open");
        let key = CacheKey::for_path("/gone");

        store.delete(&key).await.expect("delete absent");
        store.write(&key, &sample_snapshot()).await.expect("write");
        store.delete(&key).await.expect("delete present");
        assert!(!store.exists(&key).await);
    }

    #[tokio::test]
    async fn delete_all_clears_every_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::open(dir.path().to_path_buf()).expect("open");
        let keys: Vec<CacheKey> = ["/a", "/b", "/c"]
            .iter()
            .map(|p| CacheKey::for_path(p))
            .collect();

        for key in &keys {
            store.write(key, &sample_snapshot()).await.expect("write");
        }
        store.delete_all().await.expect("wipe");
        for key in &keys {
            assert!(!store.exists(key).await);
        }

        // A second wipe on the now-empty store also succeeds.
        store.delete_all().await.expect("wipe empty");
    }
}
