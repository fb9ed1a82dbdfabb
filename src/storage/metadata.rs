// Sidecar metadata store
//
// Each recording may carry a `<stem>.json` file next to the video with
// operator annotations. Records are replaced wholesale on save; a missing
// or unreadable sidecar reads as an empty record.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::naming::ArtifactKey;
use crate::recorder::error::MetadataError;

/// Operator annotations for one recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(default)]
    pub problems: BTreeSet<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Local>>,
}

impl MetadataRecord {
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty() && self.notes.is_empty()
    }

    pub fn has_problems(&self) -> bool {
        !self.problems.is_empty()
    }
}

/// Accept RFC 3339 as well as offset-less ISO-8601 timestamps
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Local>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Local)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

/// Reads and writes sidecar files in one directory
#[derive(Debug, Clone)]
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn sidecar_path(&self, key: &ArtifactKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.stem()))
    }

    /// Replace the record for `key` with exactly the given tags and notes
    ///
    /// The file is written beside its final name and renamed into place so
    /// readers never observe a half-written record.
    pub fn save<I, S>(
        &self,
        key: &ArtifactKey,
        problems: I,
        notes: &str,
    ) -> Result<MetadataRecord, MetadataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let record = MetadataRecord {
            problems: problems.into_iter().map(|p| p.as_ref().to_string()).collect(),
            notes: notes.to_string(),
            updated_at: Some(Local::now()),
        };

        let path = self.sidecar_path(key);
        let json = serde_json::to_string_pretty(&record)?;

        let io_err = |source| MetadataError::Io {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)?;

        log::info!(
            "Saved annotations for {} ({} problems)",
            key,
            record.problems.len()
        );
        Ok(record)
    }

    /// Read the record for `key`, or `None` if there is no sidecar
    pub fn try_load(&self, key: &ArtifactKey) -> Result<Option<MetadataRecord>, MetadataError> {
        let path = self.sidecar_path(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(MetadataError::Io { path, source }),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Read the record for `key`; absence or corruption yields an empty record
    pub fn load(&self, key: &ArtifactKey) -> MetadataRecord {
        match self.try_load(key) {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                log::warn!("Ignoring unreadable annotations for {}: {}", key, e);
                MetadataRecord::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key() -> ArtifactKey {
        let t = NaiveDate::from_ymd_opt(2025, 1, 7)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        ArtifactKey::new("ABC123", t)
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path());

        store.save(&key(), ["damaged"], "box crushed").unwrap();
        let record = store.load(&key());

        assert_eq!(record.problems, BTreeSet::from(["damaged".to_string()]));
        assert_eq!(record.notes, "box crushed");
        assert!(record.updated_at.is_some());
        assert!(dir.path().join("ABC123_20250107_143000.json").exists());
    }

    #[test]
    fn test_missing_record_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path());

        let record = store.load(&key());
        assert!(record.is_empty());
        assert!(record.updated_at.is_none());
        assert!(store.try_load(&key()).unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_without_merge() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path());

        store.save(&key(), ["damaged", "missing item"], "first").unwrap();
        store.save(&key(), ["wrong model"], "").unwrap();

        let record = store.load(&key());
        assert_eq!(record.problems, BTreeSet::from(["wrong model".to_string()]));
        assert_eq!(record.notes, "");
    }

    #[test]
    fn test_save_keeps_text_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path());

        store.save(&key(), [" damaged "], "  box crushed\n").unwrap();
        let record = store.load(&key());

        assert_eq!(record.problems, BTreeSet::from([" damaged ".to_string()]));
        assert_eq!(record.notes, "  box crushed\n");
    }

    #[test]
    fn test_corrupt_sidecar_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path());
        std::fs::write(store.sidecar_path(&key()), "{not json").unwrap();

        assert!(store.load(&key()).is_empty());
        assert!(store.try_load(&key()).is_err());
    }

    #[test]
    fn test_reads_offsetless_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path());
        std::fs::write(
            store.sidecar_path(&key()),
            r#"{"problems": ["damaged"], "notes": "", "updated_at": "2025-01-07T15:00:00.123456"}"#,
        )
        .unwrap();

        let record = store.load(&key());
        assert!(record.has_problems());
        assert!(record.updated_at.is_some());
    }
}
