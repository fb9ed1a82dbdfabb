// Recording catalog
//
// Lists what is on disk in an output directory. Only the file name is
// consulted to identify a recording, so a video written by a session that
// never stopped cleanly is listed like any other.

use chrono::{Local, NaiveDate};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::metadata::{MetadataRecord, MetadataStore};
use super::naming::ArtifactKey;

/// File extensions recognised as video artifacts
pub const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "avi", "y4m"];

/// One video artifact with its annotations
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingEntry {
    pub key: ArtifactKey,
    pub path: PathBuf,
    pub size: u64,
    pub metadata: MetadataRecord,
}

/// Filter for `Catalog::query`; `None` fields match everything
#[derive(Debug, Clone, Default)]
pub struct CatalogQuery {
    /// Case-insensitive substring of the tracking number
    pub search: Option<String>,
    /// First day included
    pub from: Option<NaiveDate>,
    /// Last day included
    pub to: Option<NaiveDate>,
    pub has_problems: Option<bool>,
}

impl CatalogQuery {
    pub fn matches(&self, entry: &RecordingEntry) -> bool {
        if let Some(search) = &self.search {
            let needle = search.trim().to_lowercase();
            if !entry.key.tracking_number.to_lowercase().contains(&needle) {
                return false;
            }
        }

        let day = entry.key.started_at.date();
        if self.from.is_some_and(|from| day < from) || self.to.is_some_and(|to| day > to) {
            return false;
        }

        match self.has_problems {
            Some(wanted) => entry.metadata.has_problems() == wanted,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSummary {
    pub total: usize,
    /// Recordings started on the reference day
    pub today: usize,
    pub with_problems: usize,
    pub total_bytes: u64,
    /// How many recordings carry each problem tag
    pub problem_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    dir: PathBuf,
    store: MetadataStore,
}

impl Catalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let store = MetadataStore::new(dir.clone());
        Self { dir, store }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// All recordings in the directory, newest first
    ///
    /// A directory that does not exist yet holds no recordings.
    pub fn scan(&self) -> std::io::Result<Vec<RecordingEntry>> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if !is_video_file(&path) {
                continue;
            }
            let Some(key) = ArtifactKey::parse_path(&path) else {
                log::debug!("Skipping unrecognised file {}", path.display());
                continue;
            };

            let size = dir_entry.metadata().map(|m| m.len()).unwrap_or(0);
            let metadata = self.store.load(&key);
            entries.push(RecordingEntry {
                key,
                path,
                size,
                metadata,
            });
        }

        entries.sort_by(|a, b| {
            b.key
                .started_at
                .cmp(&a.key.started_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(entries)
    }

    pub fn query(&self, query: &CatalogQuery) -> std::io::Result<Vec<RecordingEntry>> {
        Ok(self.scan()?.into_iter().filter(|e| query.matches(e)).collect())
    }

    /// Counts over every recording; `today` is relative to `reference_day`
    pub fn summary_for(&self, reference_day: NaiveDate) -> std::io::Result<CatalogSummary> {
        let mut summary = CatalogSummary::default();
        for entry in self.scan()? {
            summary.total += 1;
            summary.total_bytes += entry.size;
            if entry.key.started_at.date() == reference_day {
                summary.today += 1;
            }
            if entry.metadata.has_problems() {
                summary.with_problems += 1;
            }
            for problem in entry.metadata.problems {
                *summary.problem_distribution.entry(problem).or_default() += 1;
            }
        }
        Ok(summary)
    }

    pub fn summary(&self) -> std::io::Result<CatalogSummary> {
        self.summary_for(Local::now().date_naive())
    }
}

fn is_video_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str, len: usize) {
        std::fs::write(dir.join(name), vec![0u8; len]).unwrap();
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_scan_sorts_newest_first_and_skips_noise() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "OLD1_20250101_080000.mp4", 10);
        touch(dir.path(), "NEW_2_20250107_143000.y4m", 20);
        touch(dir.path(), "notes.txt", 1);
        touch(dir.path(), "garbage.mp4", 1);

        let entries = Catalog::new(dir.path()).scan().unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.key.tracking_number.as_str()).collect();
        assert_eq!(ids, vec!["NEW_2", "OLD1"]);
        assert_eq!(entries[0].size, 20);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path().join("never-created"));
        assert!(catalog.scan().unwrap().is_empty());
    }

    #[test]
    fn test_query_filters() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "SF100_20250105_090000.mp4", 1);
        touch(dir.path(), "sf200_20250107_100000.mp4", 1);
        touch(dir.path(), "YT300_20250110_110000.mp4", 1);

        let catalog = Catalog::new(dir.path());
        let key = ArtifactKey::parse("sf200_20250107_100000.mp4").unwrap();
        catalog.store().save(&key, ["damaged"], "").unwrap();

        let search = CatalogQuery {
            search: Some("SF".into()),
            ..Default::default()
        };
        assert_eq!(catalog.query(&search).unwrap().len(), 2);

        let range = CatalogQuery {
            from: Some(day(2025, 1, 6)),
            to: Some(day(2025, 1, 10)),
            ..Default::default()
        };
        assert_eq!(catalog.query(&range).unwrap().len(), 2);

        let problems = CatalogQuery {
            has_problems: Some(true),
            ..Default::default()
        };
        let hits = catalog.query(&problems).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.tracking_number, "sf200");

        let clean = CatalogQuery {
            has_problems: Some(false),
            ..Default::default()
        };
        assert_eq!(catalog.query(&clean).unwrap().len(), 2);
    }

    #[test]
    fn test_summary_counts() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "A1_20250107_090000.mp4", 5);
        touch(dir.path(), "A2_20250107_100000.mp4", 7);
        touch(dir.path(), "A3_20250106_100000.mp4", 3);

        let catalog = Catalog::new(dir.path());
        for (name, problems) in [
            ("A1_20250107_090000", vec!["damaged", "wrong item"]),
            ("A3_20250106_100000", vec!["damaged"]),
        ] {
            let key = ArtifactKey::parse(name).unwrap();
            catalog.store().save(&key, problems, "").unwrap();
        }

        let summary = catalog.summary_for(day(2025, 1, 7)).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.today, 2);
        assert_eq!(summary.with_problems, 2);
        assert_eq!(summary.total_bytes, 15);
        assert_eq!(summary.problem_distribution.get("damaged"), Some(&2));
        assert_eq!(summary.problem_distribution.get("wrong item"), Some(&1));
    }
}
