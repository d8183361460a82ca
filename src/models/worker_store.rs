//! # Worker Store
//!
//! The validated, ordered fleet for one run. Populated once before scheduling
//! begins and read-only afterwards, so it is shared without synchronization.

use super::worker_record::{WorkerId, WorkerRecord};
use crate::config::{ConfigResult, ConfigurationError};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Upper bound on worker files read into memory
const MAX_WORKER_FILE_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStore {
    records: Vec<WorkerRecord>,
}

impl WorkerStore {
    /// Build a store, rejecting empty fleets and duplicate identities
    pub fn new(records: Vec<WorkerRecord>) -> ConfigResult<Self> {
        if records.is_empty() {
            return Err(ConfigurationError::EmptyFleet);
        }

        let mut seen: HashMap<&WorkerId, usize> = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if let Some(first) = seen.insert(&record.identity, position + 1) {
                return Err(ConfigurationError::DuplicateWorker {
                    identity: record.identity.to_string(),
                    first,
                    second: position + 1,
                });
            }
        }

        Ok(Self { records })
    }

    /// Parse the delimited line format, one worker per line
    pub fn from_lines(input: &str) -> ConfigResult<Self> {
        let mut records = Vec::new();
        for (index, line) in input.lines().enumerate() {
            if let Some(record) = WorkerRecord::parse_line(index + 1, line)? {
                records.push(record);
            }
        }
        Self::new(records)
    }

    /// Parse a JSON array of worker records
    pub fn from_json(input: &str) -> ConfigResult<Self> {
        let records: Vec<WorkerRecord> = serde_json::from_str(input)
            .map_err(|e| ConfigurationError::parse_error("<json>", e))?;
        Self::new(records)
    }

    /// Load a worker file. `.json` files hold an array of records, anything
    /// else is read as delimited lines.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(&shown, e))?;
        if metadata.len() > MAX_WORKER_FILE_SIZE {
            return Err(ConfigurationError::file_read_error(
                &shown,
                format!(
                    "file is {} bytes, limit is {MAX_WORKER_FILE_SIZE}",
                    metadata.len()
                ),
            ));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(&shown, e))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let store = if is_json {
            let records: Vec<WorkerRecord> = serde_json::from_str(&contents)
                .map_err(|e| ConfigurationError::parse_error(&shown, e))?;
            Self::new(records)?
        } else {
            Self::from_lines(&contents)?
        };

        info!(file = %shown, workers = store.len(), "Worker fleet loaded");
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[WorkerRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WorkerRecord> {
        self.records.iter()
    }

    pub fn get(&self, identity: &WorkerId) -> Option<&WorkerRecord> {
        self.records.iter().find(|r| &r.identity == identity)
    }

    /// Identities of the whole fleet in load order
    pub fn identities(&self) -> Vec<WorkerId> {
        self.records.iter().map(|r| r.identity.clone()).collect()
    }

    /// Up to `len` records starting at `cursor`
    pub fn window(&self, cursor: usize, len: usize) -> &[WorkerRecord] {
        let start = cursor.min(self.records.len());
        let end = cursor.saturating_add(len).min(self.records.len());
        &self.records[start..end]
    }
}

impl<'a> IntoIterator for &'a WorkerStore {
    type Item = &'a WorkerRecord;
    type IntoIter = std::slice::Iter<'a, WorkerRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FLEET: &str = "\
# identity|proxy|concurrency
w1|http://u1:p1@10.0.0.1:3128
w2|10.0.0.2:3128:u2:p2|2

w3|socks5://u3:p3@10.0.0.3:1080
";

    #[test]
    fn test_from_lines_keeps_order() {
        let store = WorkerStore::from_lines(FLEET).unwrap();
        let ids: Vec<&str> = store.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(ids, vec!["w1", "w2", "w3"]);
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let input = "a|http://u:p@h:1\nb|http://u:p@h:2\na|http://u:p@h:3\n";
        match WorkerStore::from_lines(input) {
            Err(ConfigurationError::DuplicateWorker {
                identity,
                first,
                second,
            }) => {
                assert_eq!(identity, "a");
                assert_eq!((first, second), (1, 3));
            }
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_fleet_rejected() {
        assert_eq!(
            WorkerStore::from_lines("# nothing here\n\n"),
            Err(ConfigurationError::EmptyFleet)
        );
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let input = "w1|http://u:p@h:1\nbroken-line\n";
        match WorkerStore::from_lines(input) {
            Err(ConfigurationError::InvalidWorkerRecord { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected record error, got {other:?}"),
        }
    }

    #[test]
    fn test_json_identities_are_validated() {
        let json = r#"[{"identity":"bad id","egress_endpoint":"http://u:p@h:1"}]"#;
        assert!(WorkerStore::from_json(json).is_err());
    }

    #[test]
    fn test_json_numeric_identities_accepted() {
        let json = r#"[
            {"identity":7,"egress_endpoint":"http://u:p@h:1"},
            {"identity":"8","egress_endpoint":"http://u:p@h:2"}
        ]"#;
        let store = WorkerStore::from_json(json).unwrap();
        assert_eq!(store.identities(), vec![WorkerId::from(7u64), WorkerId::from(8u64)]);
    }

    #[test]
    fn test_json_identities_are_normalized_before_duplicate_check() {
        let json = r#"[
            {"identity":"a","egress_endpoint":"http://u:p@h:1"},
            {"identity":" a ","egress_endpoint":"http://u:p@h:2"}
        ]"#;
        match WorkerStore::from_json(json) {
            Err(ConfigurationError::DuplicateWorker { identity, first, second }) => {
                assert_eq!(identity, "a");
                assert_eq!((first, second), (1, 2));
            }
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn test_numeric_and_string_identities_collide() {
        let json = r#"[
            {"identity":7,"egress_endpoint":"http://u:p@h:1"},
            {"identity":"7","egress_endpoint":"http://u:p@h:2"}
        ]"#;
        assert!(matches!(
            WorkerStore::from_json(json),
            Err(ConfigurationError::DuplicateWorker { .. })
        ));
    }

    #[test]
    fn test_window_clamps_to_fleet() {
        let store = WorkerStore::from_lines(FLEET).unwrap();
        assert_eq!(store.window(0, 2).len(), 2);
        assert_eq!(store.window(2, 2).len(), 1);
        assert!(store.window(3, 2).is_empty());
        assert!(store.window(10, usize::MAX).is_empty());
    }

    #[test]
    fn test_load_detects_format_by_extension() {
        let mut lines = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(lines, "{FLEET}").unwrap();
        assert_eq!(WorkerStore::load(lines.path()).unwrap().len(), 3);

        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            json,
            r#"[{{"identity":"1","egress_endpoint":"http://u:p@h:1","concurrency_limit":3}}]"#
        )
        .unwrap();
        let store = WorkerStore::load(json.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(&WorkerId::from("1")).is_some());
    }

    #[test]
    fn test_missing_file_reported() {
        assert!(matches!(
            WorkerStore::load("/no/such/fleet.txt"),
            Err(ConfigurationError::FileReadError { .. })
        ));
    }
}
