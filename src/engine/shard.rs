//! The shard map: which file owns which root key.
//!
//! Shard files are named `db_file_<n>.<ext>` with a monotonically growing
//! index. New root keys land in the *current* shard until it reaches the
//! per-file key cap, at which point a fresh file becomes current. The map is
//! only ever mutated under the engine's data mutex, so index generation
//! cannot race.

use std::collections::HashMap;

/// In-memory index from root key to owning shard file, plus per-file root-key
/// counts.
#[derive(Debug)]
pub struct ShardMap {
    key_to_file: HashMap<String, String>,
    file_counts: HashMap<String, usize>,
    current_file: Option<String>,
    max_keys_per_file: usize,
    extension: &'static str,
}

impl ShardMap {
    /// Creates an empty map producing `db_file_<n>.<extension>` names capped
    /// at `max_keys_per_file` root keys each.
    pub fn new(max_keys_per_file: usize, extension: &'static str) -> Self {
        ShardMap {
            key_to_file: HashMap::new(),
            file_counts: HashMap::new(),
            current_file: None,
            max_keys_per_file,
            extension,
        }
    }

    /// Returns the shard file holding `root`, assigning it to the current
    /// shard (opening a new one when the current shard is full or absent)
    /// if it has never been seen.
    pub fn assign(&mut self, root: &str) -> String {
        if let Some(file) = self.key_to_file.get(root) {
            return file.clone();
        }

        let current = match &self.current_file {
            Some(file) if self.count_of(file) < self.max_keys_per_file => file.clone(),
            _ => {
                let name = format!("db_file_{}.{}", self.file_counts.len() + 1, self.extension);
                self.file_counts.insert(name.clone(), 0);
                self.current_file = Some(name.clone());
                name
            }
        };

        self.key_to_file.insert(root.to_string(), current.clone());
        *self.file_counts.entry(current.clone()).or_insert(0) += 1;
        current
    }

    /// Returns the shard file holding `root`, if any.
    pub fn lookup(&self, root: &str) -> Option<&str> {
        self.key_to_file.get(root).map(String::as_str)
    }

    /// Rebuilds the map from on-disk state: one `(file name, top-level keys)`
    /// pair per shard file found in the data directory. The highest-numbered
    /// file is adopted as the current shard when it still has room, so a
    /// restart keeps filling it instead of opening a new file.
    pub fn restore(&mut self, files: Vec<(String, Vec<String>)>) {
        for (file, keys) in files {
            for key in &keys {
                self.key_to_file.insert(key.clone(), file.clone());
            }
            self.file_counts.insert(file, keys.len());
        }

        let newest = self
            .file_counts
            .keys()
            .filter_map(|file| file_index(file).map(|idx| (idx, file.clone())))
            .max_by_key(|(idx, _)| *idx);
        self.current_file = match newest {
            Some((_, file)) if self.count_of(&file) < self.max_keys_per_file => Some(file),
            _ => None,
        };
    }

    /// Drops `root` from the map after its last value was deleted from
    /// `file`. The file's count entry stays (at a lower value) so file-index
    /// generation remains monotonic.
    pub fn forget(&mut self, root: &str, file: &str) {
        if self.key_to_file.remove(root).is_some() {
            if let Some(count) = self.file_counts.get_mut(file) {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// The full root-key -> file-name index, for the diagnostic whole-view
    /// read.
    pub fn key_files(&self) -> &HashMap<String, String> {
        &self.key_to_file
    }

    /// Number of root keys currently attributed to `file`.
    pub fn count_of(&self, file: &str) -> usize {
        self.file_counts.get(file).copied().unwrap_or(0)
    }
}

/// Parses the `<n>` out of `db_file_<n>.<ext>`.
fn file_index(name: &str) -> Option<u64> {
    name.strip_prefix("db_file_")?.split('.').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_is_stable_for_known_keys() {
        let mut map = ShardMap::new(10, "json");
        let first = map.assign("users");
        assert_eq!(map.assign("users"), first);
        assert_eq!(map.count_of(&first), 1);
    }

    #[test]
    fn assign_rolls_over_at_the_cap() {
        let mut map = ShardMap::new(3, "json");
        for i in 0..7 {
            map.assign(&format!("k{}", i));
        }
        assert_eq!(map.count_of("db_file_1.json"), 3);
        assert_eq!(map.count_of("db_file_2.json"), 3);
        assert_eq!(map.count_of("db_file_3.json"), 1);
        assert_eq!(map.lookup("k0"), Some("db_file_1.json"));
        assert_eq!(map.lookup("k6"), Some("db_file_3.json"));
    }

    #[test]
    fn restore_adopts_underfull_newest_file() {
        let mut map = ShardMap::new(3, "json");
        map.restore(vec![
            ("db_file_1.json".to_string(), vec!["a".into(), "b".into(), "c".into()]),
            ("db_file_2.json".to_string(), vec!["d".into()]),
        ]);
        assert_eq!(map.lookup("d"), Some("db_file_2.json"));
        // the next new key keeps filling file 2 rather than opening file 3
        assert_eq!(map.assign("e"), "db_file_2.json");
        assert_eq!(map.count_of("db_file_2.json"), 2);
    }

    #[test]
    fn restore_with_full_newest_file_opens_a_fresh_one() {
        let mut map = ShardMap::new(2, "json");
        map.restore(vec![(
            "db_file_1.json".to_string(),
            vec!["a".into(), "b".into()],
        )]);
        assert_eq!(map.assign("c"), "db_file_2.json");
    }

    #[test]
    fn forget_releases_the_key_but_not_the_file_index() {
        let mut map = ShardMap::new(2, "json");
        map.assign("a");
        map.assign("b");
        map.forget("a", "db_file_1.json");
        assert_eq!(map.lookup("a"), None);
        assert_eq!(map.count_of("db_file_1.json"), 1);
        // file 1 is still the current shard and regains the freed slot
        assert_eq!(map.assign("c"), "db_file_1.json");
        // a new key after the cap opens index 2, not a reused index
        map.assign("d");
        assert_eq!(map.lookup("d"), Some("db_file_2.json"));
    }
}
