//! Memoization table from genotype to recorded fitness samples.
//!
//! The table has a fixed bucket count with separate chaining. The hash is a
//! deterministic content hash of the token sequence, so a reloaded table
//! reproduces the exact bucket layout of the run that exported it. The hash
//! only routes to a bucket; key equality is always the full token sequence.

use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engines::generation::genome::{Genotype, Token};
use crate::error::BtLearnError;

#[derive(Debug, Clone, PartialEq)]
struct CacheEntry {
    key: Genotype,
    values: Vec<f64>,
}

/// One exported line: a distinct key with its full sample list.
#[derive(Serialize, Deserialize)]
struct ExportedEntry {
    key: Genotype,
    values: Vec<f64>,
    count: usize,
}

#[derive(Debug)]
pub struct FitnessCache {
    buckets: Vec<Vec<CacheEntry>>,
    size: usize,
    n_samples: usize,
}

impl FitnessCache {
    pub fn new(size: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); size.max(1)],
            size: size.max(1),
            n_samples: 0,
        }
    }

    fn bucket_index(&self, key: &[Token]) -> usize {
        let mut hasher = DefaultHasher::new();
        for token in key {
            token.hash(&mut hasher);
        }
        (hasher.finish() % self.size as u64) as usize
    }

    /// Appends `value` to the sample list of `key`, creating the entry on
    /// first insert.
    pub fn insert(&mut self, key: &[Token], value: f64) {
        let index = self.bucket_index(key);
        let bucket = &mut self.buckets[index];
        match bucket.iter_mut().find(|entry| entry.key.as_slice() == key) {
            Some(entry) => entry.values.push(value),
            None => bucket.push(CacheEntry {
                key: key.to_vec(),
                values: vec![value],
            }),
        }
        self.n_samples += 1;
    }

    /// All samples recorded for `key`, or `None` on a miss.
    pub fn find(&self, key: &[Token]) -> Option<&[f64]> {
        let index = self.bucket_index(key);
        self.buckets[index]
            .iter()
            .find(|entry| entry.key.as_slice() == key)
            .map(|entry| entry.values.as_slice())
    }

    /// Cumulative number of samples across all keys.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.n_samples == 0
    }

    /// Writes one JSON line per distinct key with its full sample list.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<(), BtLearnError> {
        let mut file = File::create(path)?;
        for bucket in &self.buckets {
            for entry in bucket {
                let line = serde_json::to_string(&ExportedEntry {
                    key: entry.key.clone(),
                    values: entry.values.clone(),
                    count: entry.values.len(),
                })?;
                writeln!(file, "{}", line)?;
            }
        }
        Ok(())
    }

    /// Re-inserts every sample from an exported file. With the same bucket
    /// count this reproduces identical buckets and counts.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), BtLearnError> {
        let file = File::open(path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: ExportedEntry = serde_json::from_str(&line)?;
            for value in entry.values {
                self.insert(&entry.key, value);
            }
        }
        Ok(())
    }
}

impl PartialEq for FitnessCache {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.buckets == other.buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genotype(tokens: &[&str]) -> Genotype {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_insert_and_find() {
        let mut cache = FitnessCache::new(128);
        let key = genotype(&["s(", "c1", "a1", ")"]);
        assert!(cache.find(&key).is_none());

        cache.insert(&key, -3.0);
        cache.insert(&key, -1.0);
        assert_eq!(cache.find(&key), Some([-3.0, -1.0].as_slice()));
        assert_eq!(cache.n_samples(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_keys_do_not_collide_on_equality() {
        // a single bucket forces chaining; equality must still separate keys
        let mut cache = FitnessCache::new(1);
        let key1 = genotype(&["a1"]);
        let key2 = genotype(&["a2"]);
        cache.insert(&key1, 1.0);
        cache.insert(&key2, 2.0);
        assert_eq!(cache.find(&key1), Some([1.0].as_slice()));
        assert_eq!(cache.find(&key2), Some([2.0].as_slice()));
    }

    #[test]
    fn test_bucket_routing_is_deterministic() {
        let cache = FitnessCache::new(1024);
        let key = genotype(&["f(", "c1", "a1", ")"]);
        assert_eq!(cache.bucket_index(&key), cache.bucket_index(&key.clone()));
    }

    #[test]
    fn test_export_import_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache_log.jsonl");

        let mut cache = FitnessCache::new(64);
        cache.insert(&genotype(&["a1"]), -5.0);
        cache.insert(&genotype(&["a1"]), -4.5);
        cache.insert(&genotype(&["s(", "c1", "a1", ")"]), -2.0);
        cache.insert(&genotype(&["f(", "c2", "a2", ")"]), -1.0);
        cache.export(&path).unwrap();

        let mut reloaded = FitnessCache::new(64);
        reloaded.load(&path).unwrap();

        assert_eq!(reloaded, cache);
        assert_eq!(reloaded.n_samples(), cache.n_samples());
        for key in [
            genotype(&["a1"]),
            genotype(&["s(", "c1", "a1", ")"]),
            genotype(&["f(", "c2", "a2", ")"]),
        ] {
            assert_eq!(reloaded.find(&key), cache.find(&key));
        }
    }
}
