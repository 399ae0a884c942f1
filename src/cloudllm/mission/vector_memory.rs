//! Vector Memory Store (§4.2).
//!
//! One logical collection per mission. The real embedding backend is out of scope (§1); this
//! module supplies a deterministic, dependency-free bag-of-words scoring engine as its built-in
//! implementation so `query` stays total and side-effect-free for tests. Each collection is
//! additionally persisted as an append-only, hash-chained `.jsonl` log — the same idea as
//! [`crate::cloudllm::thought_chain::ThoughtChain`], adapted to memory items instead of agent
//! thoughts — so a collection surviving a process restart can be reloaded without a database.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::cloudllm::mission::error::MemoryError;

/// One stored memory item (§3 "Memory item").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub content: String,
    pub mime_type: String,
    pub metadata: HashMap<String, String>,
    pub timestamp: chrono::DateTime<Utc>,
    prev_hash: String,
    hash: String,
}

/// A single k-NN query hit, ranked by ascending distance.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub id: String,
    pub content: String,
    pub metadata: HashMap<String, String>,
    pub distance: f64,
}

#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub count: usize,
    pub directory: PathBuf,
    pub name: String,
}

fn hash_entry(prev_hash: &str, id: &str, content: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(id.as_bytes());
    hasher.update(content.as_bytes());
    hasher.update(timestamp.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn tokenize(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        *counts.entry(word.to_lowercase()).or_insert(0usize) += 1;
    }
    counts
}

/// Cosine similarity over bag-of-words term frequency vectors, in `[0.0, 1.0]`.
fn cosine_similarity(a: &HashMap<String, usize>, b: &HashMap<String, usize>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    for (term, count_a) in a {
        if let Some(count_b) = b.get(term) {
            dot += (*count_a as f64) * (*count_b as f64);
        }
    }
    let norm_a: f64 = a.values().map(|c| (*c as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|c| (*c as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// One mission-scoped vector collection, persisted under `<dir>/<name>.jsonl`.
pub struct VectorMemoryStore {
    name: String,
    directory: PathBuf,
    file_path: PathBuf,
    items: Vec<MemoryItem>,
    last_hash: String,
}

impl VectorMemoryStore {
    /// Open (creating if absent) a collection scoped to `directory`. Per §4.2, callers fall
    /// back to a user-level directory when no mission workspace exists.
    pub fn open(directory: &Path, name: &str) -> Result<Self, MemoryError> {
        fs::create_dir_all(directory)
            .map_err(|e| MemoryError::Engine(format!("cannot create {:?}: {e}", directory)))?;
        let file_path = directory.join(format!("{name}.jsonl"));

        let mut items = Vec::new();
        let mut last_hash = String::new();
        if file_path.exists() {
            let file = fs::File::open(&file_path)
                .map_err(|e| MemoryError::Engine(format!("cannot open {:?}: {e}", file_path)))?;
            for line in BufReader::new(file).lines() {
                let line = line
                    .map_err(|e| MemoryError::Engine(format!("read error: {e}")))?;
                if line.trim().is_empty() {
                    continue;
                }
                let item: MemoryItem = serde_json::from_str(&line)
                    .map_err(|e| MemoryError::Engine(format!("corrupt memory log entry: {e}")))?;
                last_hash = item.hash.clone();
                items.push(item);
            }
        }

        Ok(Self {
            name: name.to_string(),
            directory: directory.to_path_buf(),
            file_path,
            items,
            last_hash,
        })
    }

    fn append_to_disk(&mut self, item: &MemoryItem) -> Result<(), MemoryError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(|e| MemoryError::Engine(format!("cannot append {:?}: {e}", self.file_path)))?;
        let line = serde_json::to_string(item)
            .map_err(|e| MemoryError::Engine(format!("serialize error: {e}")))?;
        writeln!(file, "{line}")
            .map_err(|e| MemoryError::Engine(format!("write error: {e}")))?;
        Ok(())
    }

    /// Insert or replace a memory item. Deterministic by `id` if supplied, else random.
    /// Best-effort: a disk failure is logged and a blank id is returned rather than propagated
    /// (§4.2 "Failure ... returns empty results").
    pub fn upsert(
        &mut self,
        id: Option<String>,
        content: &str,
        mime_type: &str,
        mut metadata: HashMap<String, String>,
    ) -> String {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let timestamp = Utc::now();
        metadata
            .entry("timestamp".to_string())
            .or_insert_with(|| timestamp.to_rfc3339());

        let hash = hash_entry(&self.last_hash, &id, content, &timestamp.to_rfc3339());
        let item = MemoryItem {
            id: id.clone(),
            content: content.to_string(),
            mime_type: mime_type.to_string(),
            metadata,
            timestamp,
            prev_hash: self.last_hash.clone(),
            hash: hash.clone(),
        };

        if let Err(e) = self.append_to_disk(&item) {
            log::warn!(target: "mission::vector_memory", "upsert persistence failed for '{}': {e}", self.name);
        } else {
            self.last_hash = hash;
        }

        // replace any existing in-memory item with the same id (upsert semantics)
        self.items.retain(|existing| existing.id != id);
        self.items.push(item);
        id
    }

    /// Rank stored items by bag-of-words cosine similarity to `text`, optionally filtered by
    /// equality on metadata keys. Empty collections return an empty list, never an error.
    pub fn query(
        &self,
        text: &str,
        k: usize,
        filter: &HashMap<String, String>,
    ) -> Vec<QueryResult> {
        let query_terms = tokenize(text);
        let mut scored: Vec<QueryResult> = self
            .items
            .iter()
            .filter(|item| {
                filter
                    .iter()
                    .all(|(key, value)| item.metadata.get(key) == Some(value))
            })
            .map(|item| {
                let doc_terms = tokenize(&item.content);
                let similarity = cosine_similarity(&query_terms, &doc_terms);
                QueryResult {
                    id: item.id.clone(),
                    content: item.content.clone(),
                    metadata: item.metadata.clone(),
                    distance: 1.0 - similarity,
                }
            })
            .collect();
        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap());
        scored.truncate(k);
        scored
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        before != self.items.len()
    }

    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            count: self.items.len(),
            directory: self.directory.clone(),
            name: self.name.clone(),
        }
    }

    pub fn clear(&mut self) -> bool {
        self.items.clear();
        self.last_hash.clear();
        let _ = fs::remove_file(&self.file_path);
        true
    }

    /// Verify the hash chain on disk has not been tampered with.
    pub fn verify_integrity(&self) -> bool {
        let mut prev = String::new();
        for item in &self.items {
            if item.prev_hash != prev {
                return false;
            }
            let expected = hash_entry(&item.prev_hash, &item.id, &item.content, &item.timestamp.to_rfc3339());
            if expected != item.hash {
                return false;
            }
            prev = item.hash.clone();
        }
        true
    }
}
