//! In-process keyspace with Redis-like structures.
//!
//! Shared by [`crate::InMemoryStore`] and [`crate::LoopbackClient`]. Keys hold
//! exactly one structure; touching a key with the wrong structure is a
//! `WRONGTYPE` backend error. Collections that become empty are removed, and
//! expired keys are treated as absent.

use crate::error::{StoreError, StoreResult};
use crate::glob::KeyPattern;
use crate::keys::{self, MarkedEntry};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// Score wrapper with a total order (`f64::total_cmp`).
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Ordered set: members sorted by score, ties broken by member.
#[derive(Debug, Default, Clone)]
struct SortedSet {
    scores: HashMap<String, f64>,
    ordered: BTreeSet<(Score, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: f64) -> bool {
        match self.scores.insert(member.to_string(), score) {
            Some(old) => {
                self.ordered.remove(&(Score(old), member.to_string()));
                self.ordered.insert((Score(score), member.to_string()));
                false
            }
            None => {
                self.ordered.insert((Score(score), member.to_string()));
                true
            }
        }
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(old) => {
                self.ordered.remove(&(Score(old), member.to_string()));
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    fn range(&self, start: i64, end: i64) -> Vec<String> {
        let Some((from, to)) = rank_bounds(self.len(), start, end) else {
            return Vec::new();
        };
        self.ordered
            .iter()
            .skip(from)
            .take(to - from + 1)
            .map(|(_, member)| member.clone())
            .collect()
    }
}

/// Resolves a rank range against a collection of `len` elements.
///
/// Negative ranks count from the end (`-1` is the last element). Both ends are
/// clamped to `[0, len)`. Returns `None` for an empty window.
pub(crate) fn rank_bounds(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let resolve = |rank: i64| if rank < 0 { len + rank } else { rank };

    let start = resolve(start).max(0);
    let end = resolve(end).min(len - 1);
    if start > end || start >= len {
        return None;
    }
    Some((start as usize, end as usize))
}

#[derive(Debug, Clone)]
enum Value {
    SortedSet(SortedSet),
    Set(BTreeSet<String>),
    Hash(HashMap<String, String>),
    Str(String),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::SortedSet(_) => "zset",
            Value::Set(_) => "set",
            Value::Hash(_) => "hash",
            Value::Str(_) => "string",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Value::SortedSet(z) => z.len() == 0,
            Value::Set(s) => s.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::Str(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

fn wrong_type(key: &str, expected: &str, found: &Value) -> StoreError {
    StoreError::backend(format!(
        "WRONGTYPE key {key:?} holds a {}, not a {expected}",
        found.type_name()
    ))
}

/// A map of keys to Redis-like structures.
#[derive(Debug, Default, Clone)]
pub struct Keyspace {
    entries: HashMap<String, Entry>,
}

macro_rules! structure_mut {
    ($fn_name:ident, $variant:ident, $ty:ty, $label:literal) => {
        fn $fn_name(&mut self, key: &str) -> StoreResult<&mut $ty> {
            self.evict_if_expired(key);
            let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::$variant(Default::default()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::$variant(inner) => Ok(inner),
                other => Err(wrong_type(key, $label, other)),
            }
        }
    };
}

impl Keyspace {
    /// Creates an empty keyspace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.values().filter(|e| e.is_live(now)).count()
    }

    /// Returns true if no live key exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &str) -> Option<&Value> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| &e.value)
    }

    fn evict_if_expired(&mut self, key: &str) {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
        }
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(|e| e.value.is_empty()) {
            self.entries.remove(key);
        }
    }

    structure_mut!(zset_mut, SortedSet, SortedSet, "zset");
    structure_mut!(set_mut, Set, BTreeSet<String>, "set");
    structure_mut!(hash_mut, Hash, HashMap<String, String>, "hash");

    /// Adds or moves `member` in the ordered set at `key`. Returns true if added.
    pub fn zadd(&mut self, key: &str, member: &str, score: f64) -> StoreResult<bool> {
        Ok(self.zset_mut(key)?.insert(member, score))
    }

    /// Removes `member` from the ordered set at `key`. Returns true if removed.
    pub fn zrem(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        if self.live(key).is_none() {
            return Ok(false);
        }
        let removed = self.zset_mut(key)?.remove(member);
        self.drop_if_empty(key);
        Ok(removed)
    }

    /// Members of the ordered set at `key` within the rank window.
    pub fn zrange(&self, key: &str, start: i64, end: i64) -> StoreResult<Vec<String>> {
        match self.live(key) {
            None => Ok(Vec::new()),
            Some(Value::SortedSet(z)) => Ok(z.range(start, end)),
            Some(other) => Err(wrong_type(key, "zset", other)),
        }
    }

    /// Adds `member` to the set at `key`. Returns true if added.
    pub fn sadd(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self.set_mut(key)?.insert(member.to_string()))
    }

    /// Removes `member` from the set at `key`. Returns true if removed.
    pub fn srem(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        if self.live(key).is_none() {
            return Ok(false);
        }
        let removed = self.set_mut(key)?.remove(member);
        self.drop_if_empty(key);
        Ok(removed)
    }

    /// Members of the set at `key`.
    pub fn smembers(&self, key: &str) -> StoreResult<BTreeSet<String>> {
        match self.live(key) {
            None => Ok(BTreeSet::new()),
            Some(Value::Set(s)) => Ok(s.clone()),
            Some(other) => Err(wrong_type(key, "set", other)),
        }
    }

    /// Sets `field` of the hash at `key`. Returns true if the field is new.
    pub fn hset(&mut self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        Ok(self
            .hash_mut(key)?
            .insert(field.to_string(), value.to_string())
            .is_none())
    }

    /// Removes `field` from the hash at `key`. Returns true if it was present.
    pub fn hdel(&mut self, key: &str, field: &str) -> StoreResult<bool> {
        if self.live(key).is_none() {
            return Ok(false);
        }
        let removed = self.hash_mut(key)?.remove(field).is_some();
        self.drop_if_empty(key);
        Ok(removed)
    }

    /// Reads `field` of the hash at `key`.
    pub fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        match self.live(key) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(h.get(field).cloned()),
            Some(other) => Err(wrong_type(key, "hash", other)),
        }
    }

    /// Stores a string that expires after `ttl`, replacing any previous value.
    pub fn set_ex(&mut self, key: &str, value: &str, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
    }

    /// Reads the string at `key`.
    pub fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self.live(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(other) => Err(wrong_type(key, "string", other)),
        }
    }

    /// Deletes `key`. Returns true if a live key was removed.
    pub fn del(&mut self, key: &str) -> bool {
        let now = Instant::now();
        self.entries.remove(key).is_some_and(|e| e.is_live(now))
    }

    /// All live keys matching `pattern`.
    #[must_use]
    pub fn keys(&self, pattern: &KeyPattern) -> BTreeSet<String> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Drops every expired key. Returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before - self.entries.len()
    }

    /// Applies every live deletion marker and removes it.
    ///
    /// A record marker removes the primary key from every index key in its
    /// reverse mapping, then the mapping, the data hash and the marker. An
    /// index-entry marker removes one membership and its mapping entry.
    /// Returns the number of markers applied.
    pub fn sweep_markers(&mut self) -> StoreResult<usize> {
        self.purge_expired();
        let markers: Vec<String> = self
            .entries
            .keys()
            .filter(|k| keys::is_marker_key(k))
            .cloned()
            .collect();

        let mut applied = 0;
        for marker in markers {
            let Some(value) = self.get(&marker)? else {
                continue;
            };
            match keys::parse_marker(&marker, &value) {
                Some(MarkedEntry::Record { table, primary_key }) => {
                    let mapping = keys::reverse_mapping_key(&table, &primary_key);
                    for index_key in self.smembers(&mapping)? {
                        self.zrem(&index_key, &primary_key)?;
                    }
                    self.del(&mapping);
                    self.del(&keys::data_key(&table, &primary_key));
                    applied += 1;
                }
                Some(MarkedEntry::IndexEntry {
                    index_key,
                    table,
                    primary_key,
                }) => {
                    self.zrem(&index_key, &primary_key)?;
                    self.srem(&keys::reverse_mapping_key(&table, &primary_key), &index_key)?;
                    applied += 1;
                }
                None => {
                    tracing::debug!(marker = %marker, "dropping unreadable deletion marker");
                }
            }
            self.del(&marker);
        }
        Ok(applied)
    }
}
