//! Command-based adapter for networked stores.
//!
//! [`CommandStore`] expresses the [`KeyValueStore`] contract as Redis-style
//! commands and sends them through a [`CommandClient`]. The wire client is
//! abstracted so any driver (or the in-process [`LoopbackClient`]) can be used.

use crate::error::{StoreError, StoreResult};
use crate::glob::KeyPattern;
use crate::keys::{self, MarkedEntry};
use crate::keyspace::Keyspace;
use crate::store::KeyValueStore;
use crate::ttl::DeletionTtl;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// A store command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `ZADD key score member`
    ZAdd {
        /// Ordered set key.
        key: String,
        /// Member score.
        score: f64,
        /// Member.
        member: String,
    },
    /// `ZREM key member`
    ZRem {
        /// Ordered set key.
        key: String,
        /// Member.
        member: String,
    },
    /// `ZRANGE key start stop`
    ZRange {
        /// Ordered set key.
        key: String,
        /// First rank.
        start: i64,
        /// Last rank (inclusive, negative counts from the end).
        stop: i64,
    },
    /// `SADD key member`
    SAdd {
        /// Set key.
        key: String,
        /// Member.
        member: String,
    },
    /// `SREM key member`
    SRem {
        /// Set key.
        key: String,
        /// Member.
        member: String,
    },
    /// `SMEMBERS key`
    SMembers {
        /// Set key.
        key: String,
    },
    /// `HSET key field value`
    HSet {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
        /// Field value.
        value: String,
    },
    /// `HDEL key field`
    HDel {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
    },
    /// `HGET key field`
    HGet {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
    },
    /// `SET key value EX seconds`
    SetEx {
        /// String key.
        key: String,
        /// Value.
        value: String,
        /// Lifetime.
        ttl: Duration,
    },
    /// `GET key`
    Get {
        /// String key.
        key: String,
    },
    /// `DEL key`
    Del {
        /// Key to delete.
        key: String,
    },
    /// `KEYS pattern`
    Keys {
        /// Glob pattern.
        pattern: String,
    },
}

impl Command {
    /// The command verb.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Command::ZAdd { .. } => "ZADD",
            Command::ZRem { .. } => "ZREM",
            Command::ZRange { .. } => "ZRANGE",
            Command::SAdd { .. } => "SADD",
            Command::SRem { .. } => "SREM",
            Command::SMembers { .. } => "SMEMBERS",
            Command::HSet { .. } => "HSET",
            Command::HDel { .. } => "HDEL",
            Command::HGet { .. } => "HGET",
            Command::SetEx { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Del { .. } => "DEL",
            Command::Keys { .. } => "KEYS",
        }
    }
}

/// A reply to a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Status reply.
    Ok,
    /// Integer reply.
    Integer(i64),
    /// Bulk string reply; `None` is the nil reply.
    Bulk(Option<String>),
    /// Array of bulk strings.
    Array(Vec<String>),
    /// Error reply from the server.
    Error(String),
}

impl Reply {
    fn describe(&self) -> String {
        match self {
            Reply::Ok => "status".to_string(),
            Reply::Integer(n) => format!("integer {n}"),
            Reply::Bulk(_) => "bulk string".to_string(),
            Reply::Array(items) => format!("array of {}", items.len()),
            Reply::Error(msg) => format!("error {msg}"),
        }
    }

    fn unexpected(self, command: &'static str) -> StoreError {
        match self {
            Reply::Error(msg) => StoreError::Backend(msg),
            other => StoreError::UnexpectedReply {
                command,
                detail: other.describe(),
            },
        }
    }

    fn into_done(self, command: &'static str) -> StoreResult<()> {
        match self {
            Reply::Ok | Reply::Integer(_) => Ok(()),
            other => Err(other.unexpected(command)),
        }
    }

    fn into_bulk(self, command: &'static str) -> StoreResult<Option<String>> {
        match self {
            Reply::Bulk(value) => Ok(value),
            other => Err(other.unexpected(command)),
        }
    }

    fn into_array(self, command: &'static str) -> StoreResult<Vec<String>> {
        match self {
            Reply::Array(items) => Ok(items),
            other => Err(other.unexpected(command)),
        }
    }
}

/// Wire client abstraction.
///
/// Implement this trait over a concrete driver. Transport failures are
/// reported as `Err(message)`; server-side failures as [`Reply::Error`].
pub trait CommandClient: Send + Sync {
    /// Sends one command and waits for its reply.
    fn execute(&self, command: Command) -> Result<Reply, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// A [`KeyValueStore`] speaking Redis-style commands through a [`CommandClient`].
pub struct CommandStore<C: CommandClient> {
    client: C,
    deletion_ttl: DeletionTtl,
    last_error: RwLock<Option<String>>,
}

impl<C: CommandClient> CommandStore<C> {
    /// Creates a store over `client`.
    pub fn new(client: C) -> Self {
        Self {
            client,
            deletion_ttl: DeletionTtl::default(),
            last_error: RwLock::new(None),
        }
    }

    /// Sets the lifetime range of deletion markers.
    #[must_use]
    pub fn with_deletion_ttl(mut self, ttl: DeletionTtl) -> Self {
        self.deletion_ttl = ttl;
        self
    }

    /// Returns the wire client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn send(&self, command: Command) -> StoreResult<Reply> {
        let name = command.name();
        if !self.client.is_healthy() {
            return Err(StoreError::unavailable(format!("{name}: client not connected")));
        }
        match self.client.execute(command) {
            Ok(reply) => {
                *self.last_error.write() = None;
                Ok(reply)
            }
            Err(e) => {
                *self.last_error.write() = Some(e.clone());
                Err(StoreError::unavailable(format!("{name}: {e}")))
            }
        }
    }

    fn run(&self, command: Command) -> StoreResult<()> {
        let name = command.name();
        self.send(command)?.into_done(name)
    }

    fn del(&self, key: String) -> StoreResult<()> {
        self.run(Command::Del { key })
    }
}

impl<C: CommandClient> KeyValueStore for CommandStore<C> {
    fn add_index_record(&self, index_key: &str, primary_key: &str, score: f64) -> StoreResult<()> {
        self.run(Command::ZAdd {
            key: index_key.to_string(),
            score,
            member: primary_key.to_string(),
        })
    }

    fn add_primary_key_to_index_mapping(
        &self,
        table: &str,
        primary_key: &str,
        index_key: &str,
    ) -> StoreResult<()> {
        self.run(Command::SAdd {
            key: keys::reverse_mapping_key(table, primary_key),
            member: index_key.to_string(),
        })
    }

    fn remove_primary_key_mapping(
        &self,
        table: &str,
        primary_key: &str,
        index_key: &str,
    ) -> StoreResult<()> {
        self.run(Command::SRem {
            key: keys::reverse_mapping_key(table, primary_key),
            member: index_key.to_string(),
        })
    }

    fn query_primary_keys_by_index(
        &self,
        index_key: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<String>> {
        self.send(Command::ZRange {
            key: index_key.to_string(),
            start,
            stop: end,
        })?
        .into_array("ZRANGE")
    }

    fn mark_for_deletion(&self, scope: &str, primary_key: &str) -> StoreResult<()> {
        self.run(Command::SetEx {
            key: keys::marker_key(scope, primary_key),
            value: primary_key.to_string(),
            ttl: self.deletion_ttl.sample(),
        })
    }

    fn cleanup_marked_records(&self) -> StoreResult<usize> {
        let markers = self.get_all_keys(&format!("*{}", keys::MARKER_SUFFIX))?;
        let mut applied = 0;

        for marker in markers {
            let value = self
                .send(Command::Get { key: marker.clone() })?
                .into_bulk("GET")?;
            // Expired between KEYS and GET.
            let Some(value) = value else { continue };

            match keys::parse_marker(&marker, &value) {
                Some(MarkedEntry::Record { table, primary_key }) => {
                    for index_key in self.get_primary_key_mappings(&table, &primary_key)? {
                        self.remove_index_record(&index_key, &primary_key)?;
                    }
                    self.del(keys::reverse_mapping_key(&table, &primary_key))?;
                    self.del(keys::data_key(&table, &primary_key))?;
                    applied += 1;
                }
                Some(MarkedEntry::IndexEntry {
                    index_key,
                    table,
                    primary_key,
                }) => {
                    self.remove_index_record(&index_key, &primary_key)?;
                    self.remove_primary_key_mapping(&table, &primary_key, &index_key)?;
                    applied += 1;
                }
                None => {
                    tracing::debug!(marker = %marker, "dropping unreadable deletion marker");
                }
            }
            self.del(marker)?;
        }

        if applied > 0 {
            tracing::debug!(applied, "applied deletion markers");
        }
        Ok(applied)
    }

    fn remove_index_record(&self, index_key: &str, primary_key: &str) -> StoreResult<()> {
        self.run(Command::ZRem {
            key: index_key.to_string(),
            member: primary_key.to_string(),
        })
    }

    fn get_primary_key_mappings(
        &self,
        table: &str,
        primary_key: &str,
    ) -> StoreResult<BTreeSet<String>> {
        let members = self
            .send(Command::SMembers {
                key: keys::reverse_mapping_key(table, primary_key),
            })?
            .into_array("SMEMBERS")?;
        Ok(members.into_iter().collect())
    }

    fn add_data_field(
        &self,
        table: &str,
        primary_key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<()> {
        self.run(Command::HSet {
            key: keys::data_key(table, primary_key),
            field: field.to_string(),
            value: value.to_string(),
        })
    }

    fn remove_data_field(&self, table: &str, primary_key: &str, field: &str) -> StoreResult<()> {
        self.run(Command::HDel {
            key: keys::data_key(table, primary_key),
            field: field.to_string(),
        })
    }

    fn get_field_value(
        &self,
        table: &str,
        primary_key: &str,
        field: &str,
    ) -> StoreResult<Option<String>> {
        self.send(Command::HGet {
            key: keys::data_key(table, primary_key),
            field: field.to_string(),
        })?
        .into_bulk("HGET")
    }

    fn get_all_keys(&self, pattern: &str) -> StoreResult<BTreeSet<String>> {
        let keys = self
            .send(Command::Keys {
                pattern: pattern.to_string(),
            })?
            .into_array("KEYS")?;
        Ok(keys.into_iter().collect())
    }
}

/// A [`CommandClient`] executing commands against an in-process [`Keyspace`].
///
/// Used to run the command adapter without a server, and to simulate outages
/// with [`LoopbackClient::set_connected`].
#[derive(Debug)]
pub struct LoopbackClient {
    keyspace: Mutex<Keyspace>,
    connected: AtomicBool,
    executed: AtomicU64,
}

impl Default for LoopbackClient {
    fn default() -> Self {
        Self {
            keyspace: Mutex::new(Keyspace::new()),
            connected: AtomicBool::new(true),
            executed: AtomicU64::new(0),
        }
    }
}

impl LoopbackClient {
    /// Creates a connected client over an empty keyspace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the connection going up or down.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Number of commands executed successfully.
    pub fn commands_executed(&self) -> u64 {
        self.executed.load(Ordering::SeqCst)
    }

    fn apply(keyspace: &mut Keyspace, command: Command) -> StoreResult<Reply> {
        let flag = |b: bool| Reply::Integer(i64::from(b));
        Ok(match command {
            Command::ZAdd { key, score, member } => flag(keyspace.zadd(&key, &member, score)?),
            Command::ZRem { key, member } => flag(keyspace.zrem(&key, &member)?),
            Command::ZRange { key, start, stop } => Reply::Array(keyspace.zrange(&key, start, stop)?),
            Command::SAdd { key, member } => flag(keyspace.sadd(&key, &member)?),
            Command::SRem { key, member } => flag(keyspace.srem(&key, &member)?),
            Command::SMembers { key } => Reply::Array(keyspace.smembers(&key)?.into_iter().collect()),
            Command::HSet { key, field, value } => flag(keyspace.hset(&key, &field, &value)?),
            Command::HDel { key, field } => flag(keyspace.hdel(&key, &field)?),
            Command::HGet { key, field } => Reply::Bulk(keyspace.hget(&key, &field)?),
            Command::SetEx { key, value, ttl } => {
                keyspace.set_ex(&key, &value, ttl);
                Reply::Ok
            }
            Command::Get { key } => Reply::Bulk(keyspace.get(&key)?),
            Command::Del { key } => flag(keyspace.del(&key)),
            Command::Keys { pattern } => {
                Reply::Array(keyspace.keys(&KeyPattern::new(&pattern)?).into_iter().collect())
            }
        })
    }
}

impl CommandClient for LoopbackClient {
    fn execute(&self, command: Command) -> Result<Reply, String> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err("connection refused".to_string());
        }
        let reply = match Self::apply(&mut self.keyspace.lock(), command) {
            Ok(reply) => reply,
            Err(e) => Reply::Error(e.to_string()),
        };
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(reply)
    }

    fn is_healthy(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl<C: CommandClient> CommandClient for std::sync::Arc<C> {
    fn execute(&self, command: Command) -> Result<Reply, String> {
        (**self).execute(command)
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }
}
