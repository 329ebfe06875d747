//! Subscription table and the live subscription set
//!
//! The table file is TOML:
//!
//! ```toml
//! [[subscription]]
//! topic = 0x0880
//! priority = 0
//! reliability = 0
//! buf_limit = 4
//! ```
//!
//! Entries are read in order until the first one whose topic is the unused
//! sentinel (0). Anything after the sentinel is ignored.

use crate::bus::Qos;
use crate::constants::{DATA_TYPES_MID, DEFAULT_BUF_LIMIT, HK_TLM_MID, MAX_SUBSCRIPTIONS};
use crate::error::{GatewayError, Result};
use crate::message::MsgId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// One forwarded stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    pub topic: MsgId,
    #[serde(flatten)]
    pub qos: Qos,
    pub buf_limit: u16,
}

impl SubscriptionEntry {
    pub const fn new(topic: u16, buf_limit: u16) -> Self {
        Self {
            topic: MsgId::new(topic),
            qos: Qos {
                priority: 0,
                reliability: 0,
            },
            buf_limit,
        }
    }

    pub fn is_unused(&self) -> bool {
        self.topic == MsgId::RESERVED
    }
}

// =============================================================================
// Subscription set
// =============================================================================

/// Ordered, bounded set of subscriptions with unique topics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    entries: Vec<SubscriptionEntry>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_SUBSCRIPTIONS
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubscriptionEntry> {
        self.entries.iter()
    }

    pub fn contains(&self, topic: MsgId) -> bool {
        self.entries.iter().any(|e| e.topic == topic)
    }

    pub fn get(&self, topic: MsgId) -> Option<&SubscriptionEntry> {
        self.entries.iter().find(|e| e.topic == topic)
    }

    /// Insert or replace in place
    ///
    /// Returns `false` only when the topic is new and the set is full.
    pub fn upsert(&mut self, entry: SubscriptionEntry) -> bool {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.topic == entry.topic) {
            *existing = entry;
            return true;
        }
        if self.is_full() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Remove a topic, keeping the order of the others
    pub fn remove(&mut self, topic: MsgId) -> Option<SubscriptionEntry> {
        let idx = self.entries.iter().position(|e| e.topic == topic)?;
        Some(self.entries.remove(idx))
    }

    /// Take every entry out, leaving the set empty
    pub fn drain(&mut self) -> Vec<SubscriptionEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Build a set from table rows
    ///
    /// Stops at the first unused sentinel; later duplicates of a topic are
    /// skipped with a warning.
    pub fn from_entries<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = SubscriptionEntry>,
    {
        let mut set = Self::new();
        for entry in rows.into_iter().take_while(|e| !e.is_unused()) {
            if set.contains(entry.topic) {
                warn!("Duplicate table entry for {}, keeping the first", entry.topic);
                continue;
            }
            if !set.upsert(entry) {
                return Err(GatewayError::ConfigValidation {
                    field: "subscription",
                    reason: format!("more than {} entries", MAX_SUBSCRIPTIONS),
                });
            }
        }
        Ok(set)
    }
}

// =============================================================================
// Table
// =============================================================================

/// Table file layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct TableFile {
    #[serde(default)]
    subscription: Vec<SubscriptionEntry>,
}

/// Source of the initial subscription set
pub struct SubscriptionTable;

impl SubscriptionTable {
    /// Load the table file
    pub fn load(path: &Path) -> Result<SubscriptionSet> {
        let content = fs::read_to_string(path).map_err(|e| GatewayError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content).map_err(|e| match e {
            GatewayError::ConfigParse { reason, .. } => GatewayError::ConfigParse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse table text
    pub fn parse(content: &str) -> Result<SubscriptionSet> {
        let table: TableFile = toml::from_str(content).map_err(|e| GatewayError::ConfigParse {
            path: Path::new("<table>").to_path_buf(),
            reason: e.to_string(),
        })?;

        for entry in table.subscription.iter().take_while(|e| !e.is_unused()) {
            if !entry.topic.is_valid() {
                return Err(GatewayError::ConfigValidation {
                    field: "subscription.topic",
                    reason: format!("{} is outside the bus id range", entry.topic),
                });
            }
            if entry.buf_limit == 0 {
                return Err(GatewayError::ConfigValidation {
                    field: "subscription.buf_limit",
                    reason: format!("zero limit for {}", entry.topic),
                });
            }
        }

        SubscriptionSet::from_entries(table.subscription)
    }

    /// Built-in table: core service housekeeping plus the gateway's own streams
    pub fn defaults() -> SubscriptionSet {
        const CORE_STREAMS: &[SubscriptionEntry] = &[
            SubscriptionEntry::new(0x0800, DEFAULT_BUF_LIMIT), // executive services HK
            SubscriptionEntry::new(0x0801, DEFAULT_BUF_LIMIT), // event services HK
            SubscriptionEntry::new(0x0803, DEFAULT_BUF_LIMIT), // software bus HK
            SubscriptionEntry::new(0x0804, DEFAULT_BUF_LIMIT), // table services HK
            SubscriptionEntry::new(0x0805, DEFAULT_BUF_LIMIT), // time services HK
            SubscriptionEntry::new(0x0806, DEFAULT_BUF_LIMIT), // time diagnostics
            SubscriptionEntry::new(0x0808, 32),                // long event messages
            SubscriptionEntry::new(0x080A, DEFAULT_BUF_LIMIT), // bus statistics
            SubscriptionEntry::new(0x080B, DEFAULT_BUF_LIMIT), // application info
            SubscriptionEntry::new(0x080C, DEFAULT_BUF_LIMIT), // table registry
            SubscriptionEntry::new(0x080D, DEFAULT_BUF_LIMIT), // all subscriptions report
            SubscriptionEntry::new(0x080E, DEFAULT_BUF_LIMIT), // one subscription report
            SubscriptionEntry::new(0x0810, DEFAULT_BUF_LIMIT), // memory pool statistics
        ];

        let own = [
            SubscriptionEntry::new(HK_TLM_MID.value(), DEFAULT_BUF_LIMIT),
            SubscriptionEntry::new(DATA_TYPES_MID.value(), DEFAULT_BUF_LIMIT),
        ];

        let mut set = SubscriptionSet::new();
        for entry in CORE_STREAMS.iter().copied().chain(own) {
            set.upsert(entry);
        }
        set
    }
}

// ============================================================================
// Tests
// ============================================================================
