//! Subscription registry
//!
//! Tracks the patterns a subscriber has asked for, with a description and an
//! `active` flag that only flips on once the session confirms the
//! subscription. Entries are kept in registration order.

use crate::topic::{SubscriptionPattern, Topic};
use serde::Serialize;
use thiserror::Error;

/// Registry error types.
///
/// All of these are reportable no-ops; none leave the registry changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Pattern is already registered
    #[error("Already subscribed to \"{0}\"")]
    AlreadyRegistered(String),

    /// Pattern is unknown or not yet confirmed
    #[error("Not subscribed to \"{0}\"")]
    NotSubscribed(String),

    /// Confirmation or failure arrived for a pattern we never registered
    #[error("Unknown subscription \"{0}\"")]
    UnknownSubscription(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A registered subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionEntry {
    /// Pattern (unique per registry)
    pub pattern: SubscriptionPattern,
    /// Human-readable description
    pub description: String,
    /// Whether the session confirmed the subscription
    pub active: bool,
}

/// Status line for a subscription, as reported by [`SubscriptionRegistry::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionStatus {
    pub pattern: String,
    pub description: String,
    pub active: bool,
}

/// Registry of subscription patterns.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<SubscriptionEntry>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, pattern: &SubscriptionPattern) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.pattern == pattern)
    }

    /// Register a pattern in the inactive state.
    pub fn register(
        &mut self,
        pattern: SubscriptionPattern,
        description: impl Into<String>,
    ) -> RegistryResult<()> {
        if self.position(&pattern).is_some() {
            return Err(RegistryError::AlreadyRegistered(pattern.to_string()));
        }

        self.entries.push(SubscriptionEntry {
            pattern,
            description: description.into(),
            active: false,
        });
        Ok(())
    }

    /// Mark a pattern active after the session confirmed it.
    pub fn confirm(&mut self, pattern: &SubscriptionPattern) -> RegistryResult<&SubscriptionEntry> {
        self.set_active(pattern, true)
    }

    /// Mark a pattern inactive after the session rejected it.
    pub fn fail(&mut self, pattern: &SubscriptionPattern) -> RegistryResult<&SubscriptionEntry> {
        self.set_active(pattern, false)
    }

    fn set_active(
        &mut self,
        pattern: &SubscriptionPattern,
        active: bool,
    ) -> RegistryResult<&SubscriptionEntry> {
        let index = self
            .position(pattern)
            .ok_or_else(|| RegistryError::UnknownSubscription(pattern.to_string()))?;
        let entry = &mut self.entries[index];
        entry.active = active;
        Ok(entry)
    }

    /// Remove an active pattern.
    ///
    /// Unknown and unconfirmed patterns are rejected with `NotSubscribed`.
    pub fn unregister(
        &mut self,
        pattern: &SubscriptionPattern,
    ) -> RegistryResult<SubscriptionEntry> {
        match self.position(pattern) {
            Some(index) if self.entries[index].active => Ok(self.entries.remove(index)),
            _ => Err(RegistryError::NotSubscribed(pattern.to_string())),
        }
    }

    /// Remove every active pattern, returning what was removed.
    ///
    /// Inactive entries stay until [`clear`](Self::clear).
    pub fn unregister_all(&mut self) -> Vec<SubscriptionEntry> {
        let active: Vec<SubscriptionPattern> = self
            .entries
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.pattern.clone())
            .collect();

        active
            .iter()
            .filter_map(|pattern| self.unregister(pattern).ok())
            .collect()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries whose pattern matches `topic`, in registration order.
    ///
    /// Confirmation state is ignored.
    pub fn matching_entries(&self, topic: &Topic) -> Vec<&SubscriptionEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.pattern.matches(topic))
            .collect()
    }

    /// Look up an entry.
    pub fn get(&self, pattern: &SubscriptionPattern) -> Option<&SubscriptionEntry> {
        self.position(pattern).map(|index| &self.entries[index])
    }

    /// Whether `pattern` is registered and confirmed.
    pub fn is_active(&self, pattern: &SubscriptionPattern) -> bool {
        self.get(pattern).is_some_and(|entry| entry.active)
    }

    /// Registered entries, in order.
    pub fn entries(&self) -> &[SubscriptionEntry] {
        &self.entries
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Status of every entry, in registration order.
    pub fn snapshot(&self) -> Vec<SubscriptionStatus> {
        self.entries
            .iter()
            .map(|entry| SubscriptionStatus {
                pattern: entry.pattern.to_string(),
                description: entry.description.clone(),
                active: entry.active,
            })
            .collect()
    }
}
