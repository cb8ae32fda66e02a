//! Bounded file context shared by every agent in a session.
//!
//! Files the agent reads or writes enter the **active** tier with their full
//! content. When the byte budget is exceeded, least-recently-used unpinned
//! files are demoted to the **explored** tier, where only a short summary
//! counts against the budget. A path lives in at most one tier.
//!
//! Size accounting is exact UTF-8 byte length: active entries count their
//! content, explored entries count their summary. Eviction runs before any
//! mutating call returns, so callers never observe the store over capacity
//! unless the pinned entries alone exceed it.

use chrono::{DateTime, Utc};
use codeloop_config::ContextConfig;
use codeloop_core::error::ContextError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

use super::summarizer::{StructuralSummarizer, Summarizer};

pub const DEFAULT_CAPACITY_BYTES: usize = 100_000;
pub const DEFAULT_EVICTION_TARGET: f64 = 0.8;

/// Message rendered when no file has been touched yet.
pub const EMPTY_CONTEXT: &str = "No code files have been accessed yet.";

/// How a file last entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    Read,
    Write,
    Edit,
    Pin,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Read => "read",
            AccessType::Write => "write",
            AccessType::Edit => "edit",
            AccessType::Pin => "pin",
        }
    }
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContextEntry {
    pub path: String,
    /// Full content, kept even when explored so a pin can promote it back.
    pub content: String,
    pub summary: Option<String>,
    /// Byte length of `content`.
    pub size_bytes: usize,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u32,
    pub access_type: AccessType,
    pub is_pinned: bool,
    pub is_summarized: bool,
}

impl FileContextEntry {
    fn new(path: &str, content: String, access_type: AccessType) -> Self {
        Self {
            path: path.to_string(),
            size_bytes: content.len(),
            content,
            summary: None,
            last_accessed: Utc::now(),
            access_count: 0,
            access_type,
            is_pinned: false,
            is_summarized: false,
        }
    }

    /// Bytes this entry contributes to the budget in its current tier.
    pub fn budget_bytes(&self) -> usize {
        if self.is_summarized {
            self.summary.as_deref().map_or(0, str::len)
        } else {
            self.size_bytes
        }
    }
}

/// Aggregate view of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStats {
    pub used_bytes: usize,
    pub capacity: usize,
    pub active: usize,
    pub explored: usize,
    pub pinned: usize,
}

pub struct ContextStore {
    capacity: usize,
    eviction_target: f64,
    active: BTreeMap<String, FileContextEntry>,
    explored: BTreeMap<String, FileContextEntry>,
    /// Active paths, least recently used first.
    lru: VecDeque<String>,
    forgotten: HashSet<String>,
    pending_pins: HashSet<String>,
    summarizer: Arc<dyn Summarizer>,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_BYTES)
    }
}

impl ContextStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            eviction_target: DEFAULT_EVICTION_TARGET,
            active: BTreeMap::new(),
            explored: BTreeMap::new(),
            lru: VecDeque::new(),
            forgotten: HashSet::new(),
            pending_pins: HashSet::new(),
            summarizer: Arc::new(StructuralSummarizer),
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.capacity_bytes).with_eviction_target(config.eviction_target)
    }

    /// Fraction of capacity eviction shrinks down to, clamped to `0.0..=1.0`.
    pub fn with_eviction_target(mut self, fraction: f64) -> Self {
        self.eviction_target = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn target_bytes(&self) -> usize {
        (self.capacity as f64 * self.eviction_target) as usize
    }

    /// Active content bytes plus explored summary bytes.
    pub fn used_bytes(&self) -> usize {
        self.active
            .values()
            .chain(self.explored.values())
            .map(FileContextEntry::budget_bytes)
            .sum()
    }

    /// Record a read or write of `path`. Returns the paths evicted as a result.
    ///
    /// Forgotten paths are ignored. An explored path is promoted back to the
    /// active tier with the new content.
    pub async fn touch(
        &mut self,
        path: &str,
        content: impl Into<String>,
        access_type: AccessType,
    ) -> Vec<String> {
        if self.forgotten.contains(path) {
            debug!(path, "Ignoring touch of forgotten file");
            return Vec::new();
        }

        let content = content.into();
        let mut entry = self
            .active
            .remove(path)
            .or_else(|| self.explored.remove(path))
            .unwrap_or_else(|| FileContextEntry::new(path, String::new(), access_type));

        if entry.content != content || entry.access_count == 0 {
            entry.summary = None;
        }
        entry.size_bytes = content.len();
        entry.content = content;
        entry.is_summarized = false;
        entry.access_count += 1;
        entry.access_type = access_type;
        entry.last_accessed = Utc::now();
        if self.pending_pins.remove(path) {
            entry.is_pinned = true;
        }

        debug!(path, bytes = entry.size_bytes, access = %access_type, "Context touch");
        self.lru.retain(|p| p != path);
        self.lru.push_back(path.to_string());
        self.active.insert(path.to_string(), entry);

        self.evict(Some(path)).await
    }

    /// Exempt `path` from eviction. An explored entry is promoted back to the
    /// active tier; a forgotten or unknown path is pinned on its next touch.
    pub async fn pin(&mut self, path: &str) -> Vec<String> {
        if let Some(entry) = self.active.get_mut(path) {
            entry.is_pinned = true;
            return Vec::new();
        }

        if let Some(mut entry) = self.explored.remove(path) {
            entry.is_pinned = true;
            entry.is_summarized = false;
            entry.access_type = AccessType::Pin;
            entry.last_accessed = Utc::now();
            info!(path, "Pinned explored file, promoting to active");
            self.lru.push_back(path.to_string());
            self.active.insert(path.to_string(), entry);
            return self.evict(Some(path)).await;
        }

        if self.forgotten.remove(path) {
            info!(path, "Pinning clears forgotten status");
        }
        self.pending_pins.insert(path.to_string());
        Vec::new()
    }

    /// Make `path` evictable again. Eviction runs immediately in case
    /// pinned entries were holding the store over capacity.
    pub async fn unpin(&mut self, path: &str) -> Result<Vec<String>, ContextError> {
        if self.pending_pins.remove(path) {
            return Ok(Vec::new());
        }
        let entry = self
            .active
            .get_mut(path)
            .or_else(|| self.explored.get_mut(path))
            .ok_or_else(|| ContextError::NotTracked(path.to_string()))?;
        entry.is_pinned = false;
        Ok(self.evict(None).await)
    }

    /// Drop `path` from both tiers and ignore future touches of it.
    /// Returns whether the path was tracked.
    pub fn forget(&mut self, path: &str) -> bool {
        let tracked = self.active.remove(path).is_some() | self.explored.remove(path).is_some();
        self.lru.retain(|p| p != path);
        self.pending_pins.remove(path);
        self.forgotten.insert(path.to_string());
        info!(path, tracked, "File forgotten");
        tracked
    }

    /// Allow `path` to be tracked again. Returns whether it was forgotten.
    pub fn unforget(&mut self, path: &str) -> bool {
        self.forgotten.remove(path)
    }

    /// Demote LRU entries until usage is at or below the eviction target.
    ///
    /// Pinned entries are never demoted. When demoting every other active
    /// entry is not enough, explored summaries are dropped, least recently
    /// accessed first. The entry that triggered eviction is demoted last, and
    /// only when that brings the store back within capacity.
    async fn evict(&mut self, trigger: Option<&str>) -> Vec<String> {
        if self.used_bytes() <= self.capacity {
            return Vec::new();
        }

        let target = self.target_bytes();
        let candidates: Vec<String> = self
            .lru
            .iter()
            .filter(|p| Some(p.as_str()) != trigger)
            .filter(|p| self.active.get(*p).is_some_and(|e| !e.is_pinned))
            .cloned()
            .collect();

        let mut evicted = Vec::new();
        for path in candidates {
            if self.used_bytes() <= target {
                break;
            }
            self.demote(&path).await;
            evicted.push(path);
        }

        if self.used_bytes() > self.capacity {
            self.drop_summaries();
        }

        if let Some(trigger) = trigger
            && self.used_bytes() > self.capacity
            && let Some(size) = self.active.get(trigger).filter(|e| !e.is_pinned).map(|e| e.size_bytes)
            && self.used_bytes() - size <= self.capacity
        {
            self.demote(trigger).await;
            if self.used_bytes() > self.capacity
                && let Some(entry) = self.explored.get_mut(trigger)
            {
                entry.summary = None;
            }
            evicted.push(trigger.to_string());
        }

        if !evicted.is_empty() {
            info!(
                evicted = evicted.len(),
                used_bytes = self.used_bytes(),
                capacity = self.capacity,
                "Evicted files to explored tier"
            );
        }
        evicted
    }

    /// Drop explored summaries, least recently accessed first, until the
    /// store is within capacity. Those entries keep only their size.
    fn drop_summaries(&mut self) {
        let mut candidates: Vec<(DateTime<Utc>, String)> = self
            .explored
            .values()
            .filter(|e| !e.is_pinned && e.budget_bytes() > 0)
            .map(|e| (e.last_accessed, e.path.clone()))
            .collect();
        candidates.sort();

        let mut dropped = 0;
        for (_, path) in candidates {
            if self.used_bytes() <= self.capacity {
                break;
            }
            if let Some(entry) = self.explored.get_mut(&path) {
                entry.summary = None;
                dropped += 1;
            }
        }
        if dropped > 0 {
            info!(dropped, used_bytes = self.used_bytes(), "Dropped explored summaries");
        }
    }

    async fn demote(&mut self, path: &str) {
        let Some(mut entry) = self.active.remove(path) else {
            return;
        };
        self.lru.retain(|p| p != path);

        let summary = match entry.summary.take() {
            Some(existing) => existing,
            None => self.summarizer.summarize(path, &entry.content).await,
        };
        entry.summary = Some(fit_to_bytes(summary, entry.size_bytes));
        entry.is_summarized = true;
        debug!(path, bytes = entry.size_bytes, summary_bytes = entry.budget_bytes(), "Demoted file");
        self.explored.insert(path.to_string(), entry);
    }

    pub fn get(&self, path: &str) -> Option<&FileContextEntry> {
        self.active.get(path).or_else(|| self.explored.get(path))
    }

    pub fn is_active(&self, path: &str) -> bool {
        self.active.contains_key(path)
    }

    pub fn is_explored(&self, path: &str) -> bool {
        self.explored.contains_key(path)
    }

    pub fn is_forgotten(&self, path: &str) -> bool {
        self.forgotten.contains(path)
    }

    pub fn is_pinned(&self, path: &str) -> bool {
        self.get(path).is_some_and(|e| e.is_pinned) || self.pending_pins.contains(path)
    }

    /// Active paths, least recently used first.
    pub fn active_paths(&self) -> Vec<&str> {
        self.lru.iter().map(String::as_str).collect()
    }

    /// Explored paths in path order.
    pub fn explored_paths(&self) -> Vec<&str> {
        self.explored.keys().map(String::as_str).collect()
    }

    pub fn pinned_paths(&self) -> Vec<&str> {
        let mut pinned: Vec<&str> = self
            .active
            .values()
            .chain(self.explored.values())
            .filter(|e| e.is_pinned)
            .map(|e| e.path.as_str())
            .collect();
        pinned.sort_unstable();
        pinned
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.explored.is_empty()
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            used_bytes: self.used_bytes(),
            capacity: self.capacity,
            active: self.active.len(),
            explored: self.explored.len(),
            pinned: self.pinned_paths().len(),
        }
    }

    /// Render the full store for the prompt.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return EMPTY_CONTEXT.to_string();
        }
        let active: Vec<&FileContextEntry> = self.lru.iter().filter_map(|p| self.active.get(p)).collect();
        let explored: Vec<&FileContextEntry> = self.explored.values().collect();
        self.render_sections(&active, &explored, 0)
    }

    /// Render within `max_bytes`, filling the most recently used active
    /// entries first, then explored summaries, and noting what was left out.
    pub fn render_bounded(&self, max_bytes: usize) -> String {
        let full = self.render();
        if full.len() <= max_bytes || self.is_empty() {
            return full;
        }

        // Headers, stats and the omission note are always present.
        let mut remaining = max_bytes.saturating_sub(self.render_sections(&[], &[], self.active.len() + self.explored.len()).len());
        let mut keep_active = HashSet::new();
        let mut omitted = 0;

        for path in self.lru.iter().rev() {
            let Some(entry) = self.active.get(path) else { continue };
            let cost = render_active(entry).len();
            if cost <= remaining {
                remaining -= cost;
                keep_active.insert(path.as_str());
            } else {
                omitted += 1;
            }
        }

        let mut explored = Vec::new();
        for entry in self.explored.values() {
            let cost = render_explored(entry).len();
            if cost <= remaining {
                remaining -= cost;
                explored.push(entry);
            } else {
                omitted += 1;
            }
        }

        let active: Vec<&FileContextEntry> = self
            .lru
            .iter()
            .filter(|p| keep_active.contains(p.as_str()))
            .filter_map(|p| self.active.get(p))
            .collect();
        if omitted > 0 {
            debug!(omitted, max_bytes, "Code context truncated to fit the prompt");
        }
        self.render_sections(&active, &explored, omitted)
    }

    fn render_sections(
        &self,
        active: &[&FileContextEntry],
        explored: &[&FileContextEntry],
        omitted: usize,
    ) -> String {
        let mut out = String::new();

        if !self.active.is_empty() {
            out.push_str("=== ACTIVE FILES (Full Content) ===\n\n");
            for entry in active {
                out.push_str(&render_active(entry));
            }
        }

        if !self.explored.is_empty() {
            out.push_str("=== EXPLORED FILES (Summaries) ===\n\n");
            for entry in explored {
                out.push_str(&render_explored(entry));
            }
        }

        if omitted > 0 {
            out.push_str(&format!("[{omitted} file(s) omitted to fit the prompt budget]\n\n"));
        }

        out.push_str(&self.render_stats());
        out
    }

    fn render_stats(&self) -> String {
        let stats = self.stats();
        let percent = if stats.capacity == 0 {
            0.0
        } else {
            stats.used_bytes as f64 * 100.0 / stats.capacity as f64
        };
        let pinned = self.pinned_paths();
        let pinned = if pinned.is_empty() {
            "none".to_string()
        } else {
            pinned.join(", ")
        };
        format!(
            "=== CONTEXT STATS ===\nUsed: {} / {} bytes ({percent:.1}%)\nActive files: {}\nExplored files: {}\nPinned: {pinned}\n",
            stats.used_bytes, stats.capacity, stats.active, stats.explored
        )
    }
}

fn render_active(entry: &FileContextEntry) -> String {
    let pinned = if entry.is_pinned { " [pinned]" } else { "" };
    let mut block = format!(
        "--- {}{pinned} (accessed {}x, last: {}) ---\n{}",
        entry.path, entry.access_count, entry.access_type, entry.content
    );
    if !block.ends_with('\n') {
        block.push('\n');
    }
    block.push('\n');
    block
}

fn render_explored(entry: &FileContextEntry) -> String {
    let pinned = if entry.is_pinned { " [pinned]" } else { "" };
    match entry.summary.as_deref().filter(|s| !s.is_empty()) {
        Some(summary) => format!("--- {}{pinned} ---\nSummary: {summary}\n\n", entry.path),
        None => format!("--- {}{pinned} ---\nSize: {} bytes\n\n", entry.path, entry.size_bytes),
    }
}

/// Cut `summary` to at most `max` bytes on a character boundary.
fn fit_to_bytes(mut summary: String, max: usize) -> String {
    if summary.len() > max {
        let mut end = max;
        while !summary.is_char_boundary(end) {
            end -= 1;
        }
        summary.truncate(end);
    }
    summary
}
