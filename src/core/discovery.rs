//! Counterparty discovery between wallet runs
//!
//! Successful syncs report the counterparties seen in their sample. They are
//! queued here and crawled on the next run, so every graph edge endpoint ends
//! up with a relational row within one cycle.

use std::collections::{HashSet, VecDeque};

use crate::models::types::SyncResult;
use crate::utils::address::normalize_address;

/// Bounded, de-duplicated FIFO of addresses waiting for their first crawl
#[derive(Debug)]
pub struct DiscoveryQueue {
    limit: usize,
    queue: VecDeque<String>,
    queued: HashSet<String>,
}

impl DiscoveryQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            queue: VecDeque::new(),
            queued: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue one address. Returns false when it is invalid, already queued or
    /// the queue is full.
    pub fn push(&mut self, address: &str) -> bool {
        let Ok(address) = normalize_address(address) else {
            return false;
        };
        if self.queue.len() >= self.limit || self.queued.contains(&address) {
            return false;
        }
        self.queued.insert(address.clone());
        self.queue.push_back(address);
        true
    }

    /// Queue the counterparties of every successful result
    pub fn extend_from_results(&mut self, results: &[SyncResult]) -> usize {
        results
            .iter()
            .filter(|r| r.ok)
            .flat_map(|r| r.counterparties.iter())
            .filter(|a| self.push(a))
            .count()
    }

    pub fn drain(&mut self) -> Vec<String> {
        self.queued.clear();
        self.queue.drain(..).collect()
    }
}

/// Seeds first, then discovered, then stale rows; duplicates dropped
pub fn plan_wallet_run(seeds: &[String], discovered: Vec<String>, stale: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    seeds
        .iter()
        .cloned()
        .chain(discovered)
        .chain(stale)
        .filter(|a| {
            let key = normalize_address(a).unwrap_or_else(|_| a.trim().to_lowercase());
            seen.insert(key)
        })
        .collect()
}
