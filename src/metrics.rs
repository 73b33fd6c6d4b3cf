// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Process-wide request counters.
//!
//! Strictly observational: the dispatch path records one sample per request
//! and the UI collaborator reads snapshots. Counters are plain atomics so
//! recording never contends with component locks.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::proto::kind::{KIND_COUNT, MessageKind};

pub static PERF: Lazy<PerfCounters> = Lazy::new(PerfCounters::new);

#[derive(Debug)]
pub struct PerfCounters {
    total: AtomicU64,
    ok: AtomicU64,
    failed: AtomicU64,
    latency_sum_us: AtomicU64,
    latency_min_us: AtomicU64,
    latency_max_us: AtomicU64,
    per_kind: [AtomicU64; KIND_COUNT],
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            ok: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_min_us: AtomicU64::new(u64::MAX),
            latency_max_us: AtomicU64::new(0),
            per_kind: [const { AtomicU64::new(0) }; KIND_COUNT],
        }
    }

    pub fn record(&self, kind: MessageKind, latency: Duration, success: bool) {
        let us = latency.as_micros().min(u128::from(u64::MAX)) as u64;
        self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_sum_us.fetch_add(us, Ordering::Relaxed);
        self.latency_min_us.fetch_min(us, Ordering::Relaxed);
        self.latency_max_us.fetch_max(us, Ordering::Relaxed);
        self.per_kind[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PerfSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        let min = self.latency_min_us.load(Ordering::Relaxed);
        PerfSnapshot {
            total,
            ok: self.ok.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            latency_min_us: if min == u64::MAX { 0 } else { min },
            latency_max_us: self.latency_max_us.load(Ordering::Relaxed),
            latency_avg_us: if total == 0 { 0 } else { sum / total },
            per_kind: MessageKind::ALL
                .iter()
                .map(|k| KindCount {
                    kind: k.to_string(),
                    count: self.per_kind[k.index()].load(Ordering::Relaxed),
                })
                .filter(|kc| kc.count > 0)
                .collect(),
        }
    }

    /// Zero everything. Test support; never called on the serving path.
    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.ok.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.latency_sum_us.store(0, Ordering::Relaxed);
        self.latency_min_us.store(u64::MAX, Ordering::Relaxed);
        self.latency_max_us.store(0, Ordering::Relaxed);
        for c in &self.per_kind {
            c.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for PerfCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerfSnapshot {
    pub total: u64,
    pub ok: u64,
    pub failed: u64,
    pub latency_min_us: u64,
    pub latency_max_us: u64,
    pub latency_avg_us: u64,
    pub per_kind: Vec<KindCount>,
}

impl PerfSnapshot {
    /// Compact JSON rendering for the UI collaborator and shutdown logs.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KindCount {
    pub kind: String,
    pub count: u64,
}
