// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics for the adapter cache and the dispatch path.
//!
//! Metrics are created unregistered; the owner of the [`Registry`] calls `register`.

use std::sync::Arc;
use std::time::Instant;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

pub use prometheus::Registry;

/// Prefix shared by every metric name
pub const METRICS_PREFIX: &str = "loraswap";

fn metric_name(suffix: &str) -> String {
    format!("{METRICS_PREFIX}_{suffix}")
}

/// Counters and gauges maintained by [`crate::adapters::AdapterCache`]
#[derive(Clone)]
pub struct CacheMetrics {
    pub hits: IntCounter,
    pub misses: IntCounter,
    pub loads: IntCounter,
    pub load_failures: IntCounter,
    pub evictions: IntCounter,
    pub invalidations: IntCounter,
    pub resident: IntGauge,
    pub loading: IntGauge,
}

impl CacheMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            hits: IntCounter::new(
                metric_name("adapter_cache_hits_total"),
                "Acquisitions served by a resident adapter",
            )?,
            misses: IntCounter::new(
                metric_name("adapter_cache_misses_total"),
                "Acquisitions that had to wait for a load",
            )?,
            loads: IntCounter::new(
                metric_name("adapter_loads_total"),
                "Adapter loads started against the store",
            )?,
            load_failures: IntCounter::new(
                metric_name("adapter_load_failures_total"),
                "Adapter loads that returned an error",
            )?,
            evictions: IntCounter::new(
                metric_name("adapter_evictions_total"),
                "Unpinned adapters evicted to make room",
            )?,
            invalidations: IntCounter::new(
                metric_name("adapter_invalidations_total"),
                "Adapters dropped because a newer version was stored",
            )?,
            resident: IntGauge::new(
                metric_name("adapters_resident"),
                "Adapters currently materialized in memory",
            )?,
            loading: IntGauge::new(
                metric_name("adapters_loading"),
                "Adapter loads currently in flight",
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.loads.clone()))?;
        registry.register(Box::new(self.load_failures.clone()))?;
        registry.register(Box::new(self.evictions.clone()))?;
        registry.register(Box::new(self.invalidations.clone()))?;
        registry.register(Box::new(self.resident.clone()))?;
        registry.register(Box::new(self.loading.clone()))?;
        Ok(())
    }
}

/// How a dispatched request ended, used as the `status` label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Fallback,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Fallback => "fallback",
            Status::Error => "error",
        }
    }
}

/// Request level metrics recorded by [`crate::adapters::RequestDispatcher`]
pub struct DispatchMetrics {
    request_counter: IntCounterVec,
    inflight_gauge: IntGauge,
    request_duration: HistogramVec,
}

impl DispatchMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let request_counter = IntCounterVec::new(
            Opts::new(
                metric_name("requests_total"),
                "Total number of dispatched requests",
            ),
            &["status"],
        )?;
        let inflight_gauge = IntGauge::new(
            metric_name("inflight_requests"),
            "Number of requests currently being dispatched",
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                metric_name("request_duration_seconds"),
                "Duration of dispatched requests",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["status"],
        )?;
        Ok(Self {
            request_counter,
            inflight_gauge,
            request_duration,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.request_counter.clone()))?;
        registry.register(Box::new(self.inflight_gauge.clone()))?;
        registry.register(Box::new(self.request_duration.clone()))?;
        Ok(())
    }

    pub fn requests(&self, status: Status) -> u64 {
        self.request_counter
            .with_label_values(&[status.as_str()])
            .get()
    }

    pub fn inflight(&self) -> i64 {
        self.inflight_gauge.get()
    }

    /// The [`InflightGuard`] is an RAII object that counts the request as in flight until
    /// dropped, then records its status and duration.
    pub fn create_inflight_guard(self: &Arc<Self>) -> InflightGuard {
        self.inflight_gauge.inc();
        InflightGuard {
            metrics: self.clone(),
            status: Status::Error,
            timer: Instant::now(),
        }
    }
}

pub struct InflightGuard {
    metrics: Arc<DispatchMetrics>,
    status: Status,
    timer: Instant,
}

impl InflightGuard {
    pub fn mark(&mut self, status: Status) {
        self.status = status;
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let label = self.status.as_str();
        self.metrics.inflight_gauge.dec();
        self.metrics
            .request_counter
            .with_label_values(&[label])
            .inc();
        self.metrics
            .request_duration
            .with_label_values(&[label])
            .observe(self.timer.elapsed().as_secs_f64());
    }
}
