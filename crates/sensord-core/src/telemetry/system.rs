//! Live system telemetry backed by sysinfo.
//!
//! `SystemTelemetry` is the production [`TelemetryProvider`]: CPU and
//! memory come from a shared `sysinfo::System` refreshed on a short TTL,
//! GPU readings from the platform [`GpuMonitor`].

use super::gpu::{create_gpu_monitor, GpuMonitor};
use super::{Category, TelemetryProvider};
use crate::config::TelemetryConfig;
use crate::error::Result;
use serde::Serialize;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use sysinfo::System;

/// CPU snapshot payload.
#[derive(Debug, Clone, Serialize)]
pub struct CpuSnapshot {
    /// Aggregate usage percentage (0-100).
    pub usage_percent: f32,
    /// Number of logical cores.
    pub core_count: usize,
    /// Base frequency of the first core in MHz.
    pub frequency_mhz: u64,
    /// CPU brand string.
    pub brand: String,
    /// Per-core usage.
    pub cores: Vec<CoreUsage>,
}

/// One logical core's usage.
#[derive(Debug, Clone, Serialize)]
pub struct CoreUsage {
    pub name: String,
    pub usage_percent: f32,
}

/// Memory snapshot payload.
#[derive(Debug, Clone, Serialize)]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    /// Used share of total memory (0-100).
    pub usage_percent: f32,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
}

/// GPU snapshot payload.
#[derive(Debug, Clone, Serialize)]
pub struct GpuSnapshot {
    /// Whether a sampleable adapter is present.
    pub available: bool,
    /// GPU utilization percentage (0-100).
    pub usage_percent: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Production telemetry provider.
pub struct SystemTelemetry {
    refresh_ttl: Duration,
    system: RwLock<System>,
    gpu_monitor: Box<dyn GpuMonitor>,
    last_refresh: RwLock<Option<Instant>>,
}

impl SystemTelemetry {
    /// Create a provider with the default refresh TTL and platform GPU monitor.
    pub fn new() -> Self {
        Self::with_gpu_monitor(create_gpu_monitor())
    }

    /// Create a provider with a specific GPU monitor. Tests inject a
    /// [`NoOpGpuMonitor`](super::NoOpGpuMonitor) here.
    pub fn with_gpu_monitor(gpu_monitor: Box<dyn GpuMonitor>) -> Self {
        let mut system = System::new_all();
        system.refresh_all();

        Self {
            refresh_ttl: TelemetryConfig::REFRESH_TTL,
            system: RwLock::new(system),
            gpu_monitor,
            last_refresh: RwLock::new(Some(Instant::now())),
        }
    }

    /// Snapshot aggregate and per-core CPU usage.
    pub fn cpu_snapshot(&self) -> CpuSnapshot {
        self.maybe_refresh();

        let system = self.system.read().unwrap();
        let cores: Vec<CoreUsage> = system
            .cpus()
            .iter()
            .map(|cpu| CoreUsage {
                name: cpu.name().to_string(),
                usage_percent: cpu.cpu_usage(),
            })
            .collect();

        CpuSnapshot {
            usage_percent: system.global_cpu_usage(),
            core_count: cores.len(),
            frequency_mhz: system.cpus().first().map(|c| c.frequency()).unwrap_or(0),
            brand: system
                .cpus()
                .first()
                .map(|c| c.brand().to_string())
                .unwrap_or_default(),
            cores,
        }
    }

    /// Snapshot RAM and swap usage.
    pub fn memory_snapshot(&self) -> MemorySnapshot {
        self.maybe_refresh();

        let system = self.system.read().unwrap();
        let total = system.total_memory();
        let used = system.used_memory();
        let usage_percent = if total > 0 {
            (used as f32 / total as f32) * 100.0
        } else {
            0.0
        };

        MemorySnapshot {
            total_bytes: total,
            used_bytes: used,
            free_bytes: system.free_memory(),
            usage_percent,
            swap_total_bytes: system.total_swap(),
            swap_used_bytes: system.used_swap(),
        }
    }

    /// Snapshot GPU usage via the configured monitor.
    pub fn gpu_snapshot(&self) -> Result<GpuSnapshot> {
        let info = self.gpu_monitor.gpu_info()?;

        Ok(GpuSnapshot {
            available: self.gpu_monitor.is_available(),
            usage_percent: info.usage,
            memory_used_bytes: info.memory_used,
            memory_total_bytes: info.memory_total,
            temperature_c: info.temperature,
            name: info.name,
        })
    }

    /// Refresh sysinfo state if the TTL has expired.
    fn maybe_refresh(&self) {
        let should_refresh = {
            let last_refresh = self.last_refresh.read().unwrap();
            last_refresh
                .map(|t| t.elapsed() >= self.refresh_ttl)
                .unwrap_or(true)
        };

        if should_refresh {
            let mut system = self.system.write().unwrap();
            system.refresh_cpu_all();
            system.refresh_memory();

            let mut last_refresh = self.last_refresh.write().unwrap();
            *last_refresh = Some(Instant::now());
        }
    }
}

impl Default for SystemTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryProvider for SystemTelemetry {
    fn query(&self, category: Category) -> Result<serde_json::Value> {
        let value = match category {
            Category::Cpu => serde_json::to_value(self.cpu_snapshot())?,
            Category::Memory => serde_json::to_value(self.memory_snapshot())?,
            Category::Gpu => serde_json::to_value(self.gpu_snapshot()?)?,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::super::NoOpGpuMonitor;
    use super::*;

    #[test]
    fn test_cpu_snapshot_sanity() {
        let telemetry = SystemTelemetry::new();
        let snapshot = telemetry.cpu_snapshot();

        assert!(snapshot.usage_percent >= 0.0);
        assert!(snapshot.core_count > 0);
        assert_eq!(snapshot.cores.len(), snapshot.core_count);
    }

    #[test]
    fn test_memory_snapshot_sanity() {
        let telemetry = SystemTelemetry::new();
        let snapshot = telemetry.memory_snapshot();

        assert!(snapshot.total_bytes > 0);
        assert!(snapshot.used_bytes <= snapshot.total_bytes);
        assert!(snapshot.usage_percent >= 0.0 && snapshot.usage_percent <= 100.0);
    }

    #[test]
    fn test_gpu_snapshot_without_adapter() {
        let telemetry = SystemTelemetry::with_gpu_monitor(Box::new(NoOpGpuMonitor));
        let snapshot = telemetry.gpu_snapshot().unwrap();

        assert!(!snapshot.available);
        assert_eq!(snapshot.memory_total_bytes, 0);
    }

    #[test]
    fn test_query_returns_object_payloads() {
        let telemetry = SystemTelemetry::with_gpu_monitor(Box::new(NoOpGpuMonitor));

        for category in Category::all() {
            let value = telemetry.query(category).unwrap();
            assert!(value.is_object(), "{} payload should be a map", category);
        }
    }
}
