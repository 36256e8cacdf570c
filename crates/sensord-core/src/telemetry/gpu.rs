//! GPU monitoring support.
//!
//! NVIDIA GPUs are sampled via nvidia-smi; machines without it fall back
//! to a no-op monitor that reports an unavailable adapter. AMD ROCm and
//! Intel monitors can slot in behind the same trait.

use crate::config::TelemetryConfig;
use crate::error::Result;
use std::process::Command;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// One adapter's current readings.
#[derive(Debug, Clone, Default)]
pub struct GpuInfo {
    /// GPU utilization percentage (0-100).
    pub usage: f32,
    /// Used GPU memory in bytes.
    pub memory_used: u64,
    /// Total GPU memory in bytes.
    pub memory_total: u64,
    /// GPU temperature in Celsius (if available).
    pub temperature: Option<f32>,
    /// GPU name/model.
    pub name: Option<String>,
}

/// Trait for GPU monitoring implementations.
pub trait GpuMonitor: Send + Sync {
    /// Whether an adapter is present and sampleable.
    fn is_available(&self) -> bool;

    /// Current readings for the primary adapter.
    fn gpu_info(&self) -> Result<GpuInfo>;

    /// Drop cached readings so the next query re-samples.
    fn refresh(&self);
}

/// NVIDIA GPU monitor using nvidia-smi.
pub struct NvidiaSmiMonitor {
    cache_ttl: Duration,
    cache: RwLock<Option<(GpuInfo, Instant)>>,
    available: bool,
}

impl NvidiaSmiMonitor {
    pub fn new(cache_ttl: Duration) -> Self {
        let available = Command::new("nvidia-smi")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);

        if !available {
            debug!("nvidia-smi not available - GPU monitoring disabled");
        }

        Self {
            cache_ttl,
            cache: RwLock::new(None),
            available,
        }
    }

    /// Query nvidia-smi for utilization, memory, and temperature.
    ///
    /// A failing or oddly formatted nvidia-smi degrades to default (zeroed)
    /// readings rather than an error; the adapter being unsampleable is not
    /// a request fault.
    fn query_gpu_info(&self) -> GpuInfo {
        if !self.available {
            return GpuInfo::default();
        }

        let output = Command::new("nvidia-smi")
            .args([
                "--query-gpu=utilization.gpu,memory.used,memory.total,temperature.gpu,name",
                "--format=csv,noheader,nounits",
            ])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let line = stdout.lines().next().unwrap_or("");
                let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();

                if parts.len() >= 4 {
                    GpuInfo {
                        usage: parts[0].parse::<f32>().unwrap_or(0.0),
                        memory_used: parts[1].parse::<u64>().unwrap_or(0) * 1024 * 1024,
                        memory_total: parts[2].parse::<u64>().unwrap_or(0) * 1024 * 1024,
                        temperature: parts[3].parse::<f32>().ok(),
                        name: parts.get(4).map(|s| s.to_string()),
                    }
                } else {
                    debug!("Unexpected nvidia-smi output format: {}", line);
                    GpuInfo::default()
                }
            }
            Ok(output) => {
                debug!(
                    "nvidia-smi returned non-zero: {}",
                    String::from_utf8_lossy(&output.stderr)
                );
                GpuInfo::default()
            }
            Err(e) => {
                debug!("Failed to run nvidia-smi: {}", e);
                GpuInfo::default()
            }
        }
    }
}

impl Default for NvidiaSmiMonitor {
    fn default() -> Self {
        Self::new(TelemetryConfig::GPU_CACHE_TTL)
    }
}

impl GpuMonitor for NvidiaSmiMonitor {
    fn is_available(&self) -> bool {
        self.available
    }

    fn gpu_info(&self) -> Result<GpuInfo> {
        {
            let cache = self.cache.read().unwrap();
            if let Some((info, sampled_at)) = cache.as_ref() {
                if sampled_at.elapsed() < self.cache_ttl {
                    return Ok(info.clone());
                }
            }
        }

        let info = self.query_gpu_info();

        {
            let mut cache = self.cache.write().unwrap();
            *cache = Some((info.clone(), Instant::now()));
        }

        Ok(info)
    }

    fn refresh(&self) {
        let mut cache = self.cache.write().unwrap();
        *cache = None;
    }
}

/// No-op GPU monitor for systems without a sampleable adapter.
pub struct NoOpGpuMonitor;

impl GpuMonitor for NoOpGpuMonitor {
    fn is_available(&self) -> bool {
        false
    }

    fn gpu_info(&self) -> Result<GpuInfo> {
        Ok(GpuInfo::default())
    }

    fn refresh(&self) {}
}

/// Create the appropriate GPU monitor for the current system.
pub fn create_gpu_monitor() -> Box<dyn GpuMonitor> {
    let nvidia_monitor = NvidiaSmiMonitor::default();
    if nvidia_monitor.is_available() {
        Box::new(nvidia_monitor)
    } else {
        Box::new(NoOpGpuMonitor)
    }
}
