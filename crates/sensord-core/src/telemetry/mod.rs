//! Hardware telemetry categories and the provider seam.
//!
//! Sessions consume telemetry through the [`TelemetryProvider`] trait so
//! the connection server stays independent of where sensor values come
//! from. The production implementation is [`SystemTelemetry`] (sysinfo for
//! CPU/memory, nvidia-smi for GPU); tests substitute fixed providers.

mod gpu;
mod system;

pub use gpu::{create_gpu_monitor, GpuInfo, GpuMonitor, NoOpGpuMonitor, NvidiaSmiMonitor};
pub use system::{CoreUsage, CpuSnapshot, GpuSnapshot, MemorySnapshot, SystemTelemetry};

use crate::error::Result;

/// A recognized telemetry category.
///
/// Parsing is case-sensitive: the wire contract takes lowercase tokens
/// only, and anything else is an unknown category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Cpu,
    Memory,
    Gpu,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cpu => "cpu",
            Category::Memory => "memory",
            Category::Gpu => "gpu",
        }
    }

    /// Parse a request token. Returns `None` for unrecognized strings.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cpu" => Some(Category::Cpu),
            "memory" => Some(Category::Memory),
            "gpu" => Some(Category::Gpu),
            _ => None,
        }
    }

    /// All recognized categories, in wire-name order.
    pub fn all() -> [Category; 3] {
        [Category::Cpu, Category::Memory, Category::Gpu]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source of telemetry snapshots, queried synchronously per category.
///
/// Implementations must be safe for concurrent independent queries; each
/// session calls `query` from its own task. Latency is expected to be
/// bounded (sub-second), so queries run inline on the session task.
pub trait TelemetryProvider: Send + Sync + 'static {
    /// Produce a snapshot for `category` as an opaque JSON payload.
    ///
    /// Errors are reported to the client as a `Status=0` envelope; they
    /// never close the connection.
    fn query(&self, category: Category) -> Result<serde_json::Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for category in Category::all() {
            let parsed = Category::parse(category.as_str()).expect("Should parse");
            assert_eq!(category, parsed);
        }
    }

    #[test]
    fn test_category_parse_is_case_sensitive() {
        assert_eq!(Category::parse("cpu"), Some(Category::Cpu));
        assert_eq!(Category::parse("CPU"), None);
        assert_eq!(Category::parse("Memory"), None);
        assert_eq!(Category::parse(""), None);
        assert_eq!(Category::parse("klsjflksjdf"), None);
    }
}
