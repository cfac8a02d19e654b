//! Resource caps applied to every sandbox.
//!
//! Docker expresses a CPU ceiling as a quota of microseconds per scheduling
//! period; a quota of 150_000 over a 100_000 period is 150% of one core.

use serde::{Deserialize, Serialize};

/// CPU scheduling period in microseconds (100ms).
const CPU_PERIOD_MICROS: i64 = 100_000;

/// Resource ceilings for a sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Memory ceiling in mebibytes.
    pub memory_mb: u64,
    /// CPU ceiling in cores (1.5 = 150% of one core).
    pub cpu_cores: f64,
    /// Maximum number of processes, unlimited when `None`.
    pub max_processes: Option<u64>,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            memory_mb: 1536, // 1.5 GiB
            cpu_cores: 1.5,
            max_processes: None,
        }
    }
}

impl ExecutionLimits {
    pub fn new(memory_mb: u64, cpu_cores: f64) -> Self {
        Self {
            memory_mb,
            cpu_cores,
            max_processes: None,
        }
    }

    /// Caps the number of processes inside the sandbox.
    pub fn with_max_processes(mut self, max: u64) -> Self {
        self.max_processes = Some(max);
        self
    }

    /// Memory ceiling in bytes.
    pub fn memory_bytes(&self) -> i64 {
        (self.memory_mb * 1024 * 1024) as i64
    }

    /// CPU period in microseconds.
    pub fn cpu_period(&self) -> i64 {
        CPU_PERIOD_MICROS
    }

    /// CPU quota for the configured cores.
    ///
    /// Formula: quota = period * cores
    pub fn cpu_quota(&self) -> i64 {
        (self.cpu_period() as f64 * self.cpu_cores).round() as i64
    }
}
