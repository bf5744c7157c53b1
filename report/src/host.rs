//! Host metadata included in every report

use serde::Serialize;
use sysinfo::System;

/// Machine the benchmark ran on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    /// Host name, empty when unknown
    pub hostname: String,
    /// Physical CPU cores
    pub num_cores: usize,
    /// Logical CPUs
    pub num_threads: usize,
    /// Total physical memory, bytes
    pub ram: u64,
}

impl HostInfo {
    /// Probe the current machine
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();

        let num_threads = sys.cpus().len();
        let host = Self {
            hostname: System::host_name().unwrap_or_default(),
            num_cores: sys.physical_core_count().unwrap_or(num_threads),
            num_threads,
            ram: sys.total_memory(),
        };

        tracing::debug!(
            hostname = %host.hostname,
            cores = host.num_cores,
            threads = host.num_threads,
            ram = host.ram,
            "Collected host info"
        );
        host
    }
}
