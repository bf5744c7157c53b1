//! Environment checks that gate a test before it runs

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tokio::process::Command;

use crate::descriptor::TestSpec;
use crate::error::{BenchError, BenchResult};
use crate::traits::DatabaseClient;

/// Drops the Linux page cache; needs passwordless sudo
pub const DEFAULT_FLUSH_COMMAND: &str = "(>&2 echo 'Flushing disk cache...') \
     && (sudo sh -c 'echo 3 > /proc/sys/vm/drop_caches') \
     && (>&2 echo 'Flushed.')";

/// A precondition declared by a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// Flush the OS disk cache before running
    FlushDiskCache,
    /// Require at least this many bytes of physical memory
    RamSize(u64),
    /// Require the named table to exist on the server
    TableExists(String),
}

/// Total physical memory in bytes, 0 when it cannot be determined
pub fn detect_memory() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.total_memory()
}

/// Evaluates a descriptor's preconditions in declaration order
///
/// A failed cache flush rejects the test immediately. Memory and table
/// checks are all evaluated and the result is their conjunction.
pub struct PreconditionGate {
    client: Arc<dyn DatabaseClient>,
    flush_command: String,
    memory: Option<u64>,
}

impl PreconditionGate {
    /// Create a gate that checks tables through the given client
    pub fn new(client: Arc<dyn DatabaseClient>) -> Self {
        Self {
            client,
            flush_command: DEFAULT_FLUSH_COMMAND.to_string(),
            memory: None,
        }
    }

    /// Use a different shell command to flush the disk cache
    pub fn with_flush_command(mut self, command: impl Into<String>) -> Self {
        self.flush_command = command.into();
        self
    }

    /// Use a fixed memory size instead of detecting it
    pub fn with_memory(mut self, bytes: u64) -> Self {
        self.memory = Some(bytes);
        self
    }

    /// Check every precondition of `spec`
    ///
    /// Returns `Ok(false)` when a precondition is not met. Fails only when a
    /// precondition cannot be evaluated on this platform at all.
    pub async fn check(&self, spec: &TestSpec) -> BenchResult<bool> {
        let mut fulfilled = true;

        for precondition in &spec.preconditions {
            match precondition {
                Precondition::FlushDiskCache => {
                    if !self.flush_disk_cache().await {
                        tracing::warn!(test = %spec.name, "Failed to flush disk cache");
                        return Ok(false);
                    }
                }
                Precondition::RamSize(needed) => {
                    let present = self.memory.unwrap_or_else(detect_memory);
                    if present == 0 {
                        return Err(BenchError::not_implemented(
                            "ram_size precondition not available on this platform",
                        ));
                    }
                    if *needed > present {
                        tracing::warn!(
                            test = %spec.name,
                            needed = *needed,
                            present,
                            "Not enough RAM"
                        );
                        fulfilled = false;
                    }
                }
                Precondition::TableExists(table) => {
                    if !self.table_exists(&spec.name, table).await {
                        fulfilled = false;
                    }
                }
            }
        }

        Ok(fulfilled)
    }

    async fn flush_disk_cache(&self) -> bool {
        match Command::new("sh")
            .arg("-c")
            .arg(&self.flush_command)
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not spawn disk cache flush command");
                false
            }
        }
    }

    async fn table_exists(&self, test: &str, table: &str) -> bool {
        match self.client.exists_object(table).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(test, table, "Table doesn't exist");
                false
            }
            Err(e) => {
                tracing::warn!(test, table, error = %e, "Table existence check failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for PreconditionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreconditionGate")
            .field("client", &self.client.endpoint())
            .field("flush_command", &self.flush_command)
            .field("memory", &self.memory)
            .finish()
    }
}
