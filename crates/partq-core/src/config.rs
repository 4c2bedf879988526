//! Query configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{QueryError, Result};

/// Upper bound on partitions per query.
pub const MAX_SUPPORTED_DOP: usize = 512;

/// Chunks a pipelined channel may hold before its producer blocks.
pub const DEFAULT_BOUNDED_BUFFER_CAPACITY: usize = 512;

/// Elements per channel chunk when auto-buffering.
pub const DEFAULT_CHUNK_SIZE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Fall back to sequential evaluation when an operator would otherwise
    /// have to serialize its input to stay correct.
    #[default]
    Default,
    /// Stay parallel even when that costs a premature merge.
    ForceParallelism,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOptions {
    /// Hand each element to the consumer as soon as it is produced.
    NotBuffered,
    /// Producers fill chunks; the consumer reads concurrently.
    #[default]
    AutoBuffered,
    /// Run every partition to completion before the consumer sees anything.
    FullyBuffered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Number of partitions a source splits into. Must be in `1..=512`.
    pub degree_of_parallelism: usize,

    pub execution_mode: ExecutionMode,

    pub merge_options: MergeOptions,

    /// Max chunks buffered per pipelined channel.
    pub bounded_buffer_capacity: usize,

    /// Elements per chunk (forced to 1 under `NotBuffered`).
    pub chunk_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            degree_of_parallelism: cores.min(MAX_SUPPORTED_DOP),
            execution_mode: ExecutionMode::Default,
            merge_options: MergeOptions::AutoBuffered,
            bounded_buffer_capacity: DEFAULT_BOUNDED_BUFFER_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl QueryConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `PARTQ_DEGREE_OF_PARALLELISM`: partition count
    /// - `PARTQ_EXECUTION_MODE`: `default` or `force_parallelism`
    /// - `PARTQ_MERGE_OPTIONS`: `not_buffered`, `auto_buffered`, `fully_buffered`
    /// - `PARTQ_BUFFER_CAPACITY`: chunks per pipelined channel
    /// - `PARTQ_CHUNK_SIZE`: elements per chunk
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_parse::<usize>("PARTQ_DEGREE_OF_PARALLELISM") {
            cfg.degree_of_parallelism = v;
        }
        if let Some(v) = env_parse::<ExecutionMode>("PARTQ_EXECUTION_MODE") {
            cfg.execution_mode = v;
        }
        if let Some(v) = env_parse::<MergeOptions>("PARTQ_MERGE_OPTIONS") {
            cfg.merge_options = v;
        }
        if let Some(v) = env_parse::<usize>("PARTQ_BUFFER_CAPACITY") {
            cfg.bounded_buffer_capacity = v;
        }
        if let Some(v) = env_parse::<usize>("PARTQ_CHUNK_SIZE") {
            cfg.chunk_size = v;
        }

        cfg
    }

    pub fn with_degree_of_parallelism(mut self, dop: usize) -> Self {
        self.degree_of_parallelism = dop;
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_merge_options(mut self, options: MergeOptions) -> Self {
        self.merge_options = options;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.degree_of_parallelism == 0 || self.degree_of_parallelism > MAX_SUPPORTED_DOP {
            return Err(QueryError::Config(format!(
                "degree_of_parallelism must be in 1..={MAX_SUPPORTED_DOP}, got {}",
                self.degree_of_parallelism
            )));
        }
        if self.bounded_buffer_capacity == 0 {
            return Err(QueryError::Config(
                "bounded_buffer_capacity must be positive".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(QueryError::Config("chunk_size must be positive".into()));
        }
        Ok(())
    }

    /// Chunk size a pipelined channel should use under these options.
    pub fn effective_chunk_size(&self, options: MergeOptions) -> usize {
        match options {
            MergeOptions::NotBuffered => 1,
            _ => self.chunk_size.max(1),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl FromStr for ExecutionMode {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(ExecutionMode::Default),
            "force_parallelism" => Ok(ExecutionMode::ForceParallelism),
            other => Err(QueryError::Config(format!("unknown execution mode '{other}'"))),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Default => f.write_str("default"),
            ExecutionMode::ForceParallelism => f.write_str("force_parallelism"),
        }
    }
}

impl FromStr for MergeOptions {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "not_buffered" => Ok(MergeOptions::NotBuffered),
            "auto_buffered" => Ok(MergeOptions::AutoBuffered),
            "fully_buffered" => Ok(MergeOptions::FullyBuffered),
            other => Err(QueryError::Config(format!("unknown merge options '{other}'"))),
        }
    }
}

impl fmt::Display for MergeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeOptions::NotBuffered => f.write_str("not_buffered"),
            MergeOptions::AutoBuffered => f.write_str("auto_buffered"),
            MergeOptions::FullyBuffered => f.write_str("fully_buffered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let cfg = QueryConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.degree_of_parallelism >= 1);
    }

    #[test]
    fn rejects_zero_partitions() {
        let cfg = QueryConfig::default().with_degree_of_parallelism(0);
        assert!(matches!(cfg.validate(), Err(QueryError::Config(_))));
    }

    #[test]
    fn modes_parse_from_snake_case() {
        assert_eq!(
            "force_parallelism".parse::<ExecutionMode>().unwrap(),
            ExecutionMode::ForceParallelism
        );
        assert_eq!(
            "FULLY_BUFFERED".parse::<MergeOptions>().unwrap(),
            MergeOptions::FullyBuffered
        );
        assert!("sometimes".parse::<MergeOptions>().is_err());
    }

    #[test]
    fn not_buffered_uses_single_element_chunks() {
        let cfg = QueryConfig::default();
        assert_eq!(cfg.effective_chunk_size(MergeOptions::NotBuffered), 1);
        assert_eq!(
            cfg.effective_chunk_size(MergeOptions::AutoBuffered),
            DEFAULT_CHUNK_SIZE
        );
    }
}
