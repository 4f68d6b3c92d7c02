// src/resource/gpu.rs

//! Accelerator discovery through `nvidia-smi`.

use std::collections::BTreeSet;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::ResourceId;
use super::dynamic::{ProbeFuture, ResourceProbe};
use crate::errors::ProbeError;

/// Default maximum utilization and memory ratio for a device to count as free.
pub const DEFAULT_GPU_THRESHOLD: f64 = 0.05;

const QUERY_FIELDS: &str = "--query-gpu=index,utilization.gpu,memory.used,memory.total";
const QUERY_FORMAT: &str = "--format=csv,nounits,noheader";

/// Reports a GPU as available when both its utilization ratio and its
/// memory-used/memory-total ratio are at most `threshold`.
#[derive(Debug, Clone)]
pub struct NvidiaSmiProbe {
    threshold: f64,
    program: String,
}

impl NvidiaSmiProbe {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            program: "nvidia-smi".to_string(),
        }
    }

    /// Use a different executable (e.g. an absolute path to `nvidia-smi`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    async fn query(&self) -> Result<BTreeSet<ResourceId>, ProbeError> {
        let output = Command::new(&self.program)
            .arg(QUERY_FIELDS)
            .arg(QUERY_FORMAT)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeError::QueryFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let free = parse_gpu_query(&stdout, self.threshold)?;
        debug!(free = ?free, threshold = self.threshold, "gpu probe finished");
        Ok(free)
    }
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self::new(DEFAULT_GPU_THRESHOLD)
    }
}

impl ResourceProbe for NvidiaSmiProbe {
    fn available(&self) -> ProbeFuture<'_> {
        Box::pin(self.query())
    }
}

/// One device line of the `nvidia-smi` query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuReading {
    pub index: usize,
    /// Utilization in `[0, 1]`.
    pub utilization: f64,
    /// `memory.used / memory.total`; `1.0` when the total is reported as zero.
    pub memory_ratio: f64,
}

impl GpuReading {
    pub fn is_free(&self, threshold: f64) -> bool {
        self.utilization <= threshold && self.memory_ratio <= threshold
    }
}

/// Parse `index, utilization %, memory used MiB, memory total MiB` lines.
///
/// Devices whose utilization or memory is not a number (`[N/A]`,
/// `[Not Supported]`) are left out. A line with the wrong number of fields
/// or a bad index is an error.
pub fn parse_gpu_readings(output: &str) -> Result<Vec<GpuReading>, ProbeError> {
    let mut readings = Vec::new();
    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(reading) = parse_line(line)? {
            readings.push(reading);
        }
    }
    Ok(readings)
}

/// Indices of the devices that are free under `threshold`.
pub fn parse_gpu_query(output: &str, threshold: f64) -> Result<BTreeSet<ResourceId>, ProbeError> {
    Ok(parse_gpu_readings(output)?
        .into_iter()
        .filter(|reading| reading.is_free(threshold))
        .map(|reading| ResourceId::from(reading.index))
        .collect())
}

fn parse_line(line: &str) -> Result<Option<GpuReading>, ProbeError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [index, utilization, used, total] = fields.as_slice() else {
        return Err(parse_error(line, format!("expected 4 fields, got {}", fields.len())));
    };

    let index: usize = index
        .parse()
        .map_err(|e| parse_error(line, format!("bad index: {e}")))?;

    let (Ok(utilization), Ok(used), Ok(total)) = (
        utilization.parse::<f64>(),
        used.parse::<f64>(),
        total.parse::<f64>(),
    ) else {
        debug!(gpu = index, line = %line, "gpu reports no usable reading; treating as busy");
        return Ok(None);
    };

    let memory_ratio = if total > 0.0 { used / total } else { 1.0 };

    Ok(Some(GpuReading {
        index,
        utilization: utilization / 100.0,
        memory_ratio,
    }))
}

fn parse_error(line: &str, reason: String) -> ProbeError {
    ProbeError::Parse {
        line: line.to_string(),
        reason,
    }
}
