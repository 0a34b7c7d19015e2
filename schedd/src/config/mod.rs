//! Machine and runtime configuration loading.
//!
//! The server needs a small amount of host description before it can place
//! processes: how many CPUs exist, which one is the boot processor, and the
//! clock frequency the simulator kernel should report. The expected YAML
//! structure is:
//!
//! ```yaml
//! machine:
//!   processors_count: 4
//!   bsp_id: 0
//!   hz: 100
//! policy: lottery
//! seed: 42
//! ```
//!
//! Every key is optional; absent values fall back to a single-CPU machine
//! ticking at [`DEFAULT_HZ`] under the MLFQ policy.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::sched::Policy;

/// Clock frequency assumed when the configuration does not say otherwise.
pub const DEFAULT_HZ: u32 = 100;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
///
/// Kept private – callers work with [`RuntimeConfig`] instead.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    machine: MachineEntry,
    #[serde(default)]
    policy: Option<Policy>,
    #[serde(default)]
    seed: Option<u64>,
}

/// Machine fields as they appear in the YAML file.
#[derive(Debug, Deserialize)]
struct MachineEntry {
    #[serde(default = "default_processors")]
    processors_count: u32,
    #[serde(default)]
    bsp_id: u32,
    #[serde(default = "default_hz")]
    hz: u32,
}

fn default_processors() -> u32 {
    1
}

fn default_hz() -> u32 {
    DEFAULT_HZ
}

impl Default for MachineEntry {
    fn default() -> Self {
        Self {
            processors_count: default_processors(),
            bsp_id: 0,
            hz: default_hz(),
        }
    }
}

// ── Public data structures ────────────────────────────────────────────────────

/// Processor topology of the host machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Machine {
    /// Number of processors. At least 1.
    pub processors_count: u32,

    /// The bootstrap processor, where system processes are pinned.
    pub bsp_id: u32,
}

impl Machine {
    /// Single-processor machine; the degenerate case where every process
    /// runs on the BSP.
    pub fn single_cpu() -> Self {
        Self {
            processors_count: 1,
            bsp_id: 0,
        }
    }
}

/// Fully resolved runtime configuration for one server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub machine: Machine,

    /// Ticks per second the simulator kernel reports via `sys_hz`.
    pub hz: u32,

    /// Policy active at boot.
    pub policy: Policy,

    /// RNG seed for the lottery draw; `None` means seed from entropy.
    pub seed: Option<u64>,
}

impl RuntimeConfig {
    /// Configuration used when no file is supplied: one CPU, default clock,
    /// MLFQ.
    pub fn default_config() -> Self {
        Self {
            machine: Machine::single_cpu(),
            hz: DEFAULT_HZ,
            policy: Policy::Mlfq,
            seed: None,
        }
    }

    /// Parse `path` into a validated [`RuntimeConfig`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, if the YAML is
    /// structurally invalid, or if the machine description is nonsensical
    /// (zero processors, BSP outside the processor range, zero hz).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading runtime configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: ConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        let machine = file.machine;
        if machine.processors_count == 0 {
            bail!("machine.processors_count must be at least 1");
        }
        if machine.bsp_id >= machine.processors_count {
            bail!(
                "machine.bsp_id {} is outside the processor range 0..{}",
                machine.bsp_id,
                machine.processors_count
            );
        }
        if machine.hz == 0 {
            bail!("machine.hz must be at least 1");
        }

        let config = Self {
            machine: Machine {
                processors_count: machine.processors_count,
                bsp_id: machine.bsp_id,
            },
            hz: machine.hz,
            policy: file.policy.unwrap_or(Policy::Mlfq),
            seed: file.seed,
        };

        info!(
            processors = config.machine.processors_count,
            bsp = config.machine.bsp_id,
            hz = config.hz,
            policy = %config.policy,
            "Configuration loaded"
        );

        Ok(config)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
