/// Per-call configuration records for the layer kernels.
///
/// Records are plain serde structs. Optional keys fall back to the defaults
/// below when loaded from JSON; `mode` never has a default.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

pub const DEFAULT_EPS: f64 = 1e-5;
pub const DEFAULT_MOMENTUM: f64 = 0.9;

fn default_eps() -> f64 { DEFAULT_EPS }
fn default_momentum() -> f64 { DEFAULT_MOMENTUM }

// ── Mode ─────────────────────────────────────────────────────────────

/// Forward mode for batchnorm and dropout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Mode {
    Train,
    Test,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Test => "test",
        }
    }
}

impl FromStr for Mode {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Mode::Train),
            "test" => Ok(Mode::Test),
            other => Err(KernelError::InvalidMode { mode: other.to_string() }),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = KernelError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> String {
        mode.as_str().to_string()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Batch normalization ──────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchNormConfig {
    pub mode: Mode,
    /// Added to the batch standard deviation (train) or running variance (test).
    #[serde(default = "default_eps")]
    pub eps: f64,
    /// EMA decay for the running statistics.
    #[serde(default = "default_momentum")]
    pub momentum: f64,
}

impl BatchNormConfig {
    pub fn new(mode: Mode) -> Self {
        BatchNormConfig { mode, eps: DEFAULT_EPS, momentum: DEFAULT_MOMENTUM }
    }

    pub fn train() -> Self {
        Self::new(Mode::Train)
    }

    pub fn test() -> Self {
        Self::new(Mode::Test)
    }
}

/// Exponentially averaged per-feature statistics.
///
/// Owned by the caller. Batchnorm reads it and hands back an updated copy;
/// it is never mutated in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    pub mean: Vec<f64>,
    pub var: Vec<f64>,
}

impl RunningStats {
    pub fn zeros(features: usize) -> Self {
        RunningStats { mean: vec![0.0; features], var: vec![0.0; features] }
    }

    pub fn features(&self) -> usize {
        self.mean.len()
    }
}

// ── Dropout ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DropoutConfig {
    /// Keep probability: each element survives with probability `p`.
    pub p: f64,
    pub mode: Mode,
    /// Fixed seed for a reproducible mask (gradient checking).
    #[serde(default)]
    pub seed: Option<u64>,
}

impl DropoutConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.p) {
            return Err(KernelError::invalid_argument("p", format!("{} is not in [0, 1]", self.p)));
        }
        Ok(())
    }
}

// ── Sliding-window kernels ───────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvConfig {
    pub stride: usize,
    pub pad: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub pool_height: usize,
    pub pool_width: usize,
    pub stride: usize,
}

// ── Loading ──────────────────────────────────────────────────────────

/// A configuration record that can be loaded from a JSON mapping.
///
/// Malformed JSON, missing keys and wrong value types are `Config` errors.
/// Records carrying a `mode` read it as a plain string and parse it
/// afterwards, so an unknown mode surfaces as `InvalidMode`.
pub trait ConfigRecord: Sized {
    fn from_json(json: &str) -> Result<Self>;
}

/// Parse any configuration record from a JSON mapping.
pub fn from_json<T: ConfigRecord>(json: &str) -> Result<T> {
    T::from_json(json)
}

fn parse_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| KernelError::Config(e.to_string()))
}

#[derive(Deserialize)]
struct RawBatchNormConfig {
    mode: String,
    #[serde(default = "default_eps")]
    eps: f64,
    #[serde(default = "default_momentum")]
    momentum: f64,
}

impl ConfigRecord for BatchNormConfig {
    fn from_json(json: &str) -> Result<Self> {
        let raw: RawBatchNormConfig = parse_json(json)?;
        Ok(BatchNormConfig { mode: raw.mode.parse()?, eps: raw.eps, momentum: raw.momentum })
    }
}

#[derive(Deserialize)]
struct RawDropoutConfig {
    p: f64,
    mode: String,
    #[serde(default)]
    seed: Option<u64>,
}

impl ConfigRecord for DropoutConfig {
    fn from_json(json: &str) -> Result<Self> {
        let raw: RawDropoutConfig = parse_json(json)?;
        let cfg = DropoutConfig { p: raw.p, mode: raw.mode.parse()?, seed: raw.seed };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl ConfigRecord for ConvConfig {
    fn from_json(json: &str) -> Result<Self> {
        parse_json(json)
    }
}

impl ConfigRecord for PoolConfig {
    fn from_json(json: &str) -> Result<Self> {
        parse_json(json)
    }
}

impl ConfigRecord for RunningStats {
    fn from_json(json: &str) -> Result<Self> {
        let stats: RunningStats = parse_json(json)?;
        if stats.mean.len() != stats.var.len() {
            return Err(KernelError::shape_mismatch("RunningStats", &[stats.mean.len()], &[stats.var.len()]));
        }
        Ok(stats)
    }
}
