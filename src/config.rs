// src/config.rs
//
// =============================================================================
// PIPETLAB: PIPETTOR CONFIGURATION (v 0.1 )
// =============================================================================
//
// Hardware constants of the pipetting head.
//
// Responsibilities:
// 1. Provide factory defaults (8-channel head, 2 mm pitch, 103 mm Z travel).
// 2. Load overrides from YAML; missing keys keep their defaults.
// 3. Validate before the engine is constructed.
//
// The struct is built once and handed to the engine; nothing reads it globally.

use crate::errors::{LabError, LabResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipettorConfig {
    /// Tips on the multichannel head.
    pub channel_count: usize,
    /// Pitch between adjacent channels (mm).
    pub channel_spacing: f64,
    /// Upper bound on positions served by one aspirate/dispense cycle.
    pub max_batch_size: usize,
    /// Tip volume (µL) -> tip length (mm).
    pub tip_lengths: BTreeMap<u32, f64>,
    /// Mechanical Z travel limit (mm).
    pub z_max: f64,
    /// Sleep between pause polls.
    pub pause_poll_ms: u64,
    /// Extra height above the post-dispense surface (mm).
    pub dispense_clearance: f64,
}

impl Default for PipettorConfig {
    fn default() -> Self {
        let mut tip_lengths = BTreeMap::new();
        tip_lengths.insert(200, 38.0);
        tip_lengths.insert(1000, 90.0);
        Self {
            channel_count: 8,
            channel_spacing: 2.0,
            max_batch_size: 5,
            tip_lengths,
            z_max: 103.0,
            pause_poll_ms: 100,
            dispense_clearance: 5.0,
        }
    }
}

impl PipettorConfig {
    pub fn from_yaml_str(src: &str) -> LabResult<Self> {
        let cfg: PipettorConfig = serde_yaml::from_str(src)
            .map_err(|e| LabError::InvalidInput(format!("failed to parse pipettor config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> LabResult<Self> {
        let path = path.as_ref();
        let src = fs::read_to_string(path).map_err(|e| {
            LabError::InvalidInput(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&src)
    }

    pub fn validate(&self) -> LabResult<()> {
        if self.channel_count == 0 {
            return Err(LabError::InvalidInput("channel_count must be at least 1".into()));
        }
        if self.max_batch_size == 0 {
            return Err(LabError::InvalidInput("max_batch_size must be at least 1".into()));
        }
        if !(self.channel_spacing >= 0.0) {
            return Err(LabError::InvalidInput(format!(
                "channel_spacing must be non-negative, got {}",
                self.channel_spacing
            )));
        }
        if !(self.z_max > 0.0) {
            return Err(LabError::InvalidInput(format!(
                "z_max must be positive, got {}",
                self.z_max
            )));
        }
        if self.tip_lengths.is_empty() {
            return Err(LabError::InvalidInput("tip_lengths table is empty".into()));
        }
        if let Some((vol, len)) = self.tip_lengths.iter().find(|(_, len)| !(**len > 0.0)) {
            return Err(LabError::InvalidInput(format!(
                "tip length for {vol}µL tips must be positive, got {len}"
            )));
        }
        Ok(())
    }

    /// Length of the tip used for a given tip volume.
    pub fn tip_length(&self, tip_volume: u32) -> LabResult<f64> {
        self.tip_lengths.get(&tip_volume).copied().ok_or_else(|| {
            let known: Vec<String> = self.tip_lengths.keys().map(|k| k.to_string()).collect();
            LabError::InvalidInput(format!(
                "no tip length configured for {tip_volume}µL tips (known: {})",
                known.join(", ")
            ))
        })
    }

    /// Active channel count for the selected head mode.
    pub fn channels(&self, multichannel: bool) -> usize {
        if multichannel {
            self.channel_count
        } else {
            1
        }
    }
}
