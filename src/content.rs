// src/content.rs
//
// =============================================================================
// PIPETLAB: CONTENT LEDGER (v 0.1 )
// =============================================================================
//
// Volume bookkeeping for containers and tips.
//
// Responsibilities:
// 1. Track substance -> volume (µL) per container.
// 2. Enforce capacity on add and availability on remove.
// 3. Remove proportionally across a mixture.
//
// Mixing model: liquids in one vessel are treated as instantly and uniformly
// mixed, so a removal takes the same fraction of every substance. This is a
// modelling approximation, not a physical guarantee.

use crate::core::{PRUNE_EPSILON, VOLUME_TOLERANCE};
use crate::errors::{LabError, LabResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// 1. THE LEDGER (Value)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentLedger(BTreeMap<String, f64>);

impl ContentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(substance: &str, volume: f64) -> Self {
        let mut ledger = Self::new();
        ledger.insert(substance, volume);
        ledger
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn volume_of(&self, substance: &str) -> f64 {
        self.0.get(substance).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, substance: &str) -> bool {
        self.0.contains_key(substance)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Unchecked insert. Callers validate capacity first.
    pub(crate) fn insert(&mut self, substance: &str, volume: f64) {
        *self.0.entry(substance.to_string()).or_insert(0.0) += volume;
        self.prune();
    }

    pub(crate) fn merge(&mut self, other: &ContentLedger) {
        for (substance, volume) in other.iter() {
            *self.0.entry(substance.to_string()).or_insert(0.0) += volume;
        }
        self.prune();
    }

    /// Unchecked proportional removal. Returns what was taken out.
    pub(crate) fn take_proportional(&mut self, volume: f64) -> ContentLedger {
        let total = self.total();
        let mut removed = ContentLedger::new();
        if total <= 0.0 || volume <= 0.0 {
            return removed;
        }
        let ratio = (volume / total).min(1.0);
        for (substance, amount) in self.0.iter_mut() {
            let take = *amount * ratio;
            *amount -= take;
            removed.0.insert(substance.clone(), take);
        }
        self.prune();
        removed.prune();
        removed
    }

    /// Same mixture, scaled by `factor`.
    pub fn scaled(&self, factor: f64) -> ContentLedger {
        let mut out = ContentLedger(self.0.iter().map(|(k, v)| (k.clone(), v * factor)).collect());
        out.prune();
        out
    }

    /// "PBS: 150.0µL, water: 100.0µL" or "empty".
    pub fn summary(&self) -> String {
        if self.0.is_empty() {
            return "empty".to_string();
        }
        self.0
            .iter()
            .map(|(k, v)| format!("{k}: {v:.1}µL"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn prune(&mut self) {
        self.0.retain(|_, v| *v > PRUNE_EPSILON);
    }
}

// ============================================================================
// 2. VALIDATION RULES
// ============================================================================

/// Checks that `volume` of `substance` fits into a container holding `total`.
pub fn check_add(
    owner: &str,
    total: f64,
    capacity: f64,
    substance: &str,
    volume: f64,
) -> LabResult<()> {
    if substance.trim().is_empty() {
        return Err(LabError::InvalidInput(format!(
            "content type for {owner} must be a non-empty name"
        )));
    }
    check_volume(owner, volume)?;
    if total + volume > capacity {
        return Err(LabError::Capacity(format!(
            "overflow in {owner}: {total:.2}µL + {volume:.2}µL exceeds capacity {capacity:.2}µL"
        )));
    }
    Ok(())
}

/// Resolves the volume actually removed from a container holding `total`.
/// Requests up to `VOLUME_TOLERANCE` above the total are promoted to the total.
pub fn resolve_removal(owner: &str, total: f64, volume: f64) -> LabResult<f64> {
    check_volume(owner, volume)?;
    if volume > total + VOLUME_TOLERANCE {
        return Err(LabError::Capacity(format!(
            "underflow in {owner}: requested {volume:.2}µL but only {total:.2}µL available"
        )));
    }
    Ok(volume.min(total))
}

pub fn check_volume(owner: &str, volume: f64) -> LabResult<()> {
    if !volume.is_finite() || volume < 0.0 {
        return Err(LabError::InvalidInput(format!(
            "volume for {owner} must be a non-negative number, got {volume}"
        )));
    }
    Ok(())
}

// ============================================================================
// 3. CAPABILITY: CONTENT HOLDER
// ============================================================================

/// Anything that stores liquid: wells and reservoirs.
pub trait ContentHolder {
    fn holder_id(&self) -> &str;
    fn capacity(&self) -> f64;
    fn ledger(&self) -> &ContentLedger;
    fn ledger_mut(&mut self) -> &mut ContentLedger;

    fn add_content(&mut self, substance: &str, volume: f64) -> LabResult<()> {
        check_add(self.holder_id(), self.get_total_volume(), self.capacity(), substance, volume)?;
        self.ledger_mut().insert(substance, volume);
        Ok(())
    }

    /// Adds a whole mixture at once (all or nothing).
    fn add_mixture(&mut self, mixture: &ContentLedger) -> LabResult<()> {
        let volume = mixture.total();
        let total = self.get_total_volume();
        if total + volume > self.capacity() + VOLUME_TOLERANCE {
            return Err(LabError::Capacity(format!(
                "overflow in {}: {total:.2}µL + {volume:.2}µL exceeds capacity {:.2}µL",
                self.holder_id(),
                self.capacity()
            )));
        }
        self.ledger_mut().merge(mixture);
        Ok(())
    }

    /// Removes `volume` proportionally and returns the removed mixture.
    fn remove_content(&mut self, volume: f64) -> LabResult<ContentLedger> {
        let total = self.get_total_volume();
        if total <= 0.0 && volume > VOLUME_TOLERANCE {
            return Err(LabError::Capacity(format!(
                "cannot remove {volume:.2}µL from empty {}",
                self.holder_id()
            )));
        }
        let effective = resolve_removal(self.holder_id(), total, volume)?;
        Ok(self.ledger_mut().take_proportional(effective))
    }

    fn get_total_volume(&self) -> f64 {
        self.ledger().total()
    }

    fn get_available_volume(&self) -> f64 {
        (self.capacity() - self.get_total_volume()).max(0.0)
    }

    fn get_volume_of(&self, substance: &str) -> f64 {
        self.ledger().volume_of(substance)
    }

    fn has_content_type(&self, substance: &str) -> bool {
        self.ledger().contains(substance)
    }

    fn content_summary(&self) -> String {
        self.ledger().summary()
    }

    fn clear_content(&mut self) {
        self.ledger_mut().clear();
    }
}

// ============================================================================
// 4. TIP LEDGER
// ============================================================================

/// Per-channel content of the attached tips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipLedger {
    tips: Vec<ContentLedger>,
    tip_volume: f64,
}

impl TipLedger {
    pub fn new(channels: usize, tip_volume: f64) -> Self {
        Self {
            tips: vec![ContentLedger::new(); channels],
            tip_volume,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.tips.len()
    }

    pub fn tip_volume(&self) -> f64 {
        self.tip_volume
    }

    pub fn tip(&self, index: usize) -> Option<&ContentLedger> {
        self.tips.get(index)
    }

    pub fn tips(&self) -> &[ContentLedger] {
        &self.tips
    }

    pub fn volume_at(&self, index: usize) -> f64 {
        self.tips.get(index).map(ContentLedger::total).unwrap_or(0.0)
    }

    pub fn total_volume(&self) -> f64 {
        self.tips.iter().map(ContentLedger::total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tips.iter().all(ContentLedger::is_empty)
    }

    /// Checks that each `(tip, mixture)` pair fits without touching state.
    pub fn check_fill(&self, fills: &[(usize, &ContentLedger)]) -> LabResult<()> {
        let mut pending = vec![0.0; self.tips.len()];
        for (index, mixture) in fills {
            let slot = pending.get_mut(*index).ok_or_else(|| self.bad_index(*index))?;
            *slot += mixture.total();
        }
        for (index, extra) in pending.iter().enumerate() {
            let current = self.volume_at(index);
            if current + extra > self.tip_volume + VOLUME_TOLERANCE {
                return Err(LabError::Capacity(format!(
                    "tip {index} overflow: {current:.2}µL + {extra:.2}µL exceeds {:.0}µL",
                    self.tip_volume
                )));
            }
        }
        Ok(())
    }

    pub fn fill(&mut self, fills: &[(usize, &ContentLedger)]) -> LabResult<()> {
        self.check_fill(fills)?;
        for (index, mixture) in fills {
            self.tips[*index].merge(mixture);
        }
        Ok(())
    }

    /// Adds a named substance to one tip, or to every tip when `index` is None.
    pub fn add_content(
        &mut self,
        substance: &str,
        volume: f64,
        index: Option<usize>,
    ) -> LabResult<()> {
        check_volume("tip", volume)?;
        let mixture = ContentLedger::with(substance, volume);
        let fills: Vec<(usize, &ContentLedger)> = match index {
            Some(i) => vec![(i, &mixture)],
            None => (0..self.tips.len()).map(|i| (i, &mixture)).collect(),
        };
        self.fill(&fills)
    }

    /// Checks that each `(tip, volume)` drain is available.
    pub fn check_drain(&self, drains: &[(usize, f64)]) -> LabResult<()> {
        let mut pending = vec![0.0; self.tips.len()];
        for (index, volume) in drains {
            check_volume("tip", *volume)?;
            let slot = pending.get_mut(*index).ok_or_else(|| self.bad_index(*index))?;
            *slot += volume;
        }
        for (index, want) in pending.iter().enumerate() {
            resolve_removal(&format!("tip {index}"), self.volume_at(index), *want)?;
        }
        Ok(())
    }

    /// Proportional removal per tip; returns the removed mixtures in order.
    pub fn drain(&mut self, drains: &[(usize, f64)]) -> LabResult<Vec<ContentLedger>> {
        self.check_drain(drains)?;
        let mut removed = Vec::with_capacity(drains.len());
        for (index, volume) in drains {
            let tip = &mut self.tips[*index];
            let effective = volume.min(tip.total());
            removed.push(tip.take_proportional(effective));
        }
        Ok(removed)
    }

    /// Removes from one tip, or splits evenly across all tips when `index` is None.
    pub fn remove_content(
        &mut self,
        volume: f64,
        index: Option<usize>,
    ) -> LabResult<ContentLedger> {
        let drains: Vec<(usize, f64)> = match index {
            Some(i) => vec![(i, volume)],
            None => {
                let per_tip = volume / self.tips.len().max(1) as f64;
                (0..self.tips.len()).map(|i| (i, per_tip)).collect()
            }
        };
        let mut combined = ContentLedger::new();
        for part in self.drain(&drains)? {
            combined.merge(&part);
        }
        Ok(combined)
    }

    pub fn clear(&mut self) {
        for tip in &mut self.tips {
            tip.clear();
        }
    }

    /// Aggregated content of all tips.
    pub fn summary(&self) -> String {
        let mut combined = ContentLedger::new();
        for tip in &self.tips {
            combined.merge(tip);
        }
        combined.summary()
    }

    /// One line per tip: "tip 0: 150.0/1000µL (PBS: 150.0µL)".
    pub fn status(&self) -> Vec<String> {
        self.tips
            .iter()
            .enumerate()
            .map(|(i, t)| {
                format!(
                    "tip {i}: {:.1}/{:.0}µL ({})",
                    t.total(),
                    self.tip_volume,
                    t.summary()
                )
            })
            .collect()
    }

    fn bad_index(&self, index: usize) -> LabError {
        LabError::InvalidInput(format!(
            "tip index {index} out of range for {} channel(s)",
            self.tips.len()
        ))
    }
}
