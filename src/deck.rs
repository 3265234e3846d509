// src/deck.rs
//
// =============================================================================
// PIPETLAB: DECK & SLOTS (v 0.1 )
// =============================================================================
//
// The placement authority.
//
// Responsibilities:
// 1. Own every slot and every placed labware.
// 2. Validate slot bounds/overlap and labware fit/stacking.
// 3. Keep a flat labware-id -> slot-id index for lookups.
// 4. Enforce LIFO-by-height removal inside a slot.

use crate::core::{Span, Xy};
use crate::errors::{LabError, LabResult};
use crate::labware::{Labware, PipetteHolder, TipDropzone};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub mod allocator;

// ============================================================================
// 1. SLOT
// ============================================================================

/// One labware in a slot together with its occupied height band.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackEntry {
    pub labware: Labware,
    pub min_z: f64,
    pub max_z: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub id: String,
    pub range_x: Span,
    pub range_y: Span,
    /// Maximum stack height inside the slot.
    pub range_z: f64,
    /// Sorted by `min_z`.
    #[serde(default)]
    stack: Vec<StackEntry>,
}

impl Slot {
    pub fn new(id: &str, range_x: Span, range_y: Span, range_z: f64) -> LabResult<Self> {
        if id.trim().is_empty() {
            return Err(LabError::InvalidInput("slot id must not be blank".into()));
        }
        if range_x.is_empty() || range_y.is_empty() || !(range_z > 0.0) {
            return Err(LabError::InvalidInput(format!(
                "slot '{id}' must have a positive extent on every axis"
            )));
        }
        Ok(Self {
            id: id.to_string(),
            range_x,
            range_y,
            range_z,
            stack: Vec::new(),
        })
    }

    pub fn entries(&self) -> &[StackEntry] {
        &self.stack
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Top of the highest labware (0 when empty).
    pub fn max_z(&self) -> f64 {
        self.stack.iter().map(|e| e.max_z).fold(0.0, f64::max)
    }

    pub fn topmost(&self) -> Option<&StackEntry> {
        self.stack.iter().max_by(|a, b| a.max_z.total_cmp(&b.max_z))
    }

    /// Corner used as grid anchor: (min x, min y).
    pub fn corner(&self) -> Xy {
        Xy::new(self.range_x.lo(), self.range_y.lo())
    }

    fn overlaps(&self, other: &Slot) -> bool {
        self.range_x.overlaps(&other.range_x) && self.range_y.overlaps(&other.range_y)
    }

    /// Fit and stacking rules for placing `lw` with its bottom at `min_z`.
    pub fn check_compatible(&self, lw: &Labware, min_z: f64) -> LabResult<f64> {
        let size = lw.size();
        let id = lw.id();
        if size.x > self.range_x.len() || size.y > self.range_y.len() {
            return Err(LabError::Placement(format!(
                "{id} ({:.2}x{:.2} mm) does not fit slot '{}' ({:.2}x{:.2} mm)",
                size.x,
                size.y,
                self.id,
                self.range_x.len(),
                self.range_y.len()
            )));
        }
        if min_z < 0.0 {
            return Err(LabError::Placement(format!("{id}: min_z {min_z} is below the deck")));
        }
        let max_z = min_z + size.z;
        if max_z > self.range_z {
            return Err(LabError::Placement(format!(
                "{id}: top at {max_z:.2} mm exceeds slot '{}' height {:.2} mm",
                self.id, self.range_z
            )));
        }
        let band = Span(min_z, max_z);
        if let Some(clash) = self.stack.iter().find(|e| Span(e.min_z, e.max_z).overlaps(&band)) {
            return Err(LabError::Placement(format!(
                "{id}: z-range {min_z:.2}..{max_z:.2} overlaps {} ({:.2}..{:.2}) in slot '{}'",
                clash.labware.id(),
                clash.min_z,
                clash.max_z,
                self.id
            )));
        }
        let below = self
            .stack
            .iter()
            .filter(|e| e.max_z <= min_z)
            .max_by(|a, b| a.max_z.total_cmp(&b.max_z));
        if let Some(support) = below {
            if !support.labware.can_be_stacked_upon() {
                return Err(LabError::Placement(format!(
                    "{id}: {} in slot '{}' cannot be stacked upon",
                    support.labware.id(),
                    self.id
                )));
            }
        }
        Ok(max_z)
    }

    fn insert(&mut self, entry: StackEntry) {
        let at = self.stack.partition_point(|e| e.min_z <= entry.min_z);
        self.stack.insert(at, entry);
    }
}

// ============================================================================
// 2. DECK
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub id: String,
    pub range_x: Span,
    pub range_y: Span,
    pub range_z: f64,
    #[serde(default)]
    slots: BTreeMap<String, Slot>,
    #[serde(skip)]
    index: HashMap<String, String>,
}

impl PartialEq for Deck {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.range_x == other.range_x
            && self.range_y == other.range_y
            && self.range_z == other.range_z
            && self.slots == other.slots
    }
}

impl Deck {
    pub fn new(id: &str, range_x: Span, range_y: Span, range_z: f64) -> LabResult<Self> {
        if range_x.is_empty() || range_y.is_empty() || !(range_z > 0.0) {
            return Err(LabError::InvalidInput(format!(
                "deck '{id}' must have a positive extent on every axis"
            )));
        }
        Ok(Self {
            id: id.to_string(),
            range_x,
            range_y,
            range_z,
            slots: BTreeMap::new(),
            index: HashMap::new(),
        })
    }

    // ==== 1. SLOTS ====

    /// Adds all slots or none.
    fn encloses(&self, slot: &Slot) -> bool {
        self.range_x.contains_span(&slot.range_x) && self.range_y.contains_span(&slot.range_y)
    }

    pub fn add_slots(&mut self, slots: Vec<Slot>) -> LabResult<()> {
        for (i, slot) in slots.iter().enumerate() {
            if !self.encloses(slot) {
                return Err(LabError::Placement(format!(
                    "slot '{}' lies outside deck '{}'",
                    slot.id, self.id
                )));
            }
            if slot.range_z > self.range_z {
                return Err(LabError::Placement(format!(
                    "slot '{}' is taller ({:.2}) than deck '{}' ({:.2})",
                    slot.id, slot.range_z, self.id, self.range_z
                )));
            }
            let earlier = &slots[..i];
            if self.slots.contains_key(&slot.id) || earlier.iter().any(|s| s.id == slot.id) {
                return Err(LabError::Placement(format!("slot id '{}' already exists", slot.id)));
            }
            if let Some(hit) = self
                .slots
                .values()
                .chain(earlier.iter())
                .find(|other| other.overlaps(slot))
            {
                return Err(LabError::Placement(format!(
                    "slot '{}' overlaps slot '{}'",
                    slot.id, hit.id
                )));
            }
        }
        for slot in slots {
            log::debug!("deck '{}': added slot '{}'", self.id, slot.id);
            for e in &slot.stack {
                self.index.insert(e.labware.id().to_string(), slot.id.clone());
            }
            self.slots.insert(slot.id.clone(), slot);
        }
        Ok(())
    }

    /// Removes a slot. Occupied slots need `unplace_labware` to cascade.
    pub fn remove_slot(&mut self, slot_id: &str, unplace_labware: bool) -> LabResult<Slot> {
        let slot = self.slot(slot_id)?;
        if !slot.is_empty() && !unplace_labware {
            let ids: Vec<&str> = slot.stack.iter().map(|e| e.labware.id()).collect();
            return Err(LabError::Placement(format!(
                "slot '{slot_id}' still holds {ids:?}; pass unplace_labware to remove them"
            )));
        }
        let mut slot = self
            .slots
            .remove(slot_id)
            .ok_or_else(|| LabError::NotFound(format!("slot '{slot_id}'")))?;
        for e in slot.stack.iter_mut().rev() {
            e.labware.clear_positions();
            self.index.remove(e.labware.id());
        }
        Ok(slot)
    }

    pub fn slot(&self, slot_id: &str) -> LabResult<&Slot> {
        self.slots
            .get(slot_id)
            .ok_or_else(|| LabError::NotFound(format!("slot '{slot_id}' on deck '{}'", self.id)))
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values()
    }

    // ==== 2. LABWARE ====

    /// Places `labware` in `slot_id` with its bottom at `min_z`.
    pub fn add_labware(
        &mut self,
        mut labware: Labware,
        slot_id: &str,
        min_z: f64,
    ) -> LabResult<()> {
        labware.validate()?;
        let id = labware.id().to_string();
        if let Some(existing) = self.index.get(&id) {
            return Err(LabError::Placement(format!(
                "labware id '{id}' is already placed in slot '{existing}'"
            )));
        }
        let slot = self
            .slots
            .get_mut(slot_id)
            .ok_or_else(|| LabError::NotFound(format!("slot '{slot_id}'")))?;
        let max_z = slot.check_compatible(&labware, min_z)?;
        allocator::place(&mut labware, slot.corner());
        log::info!(
            "placed {} '{}' in slot '{}' at z {:.2}..{:.2}",
            labware.class_name(),
            id,
            slot_id,
            min_z,
            max_z
        );
        slot.insert(StackEntry {
            labware,
            min_z,
            max_z,
        });
        self.index.insert(id, slot_id.to_string());
        Ok(())
    }

    /// Removes the topmost labware of its slot and clears all positions.
    pub fn remove_labware(&mut self, labware_id: &str) -> LabResult<Labware> {
        let slot_id = self.slot_id_of(labware_id)?.to_string();
        let slot = self
            .slots
            .get_mut(&slot_id)
            .ok_or_else(|| LabError::NotFound(format!("slot '{slot_id}'")))?;
        let top = slot
            .topmost()
            .map(|e| e.labware.id().to_string())
            .unwrap_or_default();
        if top != labware_id {
            return Err(LabError::Placement(format!(
                "cannot remove '{labware_id}': '{top}' is stacked above it in slot '{slot_id}'"
            )));
        }
        let at = slot
            .stack
            .iter()
            .position(|e| e.labware.id() == labware_id)
            .ok_or_else(|| LabError::NotFound(format!("labware '{labware_id}'")))?;
        let mut entry = slot.stack.remove(at);
        entry.labware.clear_positions();
        self.index.remove(labware_id);
        log::info!("removed '{labware_id}' from slot '{slot_id}'");
        Ok(entry.labware)
    }

    pub fn slot_id_of(&self, labware_id: &str) -> LabResult<&str> {
        self.index
            .get(labware_id)
            .map(String::as_str)
            .ok_or_else(|| {
                LabError::NotFound(format!("labware '{labware_id}' is not on deck '{}'", self.id))
            })
    }

    pub fn entry(&self, labware_id: &str) -> LabResult<&StackEntry> {
        let slot = self.slot(self.slot_id_of(labware_id)?)?;
        slot.stack
            .iter()
            .find(|e| e.labware.id() == labware_id)
            .ok_or_else(|| LabError::NotFound(format!("labware '{labware_id}'")))
    }

    pub fn get_labware(&self, labware_id: &str) -> LabResult<&Labware> {
        self.entry(labware_id).map(|e| &e.labware)
    }

    pub fn get_labware_mut(&mut self, labware_id: &str) -> LabResult<&mut Labware> {
        let slot_id = self.slot_id_of(labware_id)?.to_string();
        self.slots
            .get_mut(&slot_id)
            .and_then(|s| s.stack.iter_mut().find(|e| e.labware.id() == labware_id))
            .map(|e| &mut e.labware)
            .ok_or_else(|| LabError::NotFound(format!("labware '{labware_id}'")))
    }

    pub fn contains_labware(&self, labware_id: &str) -> bool {
        self.index.contains_key(labware_id)
    }

    pub fn labware(&self) -> impl Iterator<Item = &Labware> {
        self.slots.values().flat_map(|s| s.stack.iter().map(|e| &e.labware))
    }

    pub fn labware_mut(&mut self) -> impl Iterator<Item = &mut Labware> {
        self.slots
            .values_mut()
            .flat_map(|s| s.stack.iter_mut().map(|e| &mut e.labware))
    }

    /// Highest labware of every non-empty slot.
    pub fn topmost_labware(&self) -> Vec<&Labware> {
        self.slots
            .values()
            .filter_map(|s| s.topmost().map(|e| &e.labware))
            .collect()
    }

    /// First tip rack in slot order.
    pub fn first_pipette_holder(&self) -> Option<&PipetteHolder> {
        self.labware().find_map(|lw| match lw {
            Labware::PipetteHolder(h) => Some(h),
            _ => None,
        })
    }

    pub fn first_dropzone(&self) -> Option<&TipDropzone> {
        self.labware().find_map(|lw| match lw {
            Labware::TipDropzone(d) => Some(d),
            _ => None,
        })
    }

    // ==== 3. INTEGRITY ====

    /// Rebuilds the id index and re-checks every structural invariant.
    /// Used after decoding.
    pub fn reindex(&mut self) -> LabResult<()> {
        self.index.clear();
        let slots: Vec<&Slot> = self.slots.values().collect();
        for (i, slot) in slots.iter().enumerate() {
            if !self.encloses(slot) {
                return Err(LabError::Placement(format!(
                    "slot '{}' lies outside deck '{}'",
                    slot.id, self.id
                )));
            }
            if let Some(hit) = slots[..i].iter().find(|o| o.overlaps(slot)) {
                return Err(LabError::Placement(format!(
                    "slot '{}' overlaps slot '{}'",
                    slot.id, hit.id
                )));
            }
            for (j, e) in slot.stack.iter().enumerate() {
                e.labware.validate()?;
                if let Some(other) = slot.stack[..j]
                    .iter()
                    .find(|o| Span(o.min_z, o.max_z).overlaps(&Span(e.min_z, e.max_z)))
                {
                    return Err(LabError::Placement(format!(
                        "{} overlaps {} in slot '{}'",
                        e.labware.id(),
                        other.labware.id(),
                        slot.id
                    )));
                }
                if let Some(prev) = self.index.insert(e.labware.id().to_string(), slot.id.clone()) {
                    return Err(LabError::Placement(format!(
                        "labware id '{}' appears in slots '{prev}' and '{}'",
                        e.labware.id(),
                        slot.id
                    )));
                }
            }
        }
        Ok(())
    }
}
