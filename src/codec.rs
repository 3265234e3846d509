// src/codec.rs
//
// =============================================================================
// PIPETLAB: PERSISTENCE CODEC (v 0.1 )
// =============================================================================
//
// Stable JSON contract for saving and loading a deck graph.
//
// - Labware is keyed by the `class` discriminator; the set of classes is
//   closed and listed in `LABWARE_CLASSES`.
// - Documents carry `format_version`; other versions are rejected.
// - Decoding rebuilds the id index and re-validates every invariant.
//
// No file I/O happens here. Callers own the bytes.

use crate::deck::Deck;
use crate::errors::{LabError, LabResult};
use crate::labware::Labware;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FORMAT_VERSION: u32 = 1;

/// Every labware class the decoder accepts.
pub const LABWARE_CLASSES: &[&str] = &[
    "Plate",
    "Well",
    "Reservoir",
    "ReservoirHolder",
    "PipetteHolder",
    "IndividualPipetteHolder",
    "TipDropzone",
    "Stack",
];

#[derive(Serialize, Deserialize)]
struct DeckDocument {
    format_version: u32,
    deck: Deck,
}

#[derive(Serialize)]
struct DeckDocumentRef<'a> {
    format_version: u32,
    deck: &'a Deck,
}

pub fn encode_deck(deck: &Deck) -> LabResult<String> {
    Ok(serde_json::to_string_pretty(&DeckDocumentRef {
        format_version: FORMAT_VERSION,
        deck,
    })?)
}

pub fn decode_deck(src: &str) -> LabResult<Deck> {
    let raw: Value = serde_json::from_str(src)?;
    check_version(&raw)?;
    if let Some(slots) = raw.pointer("/deck/slots").and_then(Value::as_object) {
        for (slot_id, slot) in slots {
            let stack = slot.get("stack").and_then(Value::as_array);
            for entry in stack.into_iter().flatten() {
                if let Some(lw) = entry.get("labware") {
                    check_class(lw).map_err(|e| LabError::Codec(format!("slot '{slot_id}': {e}")))?;
                }
            }
        }
    }
    let doc: DeckDocument = serde_json::from_value(raw)?;
    let mut deck = doc.deck;
    deck.reindex()?;
    log::debug!("decoded deck '{}' ({} labware)", deck.id, deck.labware().count());
    Ok(deck)
}

pub fn encode_labware(labware: &Labware) -> LabResult<String> {
    Ok(serde_json::to_string_pretty(labware)?)
}

pub fn decode_labware(src: &str) -> LabResult<Labware> {
    let raw: Value = serde_json::from_str(src)?;
    check_class(&raw)?;
    let lw: Labware = serde_json::from_value(raw)?;
    lw.validate()?;
    Ok(lw)
}

fn check_version(raw: &Value) -> LabResult<()> {
    match raw.get("format_version").and_then(Value::as_u64) {
        Some(v) if v == u64::from(FORMAT_VERSION) => Ok(()),
        Some(v) => Err(LabError::Codec(format!(
            "unsupported format_version {v}; this build reads version {FORMAT_VERSION}"
        ))),
        None => Err(LabError::Codec("document has no format_version".into())),
    }
}

fn check_class(raw: &Value) -> LabResult<()> {
    let class = raw
        .get("class")
        .and_then(Value::as_str)
        .ok_or_else(|| LabError::Codec("labware entry has no 'class' field".into()))?;
    if !LABWARE_CLASSES.contains(&class) {
        return Err(LabError::Codec(format!(
            "unknown labware class '{class}' (known: {})",
            LABWARE_CLASSES.join(", ")
        )));
    }
    Ok(())
}
