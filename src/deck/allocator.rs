// src/deck/allocator.rs
//
// =============================================================================
// PIPETLAB: POSITION ALLOCATOR (v 0.1 )
// =============================================================================
//
// Turns a slot corner into absolute XY for a labware and all of its children.
//
// Frame (must match the hardware): X grows leftward, Y grows downward.
// - Grid anchor   = slot corner (min x, min y) + labware offset.
// - Cell (c, r)   = (anchor.x - c * x_spacing, anchor.y + r * y_spacing).
// - Child centre  = (cell.x - size_x/2 - off_x, cell.y + size_y/2 + off_y).
// Spacing, when unset, is (size - 2*offset) / (count - 1), floored at 0.

use crate::core::{round2, Dimensions, Xy};
use crate::labware::{Labware, Placeable, ReservoirHolder};

/// Pitch between adjacent cells along one axis, rounded to 0.01 mm.
pub fn spacing(size: f64, offset: f64, count: usize) -> f64 {
    if count <= 1 {
        return 0.0;
    }
    let s = round2((size - 2.0 * offset) / (count - 1) as f64);
    s.max(0.0)
}

/// Row-major cell anchors: index = row * columns + col.
pub fn grid_positions(
    anchor: Xy,
    columns: usize,
    rows: usize,
    x_spacing: f64,
    y_spacing: f64,
) -> Vec<Xy> {
    let mut cells = Vec::with_capacity(columns * rows);
    for row in 0..rows {
        for col in 0..columns {
            cells.push(Xy::new(
                anchor.x - col as f64 * x_spacing,
                anchor.y + row as f64 * y_spacing,
            ));
        }
    }
    cells
}

pub fn child_center(cell: Xy, size: Dimensions, offset: Xy) -> Xy {
    Xy::new(
        round2(cell.x - size.x / 2.0 - offset.x),
        round2(cell.y + size.y / 2.0 + offset.y),
    )
}

/// Positions `lw` at `corner` and lays out its children.
pub fn place(lw: &mut Labware, corner: Xy) {
    let offset = lw.placeable().offset();
    let at = Xy::new(corner.x + offset.x, corner.y + offset.y);
    lw.placeable_mut().base_mut().position = Some(at);
    layout_children(lw);
}

/// Recomputes child positions from the labware's own position.
pub fn layout_children(lw: &mut Labware) {
    match lw {
        Labware::Plate(p) => {
            let Some(anchor) = p.base.position else { return };
            let xs = *p.x_spacing.get_or_insert(spacing(p.base.size.x, p.base.offset.x, p.columns));
            let ys = *p.y_spacing.get_or_insert(spacing(p.base.size.y, p.base.offset.y, p.rows));
            let cells = grid_positions(anchor, p.columns, p.rows, xs, ys);
            let columns = p.columns;
            for w in p.wells.iter_mut() {
                let Some(g) = w.grid else { continue };
                if let Some(cell) = cells.get(g.row * columns + g.col) {
                    w.base.position = Some(child_center(*cell, w.base.size, w.base.offset));
                }
            }
        }
        Labware::PipetteHolder(h) => {
            let Some(anchor) = h.base.position else { return };
            let xs = *h.x_spacing.get_or_insert(spacing(h.base.size.x, h.base.offset.x, h.columns));
            let ys = *h.y_spacing.get_or_insert(spacing(h.base.size.y, h.base.offset.y, h.rows));
            let cells = grid_positions(anchor, h.columns, h.rows, xs, ys);
            let columns = h.columns;
            for ih in h.holders.iter_mut() {
                let Some(g) = ih.grid else { continue };
                if let Some(cell) = cells.get(g.row * columns + g.col) {
                    ih.base.position = Some(child_center(*cell, ih.base.size, ih.base.offset));
                }
            }
        }
        Labware::ReservoirHolder(h) => layout_reservoirs(h),
        _ => {}
    }
}

/// Reservoirs sit at the (rounded) mean of their hook anchors.
pub fn layout_reservoirs(h: &mut ReservoirHolder) {
    let Some(anchor) = h.base.position else { return };
    let xs = *h.x_spacing.get_or_insert(spacing(h.base.size.x, h.base.offset.x, h.hooks_across_x));
    let ys = *h.y_spacing.get_or_insert(spacing(h.base.size.y, h.base.offset.y, h.hooks_across_y));
    let cells = grid_positions(anchor, h.hooks_across_x, h.hooks_across_y, xs, ys);
    for r in h.reservoirs.iter_mut() {
        let hooks: Vec<Xy> = r
            .hook_ids
            .iter()
            .filter_map(|hook| hook.checked_sub(1).and_then(|i| cells.get(i)).copied())
            .collect();
        let hook_xy = match hooks.len() {
            0 => continue,
            1 => hooks[0],
            n => Xy::new(
                round2(hooks.iter().map(|p| p.x).sum::<f64>() / n as f64),
                round2(hooks.iter().map(|p| p.y).sum::<f64>() / n as f64),
            ),
        };
        r.base.position = Some(child_center(hook_xy, r.base.size, r.base.offset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_grids_have_zero_spacing() {
        assert_eq!(spacing(100.0, 5.0, 1), 0.0);
        assert_eq!(spacing(10.0, 20.0, 4), 0.0);
        assert_eq!(spacing(100.0, 5.0, 10), 10.0);
    }

    #[test]
    fn cells_run_leftward_and_downward() {
        let cells = grid_positions(Xy::new(100.0, 50.0), 2, 2, 9.0, 9.0);
        assert_eq!(cells[1], Xy::new(91.0, 50.0));
        assert_eq!(cells[2], Xy::new(100.0, 59.0));
    }
}
