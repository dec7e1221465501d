//! Expansion of stamp and triplet placements into timed sub-events

use crate::grid::{StampPlacement, StampShapeKind, TripletPlacement, TripletSpan};

/// Sixteenth slots in one stamp cell
pub const STAMP_SLOTS: u8 = 4;
/// Hits in one triplet group
pub const TRIPLET_SLOTS: u8 = 3;

/// Seconds per quarter note (one cell)
pub fn quarter_duration(tempo: f64) -> f64 {
    60.0 / tempo
}

/// One pitched hit inside a composite placement, relative to the cell start
#[derive(Debug, Clone, PartialEq)]
pub struct SubEvent {
    pub offset: f64,
    pub duration: f64,
    pub row_offset: i32,
    pub shape_key: String,
}

/// Expanded sub-events plus the keys of shapes that could not be placed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub events: Vec<SubEvent>,
    pub invalid: Vec<String>,
}

pub fn stamp_sub_events(stamp: &StampPlacement, quarter: f64) -> Expansion {
    let sixteenth = quarter / 4.0;
    let mut out = Expansion::default();

    for shape in &stamp.shapes {
        let (prefix, duration) = match shape.kind {
            StampShapeKind::Oval => ("oval", quarter / 2.0),
            StampShapeKind::Diamond => ("diamond", sixteenth),
        };
        let shape_key = format!("{}_{}", prefix, shape.slot);
        if shape.slot >= STAMP_SLOTS {
            out.invalid.push(shape_key);
            continue;
        }
        out.events.push(SubEvent {
            offset: shape.slot as f64 * sixteenth,
            duration,
            row_offset: shape.row_offset,
            shape_key,
        });
    }

    out
}

pub fn triplet_sub_events(triplet: &TripletPlacement, quarter: f64) -> Expansion {
    let step = match triplet.span {
        TripletSpan::Eighth => quarter / 3.0,
        TripletSpan::Quarter => quarter * 2.0 / 3.0,
    };
    let mut out = Expansion::default();

    for hit in &triplet.hits {
        let shape_key = format!("triplet_{}", hit.slot);
        if hit.slot >= TRIPLET_SLOTS {
            out.invalid.push(shape_key);
            continue;
        }
        out.events.push(SubEvent {
            offset: hit.slot as f64 * step,
            duration: step,
            row_offset: hit.row_offset,
            shape_key,
        });
    }

    out
}
