//! Grid data model consumed by the playback engine
//!
//! Column indices are canvas-space: 0 is the first musical column, legends
//! are not counted, tonic columns are.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TonegridError};

/// 2:3 modulation (compression)
pub const COMPRESSION_2_3: f64 = 2.0 / 3.0;
/// 3:2 modulation (expansion)
pub const EXPANSION_3_2: f64 = 3.0 / 2.0;

const FLAT_SYMBOL: char = '\u{266d}';
const SHARP_SYMBOL: char = '\u{266f}';

/// Style of the boundary line drawn after a macrobeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundaryStyle {
    /// Measure line
    Solid,
    #[default]
    Dashed,
    /// Boundary inside a pickup measure
    Anacrusis,
}

/// Grouping of microbeat columns into macrobeats
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RhythmStructure {
    /// Microbeats per macrobeat
    pub macrobeat_groupings: Vec<u32>,
    /// `boundary_styles[i]` is the boundary after macrobeat `i`
    pub boundary_styles: Vec<BoundaryStyle>,
    pub has_anacrusis: bool,
}

impl RhythmStructure {
    pub fn new(macrobeat_groupings: Vec<u32>) -> Self {
        let boundary_styles = vec![BoundaryStyle::Dashed; macrobeat_groupings.len().saturating_sub(1)];
        Self {
            macrobeat_groupings,
            boundary_styles,
            has_anacrusis: false,
        }
    }

    /// Builder: set boundary styles and the anacrusis flag
    pub fn with_boundaries(mut self, boundary_styles: Vec<BoundaryStyle>, has_anacrusis: bool) -> Self {
        self.boundary_styles = boundary_styles;
        self.has_anacrusis = has_anacrusis;
        self
    }
}

/// Zero-duration key/tonic annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TonicMarker {
    /// Markers sharing a group are one logical tonic spanning two columns
    pub group: Option<u64>,
    /// Canvas column occupied by this marker
    pub column: usize,
    /// Macrobeat this tonic follows; `None` means before the first one
    pub pre_macrobeat: Option<usize>,
}

impl TonicMarker {
    pub fn new(column: usize, pre_macrobeat: Option<usize>) -> Self {
        Self {
            group: None,
            column,
            pre_macrobeat,
        }
    }

    pub fn in_group(mut self, group: u64) -> Self {
        self.group = Some(group);
        self
    }
}

/// Tempo modulation anchored at a measure boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulationMarker {
    pub id: String,
    /// Macrobeat after which the modulation begins
    pub measure_index: usize,
    /// >1 stretches, <1 compresses; never zero
    pub ratio: f64,
    pub active: bool,
    /// Canvas x of the boundary line, when the editor recorded one
    pub x_position: Option<f64>,
}

impl ModulationMarker {
    pub fn new(id: impl Into<String>, measure_index: usize, ratio: f64) -> Result<Self> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(TonegridError::InvalidRatio(ratio));
        }
        Ok(Self {
            id: id.into(),
            measure_index,
            ratio,
            active: true,
            x_position: None,
        })
    }

    pub fn with_x_position(mut self, x: f64) -> Self {
        self.x_position = Some(x);
        self
    }

    /// Short label such as "2:3"
    pub fn display_text(&self) -> String {
        if (self.ratio - COMPRESSION_2_3).abs() < 0.001 {
            "2:3".to_string()
        } else if (self.ratio - EXPANSION_3_2).abs() < 0.001 {
            "3:2".to_string()
        } else {
            format!("{}", self.ratio)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoteShape {
    #[default]
    Circle,
    Oval,
    Diamond,
}

/// Pitched note spanning `start_column..=end_column`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedNote {
    pub id: String,
    pub row: usize,
    pub start_column: usize,
    pub end_column: usize,
    pub shape: NoteShape,
    /// Voice color; selects the timbre in the sound engine
    pub color: String,
}

/// One-shot drum trigger on a drum track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrumHit {
    pub id: String,
    pub track: u8,
    pub start_column: usize,
    pub end_column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StampShapeKind {
    /// Eighth note
    Oval,
    /// Sixteenth note
    Diamond,
}

/// Single shape inside a stamp cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampShape {
    pub kind: StampShapeKind,
    /// Sixteenth slot within the cell (0-3)
    pub slot: u8,
    /// Pitch offset in rows from the placement row
    pub row_offset: i32,
}

/// Rhythm stamp occupying one cell (two microbeat columns)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampPlacement {
    pub id: String,
    pub start_column: usize,
    pub row: usize,
    pub color: String,
    pub shapes: Vec<StampShape>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripletSpan {
    /// Three triplet eighths in one cell
    Eighth,
    /// Three triplet quarters across two cells
    Quarter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripletHit {
    pub slot: u8,
    pub row_offset: i32,
}

/// Triplet group anchored at a cell index (1 cell = 2 columns)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripletPlacement {
    pub id: String,
    pub start_cell: usize,
    pub span: TripletSpan,
    pub row: usize,
    pub color: String,
    pub hits: Vec<TripletHit>,
}

impl TripletPlacement {
    /// Canvas column of the first cell; `None` when the cell index is
    /// past the end of the addressable columns
    pub fn start_column(&self) -> Option<usize> {
        self.start_cell.checked_mul(2)
    }
}

/// Anything placed on the grid that produces sound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlacedEvent {
    Note(PlacedNote),
    Drum(DrumHit),
    Stamp(StampPlacement),
    Triplet(TripletPlacement),
}

impl PlacedEvent {
    pub fn id(&self) -> &str {
        match self {
            Self::Note(n) => &n.id,
            Self::Drum(d) => &d.id,
            Self::Stamp(s) => &s.id,
            Self::Triplet(t) => &t.id,
        }
    }
}

/// Normalised pitch name, e.g. "Bb4"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pitch(String);

impl Pitch {
    pub fn new(tone_note: &str) -> Self {
        let normalized = tone_note
            .chars()
            .map(|c| match c {
                FLAT_SYMBOL => 'b',
                SHARP_SYMBOL => '#',
                other => other,
            })
            .collect();
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchRow {
    pub tone_note: String,
    pub hex: String,
}

/// Full pitch range, indexed by global row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PitchGamut {
    pub rows: Vec<PitchRow>,
}

impl PitchGamut {
    pub fn new(rows: Vec<PitchRow>) -> Self {
        Self { rows }
    }

    pub fn pitch_for_row(&self, row: i64) -> Option<Pitch> {
        let idx = usize::try_from(row).ok()?;
        self.rows.get(idx).map(|r| Pitch::new(&r.tone_note))
    }
}

/// Snapshot of the editor state the engine plays from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    pub column_widths: Vec<u32>,
    /// Nominal tempo in BPM
    pub tempo: f64,
    pub tonic_markers: Vec<TonicMarker>,
    pub rhythm: RhythmStructure,
    pub modulation_markers: Vec<ModulationMarker>,
    pub events: Vec<PlacedEvent>,
    pub gamut: PitchGamut,
    pub looping: bool,
    /// When set, only these event ids are played (lasso selection)
    pub isolation: Option<HashSet<String>>,
}

impl Grid {
    pub fn new(column_widths: Vec<u32>, tempo: f64) -> Self {
        let rhythm = RhythmStructure::new(vec![1; column_widths.len()]);
        Self {
            column_widths,
            tempo,
            tonic_markers: Vec::new(),
            rhythm,
            modulation_markers: Vec::new(),
            events: Vec::new(),
            gamut: PitchGamut::default(),
            looping: false,
            isolation: None,
        }
    }

    /// Canvas columns that carry no time
    pub fn tonic_columns(&self) -> BTreeSet<usize> {
        self.tonic_markers.iter().map(|t| t.column).collect()
    }

    pub fn is_audible(&self, event_id: &str) -> bool {
        self.isolation.as_ref().is_none_or(|ids| ids.contains(event_id))
    }
}
