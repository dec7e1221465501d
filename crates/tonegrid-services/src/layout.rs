//! Canvas x positions of grid columns

/// Pixel geometry of canvas columns
pub trait ColumnLayout: Send {
    fn column_start_x(&self, column: usize) -> Option<f64>;
    fn column_width(&self, column: usize) -> Option<f64>;
    /// Right edge of the last musical column
    fn musical_width(&self) -> f64;
}

/// Column layout computed from the width table and a cell width in pixels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnPositions {
    starts: Vec<f64>,
    widths: Vec<f64>,
}

impl ColumnPositions {
    pub fn new(column_widths: &[u32], cell_width: f64) -> Self {
        let widths: Vec<f64> = column_widths.iter().map(|&w| w as f64 * cell_width).collect();
        let mut starts = Vec::with_capacity(widths.len());
        let mut x = 0.0;
        for w in &widths {
            starts.push(x);
            x += w;
        }
        Self { starts, widths }
    }
}

impl ColumnLayout for ColumnPositions {
    fn column_start_x(&self, column: usize) -> Option<f64> {
        self.starts.get(column).copied()
    }

    fn column_width(&self, column: usize) -> Option<f64> {
        self.widths.get(column).copied()
    }

    fn musical_width(&self) -> f64 {
        match (self.starts.last(), self.widths.last()) {
            (Some(x), Some(w)) => x + w,
            _ => 0.0,
        }
    }
}
