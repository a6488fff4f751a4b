//! ConsoleTransport - renders frames via tracing (dev mode)

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{DeliveryError, DeliveryTransport, Grid};
use tracing::{info, instrument};

const BLANK: char = '▢';
const FILLED: char = '█';

/// Transport that logs the board instead of calling the device
pub struct ConsoleTransport {
    name: String,
    delivered: AtomicU64,
}

impl ConsoleTransport {
    /// Create a new ConsoleTransport with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delivered: AtomicU64::new(0),
        }
    }

    /// Frames rendered so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl DeliveryTransport for ConsoleTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "console_transport_deliver",
        skip(self, grid),
        fields(transport = %self.name, filled = grid.filled_cells())
    )]
    async fn deliver(&self, grid: &Grid) -> Result<(), DeliveryError> {
        let frame = self.delivered.fetch_add(1, Ordering::Relaxed) + 1;
        info!(frame, "DEV MODE: would send to board\n{}", render_grid(grid));
        Ok(())
    }
}

/// Bordered text rendering of a grid
pub fn render_grid(grid: &Grid) -> String {
    let inner = contracts::GRID_COLS * 2 + 1;
    let mut out = String::new();
    out.push('┌');
    out.extend(std::iter::repeat_n('─', inner));
    out.push_str("┐\n");

    for row in grid.rows() {
        out.push_str("│ ");
        let cells: Vec<String> = row.iter().map(|&code| glyph(code).to_string()).collect();
        out.push_str(&cells.join(" "));
        out.push_str(" │\n");
    }

    out.push('└');
    out.extend(std::iter::repeat_n('─', inner));
    out.push('┘');
    out
}

/// Display glyph for a character code
pub(crate) fn glyph(code: u8) -> char {
    match code {
        0 => BLANK,
        1..=26 => char::from(b'A' + code - 1),
        27..=35 => char::from(b'1' + code - 27),
        36 => '0',
        37 => '!',
        38 => '@',
        39 => '#',
        40 => '$',
        41 => '(',
        42 => ')',
        44 => '-',
        46 => '+',
        47 => '&',
        48 => '=',
        49 => ';',
        50 => ':',
        52 => '\'',
        53 => '"',
        54 => '%',
        55 => ',',
        56 => '.',
        59 => '/',
        60 => '?',
        62 => '°',
        // 颜色块
        _ => FILLED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glyph_ranges() {
        assert_eq!(glyph(0), BLANK);
        assert_eq!(glyph(1), 'A');
        assert_eq!(glyph(26), 'Z');
        assert_eq!(glyph(27), '1');
        assert_eq!(glyph(35), '9');
        assert_eq!(glyph(36), '0');
        assert_eq!(glyph(63), FILLED);
        assert_eq!(glyph(71), FILLED);
    }

    #[test]
    fn test_render_grid_shape() {
        let mut rows = [[0u8; 22]; 6];
        rows[0][0] = 8; // H
        rows[0][1] = 9; // I
        let rendered = render_grid(&Grid::from_rows(rows).unwrap());

        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 8);
        assert!(lines[1].starts_with("│ H I ▢"));
        let widths: Vec<usize> = lines.iter().map(|l| l.chars().count()).collect();
        assert!(widths.iter().all(|&w| w == widths[0]));
    }

    #[tokio::test]
    async fn test_console_transport_deliver() {
        let transport = ConsoleTransport::new("test_console");
        transport.deliver(&Grid::blank()).await.unwrap();
        transport.deliver(&Grid::blank()).await.unwrap();
        assert_eq!(transport.delivered(), 2);
        assert_eq!(transport.name(), "test_console");
    }
}
