//! Points and cleared-row bookkeeping.

/// Points awarded per cleared row.
pub const POINTS_PER_ROW: u32 = 5;
/// Extra points for clearing four rows with a single docking.
pub const TETRIS_BONUS: u32 = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
    points: u32,
    rows: u32,
}

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `deleted` cleared rows. Returns whether the points changed.
    pub fn calculate(&mut self, deleted: usize) -> bool {
        if deleted == 0 {
            return false;
        }
        let deleted = deleted as u32;
        self.rows += deleted;
        self.points += deleted * POINTS_PER_ROW;
        if deleted == 4 {
            self.points += TETRIS_BONUS;
        }
        true
    }

    /// Overwrites the point total with the host's authoritative value.
    pub fn set_points(&mut self, points: u32) {
        self.points = points;
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_rows_no_change() {
        let mut score = Score::new();
        assert!(!score.calculate(0));
        assert_eq!(score.points(), 0);
        assert_eq!(score.rows(), 0);
    }

    #[test]
    fn test_points_per_row() {
        let mut score = Score::new();
        assert!(score.calculate(1));
        assert_eq!(score.points(), 5);
        assert!(score.calculate(3));
        assert_eq!(score.points(), 20);
        assert_eq!(score.rows(), 4);
    }

    #[test]
    fn test_tetris_bonus() {
        let mut score = Score::new();
        assert!(score.calculate(4));
        assert_eq!(score.points(), 70);
        assert_eq!(score.rows(), 4);
    }

    #[test]
    fn test_set_points_overwrites() {
        let mut score = Score::new();
        score.calculate(2);
        score.set_points(125);
        assert_eq!(score.points(), 125);
        assert_eq!(score.rows(), 2);
    }
}
