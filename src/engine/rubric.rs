use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
    pub letter: &'static str,
    pub remark: &'static str,
}

// Lower bound inclusive, checked top-down.
const BANDS: [(i64, &str, &str); 6] = [
    (70, "A", "Excellent"),
    (60, "B", "Very Good"),
    (50, "C", "Good"),
    (45, "D", "Fair"),
    (40, "E", "Pass"),
    (0, "F", "Fail"),
];

/// Maps a subject total to its letter grade and remark.
///
/// Totals outside `0..=100` are a caller error; nothing is clamped here.
pub fn grade_for(total: i64) -> EngineResult<Grade> {
    if !(0..=100).contains(&total) {
        return Err(EngineError::ScoreOutOfRange { total });
    }
    let (_, letter, remark) = BANDS
        .iter()
        .copied()
        .find(|(floor, _, _)| total >= *floor)
        .unwrap_or(BANDS[BANDS.len() - 1]);
    Ok(Grade { letter, remark })
}

/// A record with no total carries no grade.
pub fn grade_for_total(total: Option<i64>) -> EngineResult<Option<Grade>> {
    total.map(grade_for).transpose()
}
