use crate::engine::scheme::Component;
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

fn default_weight() -> f64 {
    1.0
}

/// One configured source feeding a component: which examination type to read
/// and how much it weighs in the multi-source formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    pub exam_type: String,
    #[serde(default = "default_weight", alias = "factor")]
    pub weight: f64,
}

/// A student's raw result for one source, plus that source's maximum when the
/// source declares one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceReading {
    pub raw_score: f64,
    pub source_max: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    #[default]
    Nearest,
    Truncate,
}

impl Rounding {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Some(Self::Nearest),
            "truncate" => Some(Self::Truncate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Truncate => "truncate",
        }
    }

    fn apply(self, x: f64) -> i64 {
        match self {
            Self::Nearest => x.round() as i64,
            Self::Truncate => x.trunc() as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregationMode {
    AutoScale,
    Weighted { divisor: f64 },
}

impl AggregationMode {
    /// One source scales; several sources go through the weighted formula.
    pub fn select(source_count: usize, divisor: f64) -> EngineResult<Self> {
        match source_count {
            0 => Err(EngineError::NoSources),
            1 => Ok(Self::AutoScale),
            _ => {
                if !divisor.is_finite() || divisor <= 0.0 {
                    return Err(EngineError::InvalidDivisor(divisor));
                }
                Ok(Self::Weighted { divisor })
            }
        }
    }
}

/// Computes the value of `target` for one student.
///
/// `readings` is parallel to `sources`; `None` means that source has no data
/// for the student. Returns `None` when no source has data, which callers must
/// treat as "leave unset", never as zero.
pub fn aggregate(
    target: &Component,
    sources: &[SourceSpec],
    readings: &[Option<SourceReading>],
    mode: AggregationMode,
    rounding: Rounding,
) -> Option<i64> {
    match mode {
        AggregationMode::AutoScale => {
            let reading = readings.first().copied().flatten()?;
            match reading.source_max {
                Some(max) if max > 0 => {
                    let scaled = (reading.raw_score / max as f64) * target.max_mark as f64;
                    Some(rounding.apply(scaled))
                }
                // No usable maximum: nothing to scale against.
                _ => Some(rounding.apply(reading.raw_score)),
            }
        }
        AggregationMode::Weighted { divisor } => {
            let mut weighted_sum = 0.0;
            let mut any = false;
            for (source, reading) in sources.iter().zip(readings) {
                if let Some(r) = reading {
                    weighted_sum += r.raw_score * source.weight;
                    any = true;
                }
            }
            if !any {
                return None;
            }
            let value = rounding.apply(weighted_sum / divisor);
            Some(value.min(target.max_mark))
        }
    }
}
