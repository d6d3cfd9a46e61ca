use crate::models::UNMEASURED_LATENCY_MS;

/// Returns a human-readable grade for a measured round-trip latency.
///
/// Thresholds are tuned for picking an interactive game server: anything under
/// 50ms is indistinguishable from LAN play, past 150ms input lag is noticeable.
pub fn latency_grade(latency_ms: i32) -> &'static str {
    match latency_ms {
        UNMEASURED_LATENCY_MS => "Unreachable",
        0..=49 => "Excellent",
        50..=99 => "Good",
        100..=149 => "Fair",
        150.. => "Poor",
        _ => "Unreachable",
    }
}

/// Computes a score from 0.0 (unusable) to 100.0 (best) for a latency.
///
/// Unmeasured probes score 0.
pub fn latency_score(latency_ms: i32) -> f64 {
    if latency_ms < 0 {
        return 0.0;
    }
    // 100 at 0ms, 0 at 300ms+
    ((1.0 - (latency_ms as f64 / 300.0).min(1.0)) * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grades_by_threshold() {
        assert_eq!(latency_grade(0), "Excellent");
        assert_eq!(latency_grade(49), "Excellent");
        assert_eq!(latency_grade(50), "Good");
        assert_eq!(latency_grade(120), "Fair");
        assert_eq!(latency_grade(800), "Poor");
    }

    #[test]
    fn sentinel_is_unreachable() {
        assert_eq!(latency_grade(UNMEASURED_LATENCY_MS), "Unreachable");
        assert_eq!(latency_grade(-7), "Unreachable");
    }

    #[test]
    fn perfect_latency() {
        assert!((latency_score(0) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clamps_above_threshold() {
        assert!((latency_score(1000) - 0.0).abs() < f64::EPSILON);
        assert!((latency_score(-1) - 0.0).abs() < f64::EPSILON);
    }
}
