//! Memory and duration unit conversion.
//!
//! Every grammar reports memory in kilobytes and durations in seconds. The
//! source logs use a unit letter after each memory value (`B`, `K`, `M`, `G`)
//! and either milliseconds or seconds for pauses.

/// Multiplier that turns a value in the given unit into kilobytes.
///
/// Returns `None` for a letter outside `B|K|M|G` (case-insensitive).
pub fn unit_multiplier(unit: u8) -> Option<f64> {
    match unit.to_ascii_uppercase() {
        b'B' => Some(1.0 / 1024.0),
        b'K' => Some(1.0),
        b'M' => Some(1024.0),
        b'G' => Some(1024.0 * 1024.0),
        _ => None,
    }
}

/// Convert `value` expressed in `unit` to kilobytes.
///
/// An unrecognized unit letter falls back to a multiplier of 1, i.e. the value
/// is taken as already being kilobytes. The fallback is logged.
pub fn to_kilobytes(value: f64, unit: u8) -> u64 {
    let multiplier = match unit_multiplier(unit) {
        Some(m) => m,
        None => {
            tracing::warn!(
                unit = %char::from(unit).escape_default(),
                value,
                "unrecognized memory unit, treating value as kilobytes"
            );
            1.0
        }
    };
    round_kb(value * multiplier)
}

/// Plain byte counts (HP-UX, IBM) to kilobytes.
#[inline]
pub fn bytes_to_kb(bytes: u64) -> u64 {
    round_kb(bytes as f64 / 1024.0)
}

#[inline]
pub fn millis_to_secs(ms: f64) -> f64 {
    ms / 1000.0
}

fn round_kb(kb: f64) -> u64 {
    if kb.is_finite() && kb > 0.0 {
        kb.round() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_units() {
        assert_eq!(to_kilobytes(2048.0, b'B'), 2);
        assert_eq!(to_kilobytes(17.0, b'K'), 17);
        assert_eq!(to_kilobytes(106.0, b'M'), 108_544);
        assert_eq!(to_kilobytes(2.0, b'G'), 2_097_152);
    }

    #[test]
    fn test_units_are_case_insensitive() {
        assert_eq!(to_kilobytes(1.0, b'm'), 1024);
        assert_eq!(to_kilobytes(3.0, b'k'), 3);
    }

    #[test]
    fn test_fractional_values_round() {
        assert_eq!(to_kilobytes(1.5, b'M'), 1536);
        assert_eq!(to_kilobytes(1000.0, b'B'), 1);
        assert_eq!(to_kilobytes(0.0, b'B'), 0);
    }

    // The fallback keeps the raw number. Whether that is graceful degradation
    // or a latent defect is undecided; this test pins the current behavior.
    #[test]
    fn test_unknown_unit_falls_back_to_kilobytes() {
        assert_eq!(unit_multiplier(b'T'), None);
        assert_eq!(to_kilobytes(42.0, b'T'), 42);
        assert_eq!(to_kilobytes(7.0, b'?'), 7);
    }

    #[test]
    fn test_bytes_and_millis() {
        assert_eq!(bytes_to_kb(4_194_304), 4096);
        assert_eq!(bytes_to_kb(0), 0);
        assert!((millis_to_secs(3.688) - 0.003688).abs() < 1e-12);
    }
}
