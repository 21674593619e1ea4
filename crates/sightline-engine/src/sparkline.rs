//! Unit-height Unicode bar charts.

/// The 8-level bar alphabet, lowest to highest.
pub const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render `values` as one bar character each.
///
/// Bounds default to the data's min/max; pass `Some` to pin either end (the
/// reporter pins footprint charts to `[0, max_footprint]` so every line is
/// drawn on the same scale). The extent is floored at 1 so a flat series
/// renders as the lowest bar instead of dividing by zero.
///
/// Returns `(effective_min, effective_max, bars)`. Empty input yields
/// `(0, 0, "")`.
pub fn sparkline(
    values: &[f64],
    fixed_min: Option<f64>,
    fixed_max: Option<f64>,
) -> (f64, f64, String) {
    if values.is_empty() {
        return (0.0, 0.0, String::new());
    }
    let mn = fixed_min.unwrap_or_else(|| values.iter().copied().fold(f64::INFINITY, f64::min));
    let mx = fixed_max.unwrap_or_else(|| values.iter().copied().fold(f64::NEG_INFINITY, f64::max));
    let extent = (mx - mn).max(1.0);

    let bars = values
        .iter()
        .map(|v| {
            let index = ((v - mn) / extent * BARS.len() as f64).floor() as i64;
            BARS[index.clamp(0, BARS.len() as i64 - 1) as usize]
        })
        .collect();
    (mn, mx, bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(sparkline(&[], None, None), (0.0, 0.0, String::new()));
    }

    #[test]
    fn one_bar_per_value() {
        let values = [1.0, 5.0, 22.0, 13.0, 53.0];
        let (_, _, bars) = sparkline(&values, None, None);
        assert_eq!(bars.chars().count(), values.len());
        assert!(bars.chars().all(|c| BARS.contains(&c)));
    }

    #[test]
    fn ramp_spans_the_alphabet() {
        let values = [0.0, 8.0, 16.0, 24.0, 32.0, 40.0, 48.0, 56.0, 64.0];
        let (mn, mx, bars) = sparkline(&values, None, None);
        assert_eq!(mn, 0.0);
        assert_eq!(mx, 64.0);
        assert!(bars.starts_with('▁'));
        assert!(bars.ends_with('█'));
    }

    #[test]
    fn flat_series_renders_lowest_bar() {
        let (_, _, bars) = sparkline(&[3.0, 3.0, 3.0], None, None);
        assert_eq!(bars, "▁▁▁");
    }

    #[test]
    fn fixed_bounds_pin_the_scale() {
        // 5 out of a pinned [0, 100] range lands in the lowest bucket even
        // though it is the series maximum.
        let (mn, mx, bars) = sparkline(&[5.0], Some(0.0), Some(100.0));
        assert_eq!((mn, mx), (0.0, 100.0));
        assert_eq!(bars, "▁");
    }

    #[test]
    fn values_outside_fixed_bounds_clamp() {
        let (_, _, bars) = sparkline(&[-10.0, 250.0], Some(0.0), Some(100.0));
        assert_eq!(bars, "▁█");
    }
}
