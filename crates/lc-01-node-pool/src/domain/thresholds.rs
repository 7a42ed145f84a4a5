//! # Membership Thresholds
//!
//! Integer arithmetic over pool sizes. Ratios are whole percentages so the
//! results never depend on float rounding.

/// Signers needed to notarize with `pool_size` miners at `ratio_percent`.
///
/// `ceil(pool_size * ratio_percent / 100)`; monotone non-decreasing in
/// `pool_size`.
pub fn notarization_threshold_count(pool_size: usize, ratio_percent: u32) -> usize {
    ceil_percent(pool_size, ratio_percent)
}

/// Generators per round: `max(min_generators, ceil(miners * percent / 100))`,
/// capped at the pool size.
pub fn generators_count(miners: usize, min_generators: usize, generators_percent: u32) -> usize {
    min_generators
        .max(ceil_percent(miners, generators_percent))
        .min(miners)
}

/// `active * 100 >= size * min_percent`.
pub fn meets_active_percent(active: usize, size: usize, min_percent: u32) -> bool {
    active * 100 >= size * min_percent as usize
}

fn ceil_percent(count: usize, percent: u32) -> usize {
    (count * percent as usize + 99) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_rounds_up() {
        assert_eq!(notarization_threshold_count(3, 66), 2);
        assert_eq!(notarization_threshold_count(4, 66), 3);
        assert_eq!(notarization_threshold_count(10, 67), 7);
        assert_eq!(notarization_threshold_count(0, 66), 0);
    }

    #[test]
    fn test_threshold_is_monotone() {
        for ratio in [1, 33, 50, 66, 67, 100] {
            let mut last = 0;
            for n in 0..200 {
                let t = notarization_threshold_count(n, ratio);
                assert!(t >= last, "ratio {ratio} decreased at n={n}");
                assert!(t <= n);
                last = t;
            }
        }
    }

    #[test]
    fn test_generators_count() {
        assert_eq!(generators_count(10, 2, 20), 2);
        assert_eq!(generators_count(100, 2, 20), 20);
        assert_eq!(generators_count(1, 2, 20), 1);
        assert_eq!(generators_count(7, 0, 50), 4);
    }

    #[test]
    fn test_meets_active_percent() {
        assert!(meets_active_percent(3, 4, 75));
        assert!(!meets_active_percent(2, 4, 75));
        assert!(meets_active_percent(0, 0, 100));
    }
}
