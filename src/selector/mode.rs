//! Mode sampling: reduce selected candidates to the final target list.

use rand::Rng;
use std::collections::HashSet;

use crate::error::SelectionError;
use crate::models::PodMode;

fn mode_err(mode: PodMode, value: Option<&str>, reason: &str) -> SelectionError {
    SelectionError::InvalidModeValue {
        mode: mode.to_string(),
        value: value.unwrap_or("").to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value(mode: PodMode, value: Option<&str>) -> Result<i64, SelectionError> {
    let raw = value.map(str::trim).unwrap_or("");
    raw.parse::<i64>()
        .map_err(|e| mode_err(mode, value, &e.to_string()))
}

fn parse_percent(mode: PodMode, value: Option<&str>) -> Result<u64, SelectionError> {
    let p = parse_value(mode, value)?;
    if p <= 0 || p > 100 {
        return Err(mode_err(mode, value, "value must be in (0, 100]"));
    }
    Ok(p as u64)
}

/// Number of targets a mode keeps out of `len` candidates.
pub fn target_count<R: Rng + ?Sized>(
    mode: PodMode,
    value: Option<&str>,
    len: usize,
    rng: &mut R,
) -> Result<usize, SelectionError> {
    match mode {
        PodMode::One => Ok(1.min(len)),
        PodMode::All => Ok(len),
        PodMode::Fixed => {
            let n = parse_value(mode, value)?;
            if n <= 0 {
                return Err(mode_err(mode, value, "value must be greater than 0"));
            }
            Ok((n as u64).min(len as u64) as usize)
        }
        PodMode::FixedPercent => {
            let p = parse_percent(mode, value)?;
            Ok((len as u64 * p / 100) as usize)
        }
        PodMode::RandomMaxPercent => {
            let max = parse_percent(mode, value)?;
            let p = rng.gen_range(0..=max);
            Ok((len as u64 * p / 100) as usize)
        }
    }
}

/// Pick `count` distinct items uniformly at random. Returns everything when
/// `count >= items.len()`.
pub fn random_fixed_indexes<T, R: Rng + ?Sized>(items: Vec<T>, count: usize, rng: &mut R) -> Vec<T> {
    if count >= items.len() {
        return items;
    }

    let mut seen: HashSet<usize> = HashSet::with_capacity(count);
    let mut picks: Vec<usize> = Vec::with_capacity(count);
    while picks.len() < count {
        let idx = rng.gen_range(0..items.len());
        if seen.insert(idx) {
            picks.push(idx);
        }
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    picks
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

/// Apply `mode` to the candidate list.
pub fn filter_by_mode<T, R: Rng + ?Sized>(
    items: Vec<T>,
    mode: PodMode,
    value: Option<&str>,
    rng: &mut R,
) -> Result<Vec<T>, SelectionError> {
    if items.is_empty() {
        return Err(SelectionError::NoPodSelected);
    }
    if mode == PodMode::All {
        return Ok(items);
    }
    let count = target_count(mode, value, items.len(), rng)?;
    Ok(random_fixed_indexes(items, count, rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_one_and_all() {
        let items: Vec<u32> = (0..5).collect();
        let one = filter_by_mode(items.clone(), PodMode::One, None, &mut rng()).unwrap();
        assert_eq!(one.len(), 1);
        assert!(items.contains(&one[0]));
        let all = filter_by_mode(items.clone(), PodMode::All, None, &mut rng()).unwrap();
        assert_eq!(all, items);
    }

    #[test]
    fn test_invalid_values() {
        let items: Vec<u32> = (0..5).collect();
        for (mode, value) in [
            (PodMode::Fixed, "0"),
            (PodMode::Fixed, "-1"),
            (PodMode::Fixed, "abc"),
            (PodMode::FixedPercent, "0"),
            (PodMode::FixedPercent, "101"),
            (PodMode::RandomMaxPercent, "0"),
            (PodMode::RandomMaxPercent, "200"),
        ] {
            let err = filter_by_mode(items.clone(), mode, Some(value), &mut rng()).unwrap_err();
            assert!(
                matches!(err, SelectionError::InvalidModeValue { .. }),
                "{} {}",
                mode,
                value
            );
        }
    }

    #[test]
    fn test_empty_candidates() {
        let err = filter_by_mode(Vec::<u32>::new(), PodMode::All, None, &mut rng()).unwrap_err();
        assert_eq!(err, SelectionError::NoPodSelected);
    }

    #[test]
    fn test_fixed_percent_floor() {
        let items: Vec<u32> = (0..3).collect();
        let picked = filter_by_mode(items, PodMode::FixedPercent, Some("50"), &mut rng()).unwrap();
        assert_eq!(picked.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_fixed_percent_count(len in 1usize..200, p in 1u64..=100, seed in any::<u64>()) {
            let items: Vec<usize> = (0..len).collect();
            let mut r = StdRng::seed_from_u64(seed);
            let value = p.to_string();
            let picked = filter_by_mode(items, PodMode::FixedPercent, Some(&value), &mut r).unwrap();
            prop_assert_eq!(picked.len(), (len as u64 * p / 100) as usize);
            let distinct: HashSet<_> = picked.iter().collect();
            prop_assert_eq!(distinct.len(), picked.len());
        }

        #[test]
        fn prop_fixed_count(len in 1usize..200, n in 1i64..300, seed in any::<u64>()) {
            let items: Vec<usize> = (0..len).collect();
            let mut r = StdRng::seed_from_u64(seed);
            let value = n.to_string();
            let picked = filter_by_mode(items, PodMode::Fixed, Some(&value), &mut r).unwrap();
            prop_assert_eq!(picked.len(), (n as usize).min(len));
            prop_assert!(picked.iter().all(|i| *i < len));
        }

        #[test]
        fn prop_random_max_percent_bound(len in 1usize..200, p in 1u64..=100, seed in any::<u64>()) {
            let items: Vec<usize> = (0..len).collect();
            let mut r = StdRng::seed_from_u64(seed);
            let value = p.to_string();
            let picked = filter_by_mode(items, PodMode::RandomMaxPercent, Some(&value), &mut r).unwrap();
            prop_assert!(picked.len() <= (len as u64 * p / 100) as usize);
        }

        #[test]
        fn prop_seeded_determinism(len in 1usize..100, n in 1i64..100, seed in any::<u64>()) {
            let items: Vec<usize> = (0..len).collect();
            let value = n.to_string();
            let a = filter_by_mode(items.clone(), PodMode::Fixed, Some(&value), &mut StdRng::seed_from_u64(seed)).unwrap();
            let b = filter_by_mode(items, PodMode::Fixed, Some(&value), &mut StdRng::seed_from_u64(seed)).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
