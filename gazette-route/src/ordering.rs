//! Route ordering. Keys that start with digits come first, compared by the
//! numeric value of that digit prefix ("2" before "10"); non-numeric keys
//! follow in plain lexicographic order.

use std::cmp::Ordering;

pub fn cmp_route_keys(a: &str, b: &str) -> Ordering {
    match (digit_prefix(a), digit_prefix(b)) {
        (Some(da), Some(db)) => cmp_digit_strings(da, db).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn digit_prefix(key: &str) -> Option<&str> {
    let end = key.find(|c: char| !c.is_ascii_digit()).unwrap_or(key.len());
    if end == 0 {
        None
    } else {
        Some(&key[..end])
    }
}

/// Compare two digit strings by numeric value without parsing to an integer,
/// so arbitrarily long house numbers cannot overflow. After stripping leading
/// zeros, the longer string is the larger number; equal lengths compare
/// lexicographically.
fn cmp_digit_strings(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_prefixes_sort_by_value_then_nonnumeric_alphabetically() {
        let mut keys = vec!["10", "A1", "2B", "1"];
        keys.sort_by(|a, b| cmp_route_keys(a, b));
        assert_eq!(keys, vec!["1", "2B", "10", "A1"]);
    }

    #[test]
    fn leading_zeros_do_not_change_the_numeric_value() {
        assert_eq!(cmp_digit_strings("007", "7"), Ordering::Equal);
        // Ties on value fall back to the full key, keeping the order total.
        assert_eq!(cmp_route_keys("007", "7"), Ordering::Less);
    }

    #[test]
    fn long_house_numbers_compare_without_overflow() {
        let huge = "99999999999999999999999999999999";
        let huger = "100000000000000000000000000000000";
        assert_eq!(cmp_route_keys(huge, huger), Ordering::Less);
    }

    #[test]
    fn same_number_different_suffix_sorts_by_suffix() {
        assert_eq!(cmp_route_keys("12A", "12B"), Ordering::Less);
        assert_eq!(cmp_route_keys("9Z", "12A"), Ordering::Less);
    }
}
