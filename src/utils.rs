use num_bigint::BigUint;

/// Returns `base` if it is free, otherwise the first free `base_<k>` for `k = 1, 2, ...`.
pub fn unique_name(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(base) {
        return base.to_string();
    }
    (1u64..)
        .map(|k| format!("{}_{}", base, k))
        .find(|name| !is_taken(name))
        .unwrap_or_else(|| base.to_string())
}

/// Smallest `n` such that no name in `names` is `<prefix><m>` with `m >= n`.
///
/// Names whose suffix is not a number are ignored. Saturates at `u64::MAX`,
/// so callers must still check the result against taken names.
pub fn next_free_index<'a>(prefix: &str, names: impl IntoIterator<Item = &'a str>) -> u64 {
    names
        .into_iter()
        .filter_map(|name| name.strip_prefix(prefix))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .map(|n| n.saturating_add(1))
        .max()
        .unwrap_or(0)
}

/// [Binomial coefficient][binomial] as an arbitrary-precision integer.
///
/// ```text
/// C(n, k) = n! / (k! (n-k)!)
/// ```
///
/// [binomial]: https://en.wikipedia.org/wiki/Binomial_coefficient
pub fn binomial(n: usize, k: usize) -> BigUint {
    if k > n {
        return BigUint::from(0u32);
    }
    let k = k.min(n - k);
    let mut result = BigUint::from(1u32);
    for i in 0..k {
        // Exact at every step: the product of i+1 consecutive integers is divisible by (i+1)!.
        result = result * BigUint::from(n - i) / BigUint::from(i + 1);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_name() {
        let taken = ["Root", "Root_1"];
        assert_eq!(unique_name("Other", |n| taken.contains(&n)), "Other");
        assert_eq!(unique_name("Root", |n| taken.contains(&n)), "Root_2");
    }

    #[test]
    fn test_next_free_index() {
        let names = ["Abstract_3", "Abstract_x", "Abstract_10", "A", "Abstract_"];
        assert_eq!(next_free_index("Abstract_", names), 11);
        assert_eq!(next_free_index("Abstract_", ["A", "B"]), 0);
    }

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(5, 2), BigUint::from(10u32));
        assert_eq!(binomial(10, 0), BigUint::from(1u32));
        assert_eq!(binomial(3, 4), BigUint::from(0u32));
        // C(100, 50) does not fit into u64.
        assert_eq!(
            binomial(100, 50).to_string(),
            "100891344545564193334812497256"
        );
    }
}
