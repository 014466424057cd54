//! # Slug & SKU Derivation
//!
//! Pure half of identifier allocation. The storage half (probing existing
//! rows, retrying on unique violations) lives in `vitrine-db::identifier`.
//!
//! ```text
//! "Summer Sale!"  ──slugify──►  "summer-sale"
//!                                    │
//!                   taken? ──► "summer-sale-1" ──► "summer-sale-2" ...
//!
//! "Tea Kettle"    ──sku_prefix──► "TEA" ──► "TEA-4821" ──► "TEA-4821-1" ...
//! ```

use rand::Rng;
use std::collections::HashSet;

/// Maximum slug length before suffixing.
pub const MAX_SLUG_BASE_LEN: usize = 180;

/// Length of the alphabetic SKU prefix.
pub const SKU_PREFIX_LEN: usize = 3;

/// Normalizes a display name into a URL-safe slug.
///
/// Lower-case ASCII alphanumerics survive; every other run of characters
/// collapses into a single `-`. Names that normalize to nothing fall back to
/// `fallback`, so the result is never empty.
///
/// ```rust
/// use vitrine_core::identifier::slugify;
///
/// assert_eq!(slugify("  Summer  Sale! 2024 ", "item"), "summer-sale-2024");
/// assert_eq!(slugify("!!!", "category"), "category");
/// ```
pub fn slugify(name: &str, fallback: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.len() > MAX_SLUG_BASE_LEN {
        slug.truncate(MAX_SLUG_BASE_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// The `n`-th candidate for a base: `base`, `base-1`, `base-2`, ...
pub fn candidate(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, n)
    }
}

/// Iterator over every candidate for `base`, in order.
pub fn candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    (0u32..).map(move |n| candidate(base, n))
}

/// First candidate for `base` not present in `taken`.
///
/// `taken` is finite, so one of the first `taken.len() + 1` candidates is
/// always free.
pub fn first_free(base: &str, taken: &HashSet<String>) -> String {
    let mut n = 0;
    loop {
        let slug = candidate(base, n);
        if !taken.contains(&slug) {
            return slug;
        }
        n += 1;
    }
}

/// Fixed-length alphabetic SKU prefix derived from a name.
///
/// Takes the first three ASCII letters, upper-cased, and pads with `X`.
///
/// ```rust
/// use vitrine_core::identifier::sku_prefix;
///
/// assert_eq!(sku_prefix("tea kettle"), "TEA");
/// assert_eq!(sku_prefix("7 Up"), "UPX");
/// assert_eq!(sku_prefix(""), "XXX");
/// ```
pub fn sku_prefix(name: &str) -> String {
    let mut prefix: String = name
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(SKU_PREFIX_LEN)
        .map(|c| c.to_ascii_uppercase())
        .collect();

    while prefix.len() < SKU_PREFIX_LEN {
        prefix.push('X');
    }
    prefix
}

/// Random SKU base: `PREFIX-NNNN` with a four-digit suffix.
pub fn random_sku(name: &str) -> String {
    random_sku_with(&mut rand::thread_rng(), name)
}

/// Same as [`random_sku`] with a caller-supplied RNG.
pub fn random_sku_with<R: Rng + ?Sized>(rng: &mut R, name: &str) -> String {
    format!("{}-{}", sku_prefix(name), rng.gen_range(1000..=9999))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("Men's -- Shoes", "category"), "men-s-shoes");
        assert_eq!(slugify("Café Crème", "item"), "caf-cr-me");
        assert_eq!(slugify("ABC", "item"), "abc");
    }

    #[test]
    fn test_slugify_degenerate_names() {
        assert_eq!(slugify("", "brand"), "brand");
        assert_eq!(slugify("   ", "unit"), "unit");
        assert_eq!(slugify("日本語", "item"), "item");
    }

    #[test]
    fn test_slugify_truncates_long_names() {
        let long = "a ".repeat(200);
        let slug = slugify(&long, "item");
        assert!(slug.len() <= MAX_SLUG_BASE_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_candidates_sequence() {
        let got: Vec<String> = candidates("shoes").take(3).collect();
        assert_eq!(got, vec!["shoes", "shoes-1", "shoes-2"]);
    }

    #[test]
    fn test_first_free_skips_taken() {
        let taken: HashSet<String> = ["shoes", "shoes-1", "shoes-3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(first_free("shoes", &taken), "shoes-2");
        assert_eq!(first_free("boots", &taken), "boots");
    }

    #[test]
    fn test_first_free_past_a_dense_run() {
        let taken: HashSet<String> = (0..10).map(|n| candidate("mug", n)).collect();
        assert_eq!(first_free("mug", &taken), "mug-10");
    }

    #[test]
    fn test_random_sku_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let sku = random_sku_with(&mut rng, "Tea Kettle");
            let (prefix, digits) = sku.split_once('-').unwrap();
            assert_eq!(prefix, "TEA");
            let n: u32 = digits.parse().unwrap();
            assert!((1000..=9999).contains(&n));
        }
    }
}
