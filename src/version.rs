//! Versions and version ranges.

use std::fmt;

use version_ranges::Ranges;

/// A non-empty sequence of non-negative integers, compared lexicographically.
///
/// `1.2` and `1.2.0` compare equal component-wise up to the shorter length,
/// with the missing trailing components of the shorter one treated as zero.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
pub struct Version(Vec<u64>);

impl Version {
    /// Build a version from its dotted components, e.g. `Version::new([1, 2, 0])`.
    pub fn new(components: impl IntoIterator<Item = u64>) -> Self {
        let v: Vec<u64> = components.into_iter().collect();
        assert!(!v.is_empty(), "a version must have at least one component");
        Self(v)
    }

    /// The lowest possible version, `0`.
    pub fn zero() -> Self {
        Self(vec![0])
    }

    /// The smallest version that is strictly greater than `self`: bump the
    /// last component by one.
    pub fn bump(&self) -> Self {
        let mut v = self.0.clone();
        *v.last_mut().unwrap() += 1;
        Self(v)
    }

    /// The smallest version whose leading component exceeds `self`'s,
    /// i.e. the exclusive upper bound of `self`'s major-bounded ("caret")
    /// range: `^1.2.3` means `>=1.2.3, <2.0.0`.
    pub fn major_bound(&self) -> Self {
        Self(vec![self.0[0] + 1])
    }

    /// The individual numeric components.
    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                std::cmp::Ordering::Equal => continue,
                ord => return ord,
            }
        }
        std::cmp::Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl From<Vec<u64>> for Version {
    fn from(v: Vec<u64>) -> Self {
        Self::new(v)
    }
}

impl<const N: usize> From<[u64; N]> for Version {
    fn from(v: [u64; N]) -> Self {
        Self::new(v)
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Self(vec![v])
    }
}

/// A boolean combination of version ranges: unions, intersections,
/// complements, and the four constructors (equals, at-least,
/// below, major-bounded).
pub type VersionRange = Ranges<Version>;

/// Constructors for the four primitive range shapes named in the data model,
/// plus the boolean combinators inherited from [`Ranges`].
pub trait VersionRangeExt {
    /// The set containing exactly `v`.
    fn equals(v: Version) -> Self;
    /// `v <= versions` (inclusive).
    fn at_least(v: Version) -> Self;
    /// `versions < v`.
    fn below(v: Version) -> Self;
    /// `v <= versions < v.major_bound()`: everything compatible with `v`
    /// under semantic-versioning-style major-version bounding.
    fn major_bounded(v: Version) -> Self;
    /// The range matching every version.
    fn any() -> Self;
    /// The range matching no version.
    fn none() -> Self;
}

impl VersionRangeExt for VersionRange {
    fn equals(v: Version) -> Self {
        Ranges::singleton(v)
    }

    fn at_least(v: Version) -> Self {
        Ranges::at_least(v)
    }

    fn below(v: Version) -> Self {
        Ranges::below(v)
    }

    fn major_bounded(v: Version) -> Self {
        let upper = v.major_bound();
        Ranges::between(v, upper)
    }

    fn any() -> Self {
        Ranges::full()
    }

    fn none() -> Self {
        Ranges::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexicographic_order() {
        assert!(Version::new([1, 2, 0]) < Version::new([1, 10, 0]));
        assert!(Version::new([1, 2]) == Version::new([1, 2, 0]));
        assert!(Version::new([1]) < Version::new([1, 0, 1]));
    }

    #[test]
    fn major_bounded_excludes_next_major() {
        let r = VersionRange::major_bounded(Version::new([1, 2, 3]));
        assert!(r.contains(&Version::new([1, 2, 3])));
        assert!(r.contains(&Version::new([1, 9, 0])));
        assert!(!r.contains(&Version::new([2, 0, 0])));
        assert!(!r.contains(&Version::new([1, 2, 2])));
    }

    #[test]
    fn display_is_dotted() {
        assert_eq!(Version::new([1, 2, 3]).to_string(), "1.2.3");
    }
}
