//! A generic type for representing sets of versions as a union of intervals.
//!
//! [`Ranges<V>`] can express anything that can be built out of the primitive
//! constructors [`empty`](Ranges::empty), [`full`](Ranges::full),
//! [`singleton`](Ranges::singleton), [`at_least`](Ranges::at_least),
//! [`below`](Ranges::below) and [`between`](Ranges::between), closed under
//! [`union`](Ranges::union), [`intersection`](Ranges::intersection) and
//! [`complement`](Ranges::complement). Internally a `Ranges` is a sorted,
//! non-overlapping list of `(Bound<V>, Bound<V>)` segments, so membership,
//! intersection and complement are all linear in the number of segments.
//!
//! `Ranges` only requires `V: Ord + Clone`; it has no notion of "the next
//! version" or of major/minor/patch components, which keeps it reusable for
//! any totally ordered version scheme.

use std::cmp::Ordering;
use std::fmt::{self, Debug, Display};
use std::ops::Bound::{self, Excluded, Included, Unbounded};

use smallvec::{smallvec, SmallVec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

type Segment<V> = (Bound<V>, Bound<V>);

/// A set of versions, represented as a union of disjoint intervals.
#[derive(Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Ranges<V> {
    segments: SmallVec<[Segment<V>; 1]>,
}

impl<V> Ranges<V> {
    /// The empty set: contains no version.
    pub fn empty() -> Self {
        Self {
            segments: SmallVec::new(),
        }
    }

    /// The set of all versions.
    pub fn full() -> Self {
        Self {
            segments: smallvec![(Unbounded, Unbounded)],
        }
    }

    /// `true` iff this set contains no version.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl<V: Clone> Ranges<V> {
    /// The set containing exactly `v`.
    pub fn singleton(v: V) -> Self {
        Self {
            segments: smallvec![(Included(v.clone()), Included(v))],
        }
    }

    /// `v <= versions`.
    pub fn at_least(v: V) -> Self {
        Self {
            segments: smallvec![(Included(v), Unbounded)],
        }
    }

    /// `versions < v`.
    pub fn below(v: V) -> Self {
        Self {
            segments: smallvec![(Unbounded, Excluded(v))],
        }
    }
}

impl<V: Ord + Clone> Ranges<V> {
    /// `v1 <= versions < v2`.
    pub fn between(v1: V, v2: V) -> Self {
        if v1 >= v2 {
            return Self::empty();
        }
        Self {
            segments: smallvec![(Included(v1), Excluded(v2))],
        }
    }

    /// `true` iff `version` is a member of this set.
    pub fn contains(&self, version: &V) -> bool {
        self.segments
            .binary_search_by(|seg| cmp_version_to_segment(version, seg).reverse())
            .is_ok()
    }

    /// If this set contains exactly one version, return it.
    pub fn as_singleton(&self) -> Option<&V> {
        match self.segments.as_slice() {
            [(Included(a), Included(b))] if a == b => Some(a),
            _ => None,
        }
    }

    /// The complement: every version not in `self`.
    pub fn complement(&self) -> Self {
        Self {
            segments: complement_segments(&self.segments),
        }
    }

    /// The intersection of `self` and `other`.
    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = SmallVec::new();
        let (mut i, mut j) = (0usize, 0usize);
        let a = self.segments.as_slice();
        let b = other.segments.as_slice();
        while i < a.len() && j < b.len() {
            let (s1, e1) = &a[i];
            let (s2, e2) = &b[j];
            let start = max_start(s1.as_ref(), s2.as_ref());
            let end = min_end(e1.as_ref(), e2.as_ref());
            if valid_segment(&start, &end) {
                out.push((clone_bound(start), clone_bound(end)));
            }
            if cmp_end(e1.as_ref(), e2.as_ref()) == Ordering::Less {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self { segments: out }
    }

    /// The union of `self` and `other`, via De Morgan's law.
    pub fn union(&self, other: &Self) -> Self {
        self.complement()
            .intersection(&other.complement())
            .complement()
    }
}

fn complement_segments<V: Ord + Clone>(segments: &[Segment<V>]) -> SmallVec<[Segment<V>; 1]> {
    if segments.is_empty() {
        return smallvec![(Unbounded, Unbounded)];
    }
    let mut out = SmallVec::new();
    let mut cursor: Bound<V> = Unbounded;
    let mut first = true;
    for (start, end) in segments {
        if !(first && matches!(start, Unbounded)) {
            out.push((cursor.clone(), flip(start.clone())));
        }
        cursor = flip(end.clone());
        first = false;
    }
    if !matches!(cursor, Unbounded) {
        out.push((cursor, Unbounded));
    }
    out
}

fn flip<V>(b: Bound<V>) -> Bound<V> {
    match b {
        Included(v) => Excluded(v),
        Excluded(v) => Included(v),
        Unbounded => Unbounded,
    }
}

fn clone_bound<V: Clone>(b: Bound<&V>) -> Bound<V> {
    match b {
        Included(v) => Included(v.clone()),
        Excluded(v) => Excluded(v.clone()),
        Unbounded => Unbounded,
    }
}

fn cmp_version_to_segment<V: Ord>(v: &V, seg: &Segment<V>) -> Ordering {
    let below_start = match &seg.0 {
        Included(s) => v < s,
        Excluded(s) => v <= s,
        Unbounded => false,
    };
    if below_start {
        return Ordering::Less;
    }
    let above_end = match &seg.1 {
        Included(e) => v > e,
        Excluded(e) => v >= e,
        Unbounded => false,
    };
    if above_end {
        return Ordering::Greater;
    }
    Ordering::Equal
}

fn max_start<'a, V: Ord>(a: Bound<&'a V>, b: Bound<&'a V>) -> Bound<&'a V> {
    match (a, b) {
        (Unbounded, other) | (other, Unbounded) => other,
        (Included(x), Included(y)) => {
            if x >= y {
                Included(x)
            } else {
                Included(y)
            }
        }
        (Excluded(x), Excluded(y)) => {
            if x >= y {
                Excluded(x)
            } else {
                Excluded(y)
            }
        }
        (Included(x), Excluded(y)) | (Excluded(y), Included(x)) => {
            if x > y {
                Included(x)
            } else {
                Excluded(y)
            }
        }
    }
}

fn min_end<'a, V: Ord>(a: Bound<&'a V>, b: Bound<&'a V>) -> Bound<&'a V> {
    match (a, b) {
        (Unbounded, other) | (other, Unbounded) => other,
        (Included(x), Included(y)) => {
            if x <= y {
                Included(x)
            } else {
                Included(y)
            }
        }
        (Excluded(x), Excluded(y)) => {
            if x <= y {
                Excluded(x)
            } else {
                Excluded(y)
            }
        }
        (Included(x), Excluded(y)) | (Excluded(y), Included(x)) => {
            if x < y {
                Included(x)
            } else {
                Excluded(y)
            }
        }
    }
}

fn cmp_end<V: Ord>(a: Bound<&V>, b: Bound<&V>) -> Ordering {
    match (a, b) {
        (Unbounded, Unbounded) => Ordering::Equal,
        (Unbounded, _) => Ordering::Greater,
        (_, Unbounded) => Ordering::Less,
        (Included(x), Included(y)) | (Excluded(x), Excluded(y)) => x.cmp(y),
        (Included(x), Excluded(y)) => {
            if x <= y {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (Excluded(x), Included(y)) => {
            if x < y {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
    }
}

fn valid_segment<V: Ord>(start: &Bound<&V>, end: &Bound<&V>) -> bool {
    match (start, end) {
        (Unbounded, _) | (_, Unbounded) => true,
        (Included(s), Included(e)) => s <= e,
        (Included(s), Excluded(e)) | (Excluded(s), Included(e)) | (Excluded(s), Excluded(e)) => {
            s < e
        }
    }
}

impl<V> Default for Ranges<V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<V: Display> Display for Ranges<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "∅");
        }
        if self.segments.len() == 1 && matches!(self.segments[0], (Unbounded, Unbounded)) {
            return write!(f, "*");
        }
        let parts: Vec<String> = self
            .segments
            .iter()
            .map(|(start, end)| match (start, end) {
                (Included(a), Included(b)) if a.to_string() == b.to_string() => {
                    format!("{a}")
                }
                (Included(a), Included(b)) => format!(">={a}, <={b}"),
                (Included(a), Excluded(b)) => format!(">={a}, <{b}"),
                (Excluded(a), Unbounded) => format!(">{a}"),
                (Included(a), Unbounded) => format!(">={a}"),
                (Unbounded, Excluded(b)) => format!("<{b}"),
                (Unbounded, Included(b)) => format!("<={b}"),
                (Excluded(a), Included(b)) => format!(">{a}, <={b}"),
                (Excluded(a), Excluded(b)) => format!(">{a}, <{b}"),
                (Unbounded, Unbounded) => "*".to_string(),
            })
            .collect();
        write!(f, "{}", parts.join(" || "))
    }
}

impl<V: Debug> Debug for Ranges<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ranges")
            .field("segments", &self.segments.as_slice())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_contains_nothing() {
        let r: Ranges<u32> = Ranges::empty();
        assert!(!r.contains(&0));
        assert!(r.is_empty());
    }

    #[test]
    fn full_contains_everything() {
        let r: Ranges<u32> = Ranges::full();
        assert!(r.contains(&0));
        assert!(r.contains(&u32::MAX));
    }

    #[test]
    fn between_is_half_open() {
        let r = Ranges::between(1u32, 3u32);
        assert!(!r.contains(&0));
        assert!(r.contains(&1));
        assert!(r.contains(&2));
        assert!(!r.contains(&3));
    }

    #[test]
    fn complement_of_at_least_is_below() {
        let r = Ranges::at_least(5u32);
        let c = r.complement();
        assert_eq!(c, Ranges::below(5u32));
    }

    #[test]
    fn intersection_narrows() {
        let a = Ranges::at_least(1u32);
        let b = Ranges::below(5u32);
        let i = a.intersection(&b);
        assert_eq!(i, Ranges::between(1, 5));
    }

    #[test]
    fn union_of_disjoint_contains_both() {
        let a = Ranges::singleton(1u32);
        let b = Ranges::singleton(3u32);
        let u = a.union(&b);
        assert!(u.contains(&1));
        assert!(!u.contains(&2));
        assert!(u.contains(&3));
    }

    #[test]
    fn empty_range_between_inverted_bounds() {
        let r = Ranges::between(5u32, 1u32);
        assert!(r.is_empty());
    }

    #[cfg(feature = "proptest")]
    mod props {
        use super::*;
        use proptest::prelude::*;

        fn range_strategy() -> impl Strategy<Value = Ranges<u32>> {
            prop_oneof![
                Just(Ranges::empty()),
                Just(Ranges::full()),
                (0u32..20).prop_map(Ranges::singleton),
                (0u32..20).prop_map(Ranges::at_least),
                (0u32..20).prop_map(Ranges::below),
                (0u32..20, 0u32..20).prop_map(|(a, b)| Ranges::between(a, b)),
            ]
        }

        proptest! {
            #[test]
            fn complement_is_involutive(r in range_strategy()) {
                prop_assert_eq!(r.complement().complement(), r);
            }

            #[test]
            fn intersection_subset_of_both(r1 in range_strategy(), r2 in range_strategy(), v in 0u32..20) {
                let i = r1.intersection(&r2);
                if i.contains(&v) {
                    prop_assert!(r1.contains(&v) && r2.contains(&v));
                }
            }

            #[test]
            fn union_superset_of_both(r1 in range_strategy(), r2 in range_strategy(), v in 0u32..20) {
                if r1.contains(&v) || r2.contains(&v) {
                    prop_assert!(r1.union(&r2).contains(&v));
                }
            }
        }
    }
}
