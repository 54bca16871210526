//! The search tree: goal bookkeeping and the branch-ordering
//! policy the driver's explicit stack walks over.

use std::cmp::Reverse;
use std::hash::BuildHasherDefault;

use indexmap::IndexMap;
use priority_queue::PriorityQueue;
use rustc_hash::FxHasher;

use crate::constraints::{ConstraintModel, InstalledPreference};
use crate::index::Index;
use crate::model::{GoalReason, PackageSource, QualifiedPackageName};
use crate::version::VersionRangeExt;
use crate::version::VersionRange;

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// One not-yet-decided goal: every contribution anyone has registered on
/// this qualified name, each tagged with the stack depth of the decision
/// that registered it. `range`/`reasons` are the merged view recomputed
/// whenever a contribution is added or retracted.
#[derive(Debug, Clone)]
pub struct PendingGoal {
    pub range: VersionRange,
    pub reasons: Vec<GoalReason>,
    contributions: Vec<(usize, VersionRange, GoalReason)>,
}

impl PendingGoal {
    fn recompute(&mut self) {
        self.range = self
            .contributions
            .iter()
            .fold(VersionRange::any(), |acc, (_, r, _)| acc.intersection(r));
        self.reasons = self.contributions.iter().map(|(_, _, reason)| reason.clone()).collect();
    }
}

/// Tracks, for package goals, which qualified names are still pending
/// (ranges merge in as new dependency edges are discovered) versus already
/// decided (later mentions are checked, not merged) -- the mechanism that
/// makes the Single Instance Restriction fall out of ordinary goal handling
/// rather than a separate pass. Each contribution carries the depth of the
/// decision that registered it, so `retract_from` can undo exactly the
/// contributions a discarded branch made, without touching the rest.
#[derive(Debug, Default)]
pub struct GoalQueue {
    pending: FxIndexMap<QualifiedPackageName, PendingGoal>,
    order: Vec<QualifiedPackageName>,
}

impl GoalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a new constraint on `qpn` into its pending goal, creating it
    /// (and recording arrival order) if this is the first mention. `depth`
    /// is the stack depth of the decision responsible for this edge (`0` for
    /// the user's own targets, which never get retracted).
    pub fn add(&mut self, qpn: QualifiedPackageName, range: VersionRange, reason: GoalReason, depth: usize) {
        match self.pending.get_mut(&qpn) {
            Some(existing) => {
                existing.contributions.push((depth, range, reason));
                existing.recompute();
            }
            None => {
                self.order.push(qpn.clone());
                let mut goal = PendingGoal {
                    range: VersionRange::any(),
                    reasons: Vec::new(),
                    contributions: vec![(depth, range, reason)],
                };
                goal.recompute();
                self.pending.insert(qpn, goal);
            }
        }
    }

    pub fn get(&self, qpn: &QualifiedPackageName) -> Option<&PendingGoal> {
        self.pending.get(qpn)
    }

    pub fn remove(&mut self, qpn: &QualifiedPackageName) -> Option<PendingGoal> {
        self.order.retain(|q| q != qpn);
        self.pending.remove(qpn)
    }

    /// Undo every contribution registered at exactly `depth` -- called when
    /// backjumping discards the frame that owned that depth -- dropping any
    /// goal left with no surviving contributor.
    pub fn retract_from(&mut self, depth: usize) {
        let mut empty = Vec::new();
        for (qpn, goal) in self.pending.iter_mut() {
            goal.contributions.retain(|(d, ..)| *d != depth);
            if goal.contributions.is_empty() {
                empty.push(qpn.clone());
            } else {
                goal.recompute();
            }
        }
        for qpn in empty {
            self.pending.remove(&qpn);
            self.order.retain(|q| q != &qpn);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The pending goal list in the order the driver should attempt them:
    /// explicit user order first (callers pre-seed `priority` accordingly),
    /// then every other pending goal ordered most-constrained-first (fewest
    /// satisfying candidates), the same heuristic PubGrub's
    /// `DependencyProvider::prioritize` uses to fail fast.
    pub fn ordered(&self, priority: &[QualifiedPackageName], index: &Index) -> Vec<QualifiedPackageName> {
        let mut out: Vec<QualifiedPackageName> = Vec::with_capacity(self.pending.len());
        for qpn in priority {
            if self.pending.contains_key(qpn) {
                out.push(qpn.clone());
            }
        }

        let mut queue: PriorityQueue<QualifiedPackageName, Reverse<usize>> = PriorityQueue::new();
        for qpn in &self.order {
            if out.contains(qpn) {
                continue;
            }
            let goal = &self.pending[qpn];
            let candidate_count = index
                .lookup(&qpn.name)
                .iter()
                .filter(|src| goal.range.contains(src.version()))
                .count();
            queue.push(qpn.clone(), Reverse(candidate_count));
        }
        while let Some((qpn, _)) = queue.pop() {
            out.push(qpn);
        }
        out
    }
}

/// Order the sources satisfying `range` the way the solver should try them:
/// installed packages first or last depending on `installed_preference`,
/// source versions newest-first, with `soft_preference` (if any) used as a
/// tie-break that pulls a preferred range's versions to the front.
pub fn order_package_candidates(
    index: &Index,
    qpn: &QualifiedPackageName,
    range: &VersionRange,
    constraints: &ConstraintModel,
) -> Vec<PackageSource> {
    let mut candidates: Vec<PackageSource> = index
        .lookup(&qpn.name)
        .into_iter()
        .filter(|src| range.contains(src.version()))
        .collect();

    let soft = constraints.soft_preference(&qpn.name).cloned();
    let prefer_installed = matches!(
        constraints.installed_preference,
        InstalledPreference::PreferInstalled
    );

    candidates.sort_by(|a, b| {
        if a.is_installed() != b.is_installed() {
            let a_first = a.is_installed() == prefer_installed;
            return if a_first {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Greater
            };
        }
        if let Some(soft) = &soft {
            let a_pref = soft.contains(a.version());
            let b_pref = soft.contains(b.version());
            if a_pref != b_pref {
                return if a_pref {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                };
            }
        }
        b.version().cmp(a.version())
    });

    candidates
}

/// `true` first when the flag's default is `true`, with `force` (from a
/// global stanza-style policy, or an enclosing `if` that already fixed the
/// value) collapsing the branch list to a single choice.
pub fn order_flag_candidates(default: bool, force: Option<bool>) -> Vec<bool> {
    match force {
        Some(v) => vec![v],
        None => {
            if default {
                vec![true, false]
            } else {
                vec![false, true]
            }
        }
    }
}

/// Stanza branch order: `forced` (global policy) collapses to one choice;
/// otherwise the soft preference decides which of on/off is tried first,
/// defaulting to off-first since stanzas are opt-in.
pub fn order_stanza_candidates(forced: Option<bool>, prefer_on: bool) -> Vec<bool> {
    match forced {
        Some(v) => vec![v],
        None => {
            if prefer_on {
                vec![true, false]
            } else {
                vec![false, true]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PackageName;

    fn qpn(name: &str) -> QualifiedPackageName {
        QualifiedPackageName::top(PackageName::new(name))
    }

    #[test]
    fn goal_queue_merges_ranges_on_repeat_mention() {
        let mut q = GoalQueue::new();
        q.add(qpn("a"), VersionRange::at_least([1, 0].into()), GoalReason::UserTarget, 0);
        q.add(
            qpn("a"),
            VersionRange::below([2, 0].into()),
            GoalReason::DependencyOf(qpn("b"), [1, 0].into()),
            1,
        );
        let goal = q.get(&qpn("a")).unwrap();
        assert!(goal.range.contains(&[1, 5].into()));
        assert!(!goal.range.contains(&[2, 0].into()));
        assert_eq!(goal.reasons.len(), 2);
    }

    #[test]
    fn goal_queue_retracts_contributions_by_depth() {
        let mut q = GoalQueue::new();
        q.add(qpn("a"), VersionRange::at_least([1, 0].into()), GoalReason::UserTarget, 0);
        q.add(
            qpn("a"),
            VersionRange::below([2, 0].into()),
            GoalReason::DependencyOf(qpn("b"), [1, 0].into()),
            1,
        );
        q.retract_from(1);
        let goal = q.get(&qpn("a")).unwrap();
        assert!(goal.range.contains(&[2, 5].into()));
        assert_eq!(goal.reasons.len(), 1);

        q.retract_from(0);
        assert!(q.get(&qpn("a")).is_none());
    }

    #[test]
    fn flag_order_tries_default_first() {
        assert_eq!(order_flag_candidates(true, None), vec![true, false]);
        assert_eq!(order_flag_candidates(false, None), vec![false, true]);
        assert_eq!(order_flag_candidates(true, Some(false)), vec![false]);
    }
}
