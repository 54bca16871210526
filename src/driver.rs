//! The backjumping driver: walks the search tree with an
//! explicit stack of [`Frame`]s rather than recursion, so that a failure's
//! conflict set can discard or retry arbitrarily many frames in one step.

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::constraints::ConstraintModel;
use crate::error::{ResolveError, ResolveFailure};
use crate::index::Index;
use crate::model::{
    Dependency, FlagName, GoalReason, InstallPlan, PackageSource, Qualifier, QualifiedPackageName,
    ResolverPackage, SourcePackageVersion, Stanza, UnitId,
};
use crate::tree::{order_flag_candidates, order_package_candidates, order_stanza_candidates, GoalQueue};
use crate::validate::{check_cycles, check_external_facts, check_sir, link_plan, ValidationIssue};
use crate::variable::{ConflictSet, Var, VariableTable};
use crate::version::{Version, VersionRange, VersionRangeExt};

/// Caller-tunable search policy.
#[derive(Debug, Clone)]
pub struct Options {
    /// User targets, resolved in this order before anything discovered.
    pub targets: Vec<QualifiedPackageName>,
    /// Each target gets its own `Indep(n)` qualifier namespace instead of
    /// sharing `Top`, so that mutually-incompatible targets can both be
    /// satisfied in the same plan at the cost of duplicated builds.
    pub independent_goals: bool,
    /// Upper bound on backjump steps before giving up with
    /// [`ResolveError::BudgetExhausted`]. `None` means unbounded.
    pub max_backjumps: Option<u64>,
    /// How many rejected alternatives to keep for the final explanation.
    pub max_alternatives_reported: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            independent_goals: false,
            max_backjumps: None,
            max_alternatives_reported: 5,
        }
    }
}

#[derive(Debug, Default)]
pub struct OptionsBuilder {
    opts: Options,
}

impl OptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, name: crate::model::PackageName) -> Self {
        self.opts.targets.push(QualifiedPackageName::top(name));
        self
    }

    pub fn independent_goals(mut self, yes: bool) -> Self {
        self.opts.independent_goals = yes;
        self
    }

    pub fn max_backjumps(mut self, n: u64) -> Self {
        self.opts.max_backjumps = Some(n);
        self
    }

    pub fn build(self) -> Options {
        self.opts
    }
}

#[derive(Debug, Clone)]
enum Decided {
    Package(PackageSource),
    Flag(bool),
    Stanza(bool),
}

#[derive(Debug, Clone)]
struct Decision {
    var: crate::variable::VarId,
    qpn: QualifiedPackageName,
    value: Decided,
    depth: usize,
}

/// One choice point on the explicit walk stack: the variable being decided,
/// its ordered branch list, which branch is next, the conflict set
/// accumulated across branches already tried and abandoned at this frame,
/// and the variables of whatever decisions caused this goal to exist in the
/// first place (so a conflict discovered entirely inside this frame's own
/// subtree still blames the right ancestor once this frame itself is
/// exhausted and discarded).
struct Frame {
    depth: usize,
    qpn: QualifiedPackageName,
    kind: FrameKind,
    branch_idx: usize,
    accumulated_conflict: ConflictSet,
    origin_conflict: ConflictSet,
}

enum FrameKind {
    Package { var: crate::variable::VarId, branches: Vec<PackageSource> },
    Flag { var: crate::variable::VarId, flag: FlagName, branches: Vec<bool> },
    Stanza { var: crate::variable::VarId, stanza: Stanza, branches: Vec<bool> },
}

impl FrameKind {
    fn var(&self) -> crate::variable::VarId {
        match self {
            FrameKind::Package { var, .. } => *var,
            FrameKind::Flag { var, .. } => *var,
            FrameKind::Stanza { var, .. } => *var,
        }
    }

    fn remaining(&self) -> usize {
        match self {
            FrameKind::Package { branches, .. } => branches.len(),
            FrameKind::Flag { branches, .. } => branches.len(),
            FrameKind::Stanza { branches, .. } => branches.len(),
        }
    }
}

/// The live, mutable search state threaded through the walk.
struct State<'a> {
    index: &'a Index,
    constraints: &'a ConstraintModel,
    vars: VariableTable,
    goals: GoalQueue,
    /// Flags still waiting on a decision, each tagged with the stack depth
    /// of the decision that registered it (for retraction) and the reasons
    /// that made the flag a goal at all (for conflict-set propagation).
    flag_goals: Vec<(QualifiedPackageName, FlagName, usize, Vec<GoalReason>)>,
    /// Stanzas still waiting on a decision, tagged with the registering depth.
    stanza_goals: Vec<(QualifiedPackageName, Stanza, usize)>,
    decisions: Vec<Decision>,
    extension_obligations: Vec<(QualifiedPackageName, Dependency)>,
    setup_edges: HashSet<(QualifiedPackageName, QualifiedPackageName)>,
    /// Dependency lists still waiting on an undecided flag, fired once that
    /// flag is decided; tagged with the registering depth so a discarded
    /// frame's arming doesn't outlive it.
    armed_conditionals: Vec<(QualifiedPackageName, FlagName, bool, Vec<Dependency>, GoalReason, usize)>,
}

/// Resolve `options.targets` against `index` under `constraints`, returning
/// a consistent [`InstallPlan`] or a labeled [`ResolveFailure`].
pub fn resolve(index: &Index, constraints: &ConstraintModel, options: &Options) -> Result<InstallPlan, ResolveFailure> {
    let mut state = State {
        index,
        constraints,
        vars: VariableTable::new(),
        goals: GoalQueue::new(),
        flag_goals: Vec::new(),
        stanza_goals: Vec::new(),
        decisions: Vec::new(),
        extension_obligations: Vec::new(),
        setup_edges: HashSet::new(),
        armed_conditionals: Vec::new(),
    };

    for (n, target) in options.targets.iter().enumerate() {
        let qpn = if options.independent_goals {
            QualifiedPackageName::new(Qualifier::Indep(n as u32), target.name.clone())
        } else {
            target.clone()
        };
        let range = constraints.base_range(&qpn.name);
        // Depth 0 is reserved for the user's own targets, which no frame
        // ever occupies (frames start at depth 1), so they're never
        // retracted by backjumping.
        state.goals.add(qpn, range, GoalReason::UserTarget, 0);
    }

    let priority = options.targets.clone();
    let mut stack: Vec<Frame> = Vec::new();
    let mut backjumps: u64 = 0;

    loop {
        if let Some(budget) = options.max_backjumps {
            if backjumps > budget {
                return Err(ResolveFailure {
                    primary: ResolveError::BudgetExhausted(budget),
                    alternatives_tried: Vec::new(),
                });
            }
        }

        let next_goal = next_pending_goal(&state, &priority);
        // Frame depths start at 1: depth 0 is reserved for the permanent,
        // pre-search contributions (the user's own targets) registered
        // before the loop above, which no frame should ever retract.
        let depth = stack.len() + 1;
        let conflict = match next_goal {
            Some(NextGoal::Package(qpn)) => match make_package_frame(&mut state, &qpn, depth) {
                Ok(frame) => {
                    if commit_branch(&mut state, &mut stack, frame) {
                        continue;
                    } else {
                        state.vars.empty_conflict_set()
                    }
                }
                Err(c) => c,
            },
            Some(NextGoal::Flag(qpn, flag)) => {
                let frame = make_flag_frame(&mut state, &qpn, &flag, depth);
                if commit_branch(&mut state, &mut stack, frame) {
                    continue;
                } else {
                    state.vars.empty_conflict_set()
                }
            }
            Some(NextGoal::Stanza(qpn, stanza)) => {
                let frame = make_stanza_frame(&mut state, &qpn, stanza, depth);
                if commit_branch(&mut state, &mut stack, frame) {
                    continue;
                } else {
                    state.vars.empty_conflict_set()
                }
            }
            None => {
                // Every goal decided: build and validate the candidate plan.
                match finish(&mut state) {
                    Ok(plan) => return Ok(plan),
                    Err(conflict) => conflict,
                }
            }
        };

        backjumps += 1;
        match backjump(&mut state, &mut stack, conflict, options.max_alternatives_reported) {
            Some(Ok(())) => continue,
            Some(Err(failure)) => return Err(failure),
            None => {
                return Err(ResolveFailure {
                    primary: ResolveError::VersionConflict {
                        package: priority
                            .first()
                            .map(|q| q.name.clone())
                            .unwrap_or_else(|| crate::model::PackageName::new("<none>")),
                        qualifier: priority.first().cloned().unwrap_or_else(|| QualifiedPackageName::top(crate::model::PackageName::new("<none>"))),
                        range: VersionRange::none(),
                    },
                    alternatives_tried: Vec::new(),
                })
            }
        }
    }
}

enum NextGoal {
    Package(QualifiedPackageName),
    Flag(QualifiedPackageName, FlagName),
    Stanza(QualifiedPackageName, Stanza),
}

fn next_pending_goal(state: &State, priority: &[QualifiedPackageName]) -> Option<NextGoal> {
    let ordered = state.goals.ordered(priority, state.index);
    if let Some(qpn) = ordered.into_iter().find(|q| !is_decided(state, q)) {
        return Some(NextGoal::Package(qpn));
    }
    for (qpn, flag, ..) in &state.flag_goals {
        if !is_flag_decided(state, qpn, flag) {
            return Some(NextGoal::Flag(qpn.clone(), flag.clone()));
        }
    }
    for (qpn, stanza, _) in &state.stanza_goals {
        if !is_stanza_decided(state, qpn, *stanza) {
            return Some(NextGoal::Stanza(qpn.clone(), *stanza));
        }
    }
    None
}

fn is_decided(state: &State, qpn: &QualifiedPackageName) -> bool {
    state.decisions.iter().any(|d| &d.qpn == qpn && matches!(d.value, Decided::Package(_)))
}

fn is_flag_decided(state: &State, qpn: &QualifiedPackageName, flag: &FlagName) -> bool {
    decided_flag_value(state, qpn, flag).is_some()
}

fn is_stanza_decided(state: &State, qpn: &QualifiedPackageName, stanza: Stanza) -> bool {
    state.decisions.iter().any(|d| {
        &d.qpn == qpn && matches!(d.value, Decided::Stanza(_)) && matches!(state.vars.resolve(d.var), Var::Stanza(_, s) if *s == stanza)
    })
}

fn make_package_frame(state: &mut State, qpn: &QualifiedPackageName, depth: usize) -> Result<Frame, ConflictSet> {
    let goal = state
        .goals
        .get(qpn)
        .expect("next_pending_goal only returns goals present in the queue")
        .clone();
    if !state.index.known_package(&qpn.name) {
        warn!("unknown package {}", qpn.name);
        return Err(conflict_for_goal(state, qpn, &goal));
    }
    let candidates = order_package_candidates(state.index, qpn, &goal.range, state.constraints);
    if candidates.is_empty() {
        debug!("no candidate for {qpn} satisfies {}", goal.range);
        return Err(conflict_for_goal(state, qpn, &goal));
    }
    let origin_conflict = reason_vars(state, &goal.reasons);
    let var = state.vars.intern(Var::Package(qpn.clone()));
    Ok(Frame {
        depth,
        qpn: qpn.clone(),
        kind: FrameKind::Package { var, branches: candidates },
        branch_idx: 0,
        accumulated_conflict: state.vars.empty_conflict_set(),
        origin_conflict,
    })
}

/// The conflict-set contribution of a goal's reasons: the variable of every
/// decision whose dependency narrowed that goal's range, via whichever
/// `GoalReason` records each contributor.
fn reason_vars(state: &mut State, reasons: &[GoalReason]) -> ConflictSet {
    let mut c = state.vars.empty_conflict_set();
    for reason in reasons {
        if let Some(var) = var_for_reason(state, reason) {
            c.insert(var);
        }
    }
    c
}

/// The conflict set for a goal no candidate satisfies: the goal's own
/// variable, plus [`reason_vars`] of everything that narrowed it (so
/// backjumping lands on whichever of them is retriable, rather than only
/// ever blaming the unsatisfiable goal itself).
fn conflict_for_goal(state: &mut State, qpn: &QualifiedPackageName, goal: &crate::tree::PendingGoal) -> ConflictSet {
    let mut c = reason_vars(state, &goal.reasons);
    c.insert(state.vars.intern(Var::Package(qpn.clone())));
    c
}

fn var_for_reason(state: &mut State, reason: &GoalReason) -> Option<crate::variable::VarId> {
    match reason {
        GoalReason::UserTarget => None,
        GoalReason::DependencyOf(qpn, _) | GoalReason::SetupDependencyOf(qpn, _) => {
            Some(state.vars.intern(Var::Package(qpn.clone())))
        }
        GoalReason::StanzaDependencyOf(qpn, _, stanza) => {
            Some(state.vars.intern(Var::Stanza(qpn.clone(), *stanza)))
        }
        GoalReason::FlagGatedDependencyOf(qpn, _, flag, _) => {
            Some(state.vars.intern(Var::Flag(qpn.clone(), flag.clone())))
        }
    }
}

fn make_flag_frame(state: &mut State, qpn: &QualifiedPackageName, flag: &FlagName, depth: usize) -> Frame {
    let default = flag_default(state, qpn, flag);
    let branches = order_flag_candidates(default, None);
    let reasons = state
        .flag_goals
        .iter()
        .find(|(q, f, ..)| q == qpn && f == flag)
        .map(|(_, _, _, reasons)| reasons.clone())
        .unwrap_or_default();
    let origin_conflict = reason_vars(state, &reasons);
    let var = state.vars.intern(Var::Flag(qpn.clone(), flag.clone()));
    Frame {
        depth,
        qpn: qpn.clone(),
        kind: FrameKind::Flag { var, flag: flag.clone(), branches },
        branch_idx: 0,
        accumulated_conflict: state.vars.empty_conflict_set(),
        origin_conflict,
    }
}

fn flag_default(state: &State, qpn: &QualifiedPackageName, flag: &FlagName) -> bool {
    source_version(state, qpn)
        .and_then(|pv| pv.flag(flag))
        .map(|f| f.default)
        .unwrap_or(false)
}

fn source_version<'a>(state: &'a State, qpn: &QualifiedPackageName) -> Option<&'a SourcePackageVersion> {
    state.decisions.iter().find_map(|d| {
        if &d.qpn == qpn {
            if let Decided::Package(PackageSource::Source(pv)) = &d.value {
                return Some(pv);
            }
        }
        None
    })
}

fn make_stanza_frame(state: &mut State, qpn: &QualifiedPackageName, stanza: Stanza, depth: usize) -> Frame {
    let forced = if stanza == Stanza::Tests {
        state.constraints.global_stanza_policy.forces(Stanza::Tests).then_some(true)
    } else {
        state.constraints.global_stanza_policy.forces(Stanza::Benchmarks).then_some(true)
    };
    let prefer_on = state.constraints.stanza_preference.prefers(stanza);
    let branches = order_stanza_candidates(forced, prefer_on);
    let var = state.vars.intern(Var::Stanza(qpn.clone(), stanza));
    Frame {
        depth,
        qpn: qpn.clone(),
        kind: FrameKind::Stanza { var, stanza, branches },
        branch_idx: 0,
        accumulated_conflict: state.vars.empty_conflict_set(),
        origin_conflict: state.vars.empty_conflict_set(),
    }
}

/// Try the frame's current branch: record the decision, push follow-on
/// goals it implies, and push the frame itself onto the stack. Returns
/// `false` only when the branch list was empty to begin with (the caller
/// already turned that into a `ConflictSet` via `make_*_frame`'s `Err`).
fn commit_branch(state: &mut State, stack: &mut Vec<Frame>, mut frame: Frame) -> bool {
    if frame.kind.remaining() == 0 {
        return false;
    }
    apply_branch(state, &frame);
    let depth = frame.depth;
    info!("depth {depth}: decided {} (branch 0/{})", frame.qpn, frame.kind.remaining());
    frame.branch_idx = 0;
    stack.push(frame);
    true
}

fn apply_branch(state: &mut State, frame: &Frame) {
    let depth = frame.depth;
    match &frame.kind {
        FrameKind::Package { var, branches } => {
            let chosen = branches[frame.branch_idx].clone();
            if let PackageSource::Source(pv) = &chosen {
                push_dependencies(state, &frame.qpn, pv, depth);
            }
            state.decisions.push(Decision {
                var: *var,
                qpn: frame.qpn.clone(),
                value: Decided::Package(chosen),
                depth,
            });
        }
        FrameKind::Flag { var, flag, branches } => {
            let value = branches[frame.branch_idx];
            fire_armed_conditionals(state, &frame.qpn, flag, value, depth);
            state.decisions.push(Decision {
                var: *var,
                qpn: frame.qpn.clone(),
                value: Decided::Flag(value),
                depth,
            });
        }
        FrameKind::Stanza { var, stanza, branches } => {
            let value = branches[frame.branch_idx];
            if value {
                if let Some(pv) = source_version(state, &frame.qpn) {
                    if let Some(decl) = pv.stanza(*stanza) {
                        let deps = decl.dependencies.clone();
                        let version = pv.version.clone();
                        let reason = GoalReason::StanzaDependencyOf(frame.qpn.clone(), version, *stanza);
                        push_dependency_list(state, &frame.qpn, &deps, &reason, depth);
                    }
                }
            }
            state.decisions.push(Decision {
                var: *var,
                qpn: frame.qpn.clone(),
                value: Decided::Stanza(value),
                depth,
            });
        }
    }
}

fn push_dependencies(state: &mut State, qpn: &QualifiedPackageName, pv: &SourcePackageVersion, depth: usize) {
    let reason = GoalReason::DependencyOf(qpn.clone(), pv.version.clone());
    let deps = pv.dependencies.clone();
    push_dependency_list(state, qpn, &deps, &reason, depth);
    for flag in &pv.flags {
        if !state.flag_goals.iter().any(|(q, f, ..)| q == qpn && f == &flag.name) {
            state.flag_goals.push((qpn.clone(), flag.name.clone(), depth, vec![reason.clone()]));
        }
    }
    for (stanza, _) in &pv.stanzas {
        state.stanza_goals.push((qpn.clone(), *stanza, depth));
    }
    push_setup_dependencies(state, qpn, pv, depth);
}

/// A package's configure/build-system dependencies resolve in their own
/// `Setup(name)` qualifier, never competing with the package's own library
/// dependencies for a shared version. The edge is recorded separately so
/// [`check_cycles`](crate::validate::check_cycles) can exclude it: a setup
/// script may legitimately depend on an earlier build of the very package
/// whose setup it is.
fn push_setup_dependencies(state: &mut State, qpn: &QualifiedPackageName, pv: &SourcePackageVersion, depth: usize) {
    if pv.setup_dependencies.is_empty() {
        return;
    }
    let setup_qualifier = Qualifier::Setup(qpn.name.clone());
    let reason = GoalReason::SetupDependencyOf(qpn.clone(), pv.version.clone());
    for dep in &pv.setup_dependencies {
        if let Dependency::Package { name, range, .. } = dep {
            let target = QualifiedPackageName::new(setup_qualifier.clone(), name.clone());
            state.setup_edges.insert((qpn.clone(), target.clone()));
            state.goals.add(target, range.clone(), reason.clone(), depth);
        }
    }
}

/// Push every dependency in `deps` that is either unconditional or already
/// decided; arm any `if` still waiting on an undecided flag so
/// [`fire_armed_conditionals`] can apply it once that flag settles.
fn push_dependency_list(state: &mut State, qpn: &QualifiedPackageName, deps: &[Dependency], reason: &GoalReason, depth: usize) {
    for dep in deps {
        match dep {
            Dependency::Package { name, range, .. } => {
                let target = QualifiedPackageName::new(qpn.qualifier.clone(), name.clone());
                state.goals.add(target, range.clone(), reason.clone(), depth);
            }
            Dependency::BuildTool { name, range } => {
                let target = QualifiedPackageName::new(Qualifier::Exe(qpn.name.clone(), name.clone()), name.clone());
                state.goals.add(target, range.clone(), reason.clone(), depth);
            }
            Dependency::Extension(_) | Dependency::Language(_) | Dependency::PkgConfig { .. } => {
                state.extension_obligations.push((qpn.clone(), dep.clone()));
            }
            Dependency::If { flag, value, then_branch, else_branch } => {
                match decided_flag_value(state, qpn, flag) {
                    Some(current) => {
                        let branch = if current == *value { then_branch } else { else_branch };
                        let gated = flag_gated_reason(reason, qpn, flag, current);
                        push_dependency_list(state, qpn, branch, &gated, depth);
                    }
                    None => {
                        if !state.flag_goals.iter().any(|(q, f, ..)| q == qpn && f == flag) {
                            state.flag_goals.push((qpn.clone(), flag.clone(), depth, vec![reason.clone()]));
                        }
                        state.armed_conditionals.push((
                            qpn.clone(),
                            flag.clone(),
                            *value,
                            then_branch.clone(),
                            reason.clone(),
                            depth,
                        ));
                        state.armed_conditionals.push((
                            qpn.clone(),
                            flag.clone(),
                            !*value,
                            else_branch.clone(),
                            reason.clone(),
                            depth,
                        ));
                    }
                }
            }
        }
    }
}

fn decided_flag_value(state: &State, qpn: &QualifiedPackageName, flag: &FlagName) -> Option<bool> {
    state.decisions.iter().find_map(|d| match (&d.qpn == qpn, &d.value) {
        (true, Decided::Flag(v)) if flag_matches(state, d, flag) => Some(*v),
        _ => None,
    })
}

fn flag_matches(state: &State, decision: &Decision, flag: &FlagName) -> bool {
    matches!(state.vars.resolve(decision.var), Var::Flag(_, f) if f == flag)
}

/// The version carried by every `GoalReason` variant except `UserTarget`,
/// reused as the version a newly-constructed `FlagGatedDependencyOf` reason
/// should report.
fn reason_version(reason: &GoalReason) -> Option<Version> {
    match reason {
        GoalReason::UserTarget => None,
        GoalReason::DependencyOf(_, v)
        | GoalReason::SetupDependencyOf(_, v)
        | GoalReason::StanzaDependencyOf(_, v, _)
        | GoalReason::FlagGatedDependencyOf(_, v, _, _) => Some(v.clone()),
    }
}

/// Rewrites an ambient reason into a [`GoalReason::FlagGatedDependencyOf`]
/// naming the flag (and the value it was decided to) that actually gated
/// the dependency, so the flag's variable -- not just the ambient reason's
/// -- ends up in any conflict set built from the resulting goal.
fn flag_gated_reason(ambient: &GoalReason, qpn: &QualifiedPackageName, flag: &FlagName, value: bool) -> GoalReason {
    GoalReason::FlagGatedDependencyOf(qpn.clone(), reason_version(ambient).unwrap_or_else(Version::zero), flag.clone(), value)
}

/// Fires the armed branch matching `flag`'s newly-decided `value`, tagging
/// its dependencies with a [`GoalReason::FlagGatedDependencyOf`] so a dead
/// end anywhere in that branch's subtree blames the flag. Only the fired
/// branch is retracted from `armed_conditionals`; the other value's branch
/// stays armed so flipping the flag back on backjump still applies it.
fn fire_armed_conditionals(state: &mut State, qpn: &QualifiedPackageName, flag: &FlagName, value: bool, depth: usize) {
    let matching: Vec<(Vec<Dependency>, GoalReason)> = state
        .armed_conditionals
        .iter()
        .filter(|(q, f, v, ..)| q == qpn && f == flag && *v == value)
        .map(|(_, _, _, deps, reason, _)| (deps.clone(), flag_gated_reason(reason, qpn, flag, value)))
        .collect();
    state.armed_conditionals.retain(|(q, f, v, ..)| !(q == qpn && f == flag && *v == value));
    for (deps, reason) in matching {
        push_dependency_list(state, qpn, &deps, &reason, depth);
    }
}

/// On failure, pop frames from the top: discard frames whose variable isn't
/// in the conflict set, retry (advance to the next branch) the first frame
/// whose variable is. `Some(Ok(()))` means the stack now holds a retried
/// frame ready for the next loop iteration; `Some(Err(_))` is a final
/// failure; `None` signals the caller should translate the conflict into a
/// top-level error (conflict set exhausted with no retriable frame).
fn backjump(
    state: &mut State,
    stack: &mut Vec<Frame>,
    mut conflict: ConflictSet,
    max_alternatives: usize,
) -> Option<Result<(), ResolveFailure>> {
    let mut alternatives_tried = Vec::new();
    while let Some(mut frame) = stack.pop() {
        undo_frame(state, &frame);
        if !conflict.contains(frame.kind.var()) {
            continue;
        }
        frame.accumulated_conflict.union_with(&conflict);
        frame.branch_idx += 1;
        if frame.branch_idx < frame.kind.remaining() {
            if alternatives_tried.len() < max_alternatives {
                alternatives_tried.push((frame.qpn.to_string(), ResolveError::VersionConflict {
                    package: frame.qpn.name.clone(),
                    qualifier: frame.qpn.clone(),
                    range: VersionRange::none(),
                }));
            }
            apply_branch(state, &frame);
            let depth = frame.depth;
            info!("depth {depth}: retried {} (branch {}/{})", frame.qpn, frame.branch_idx, frame.kind.remaining());
            stack.push(frame);
            return Some(Ok(()));
        }
        let mut merged = frame.accumulated_conflict.clone();
        merged.remove(frame.kind.var());
        merged.union_with(&frame.origin_conflict);
        conflict = merged;
        if conflict.is_empty() {
            return Some(Err(ResolveFailure {
                primary: ResolveError::VersionConflict {
                    package: frame.qpn.name.clone(),
                    qualifier: frame.qpn.clone(),
                    range: VersionRange::none(),
                },
                alternatives_tried,
            }));
        }
    }
    None
}

/// Undoes everything `frame`'s branch contributed: its own decision, plus
/// every goal/flag-goal/stanza-goal/armed-conditional registered at its
/// depth, so a retried ancestor doesn't see a discarded branch's leftovers.
fn undo_frame(state: &mut State, frame: &Frame) {
    state.decisions.retain(|d| d.var != frame.kind.var());
    state.flag_goals.retain(|(_, _, depth, _)| *depth != frame.depth);
    state.stanza_goals.retain(|(_, _, depth)| *depth != frame.depth);
    state.armed_conditionals.retain(|(_, _, _, _, _, depth)| *depth != frame.depth);
    state.goals.retract_from(frame.depth);
}

fn finish(state: &mut State) -> Result<InstallPlan, ConflictSet> {
    let mut plan = InstallPlan::default();
    for decision in &state.decisions {
        if let Decided::Package(source) = &decision.value {
            match source {
                PackageSource::Installed(installed) => {
                    plan.packages.push(ResolverPackage::PreExisting(installed.clone()));
                }
                PackageSource::Source(pv) => {
                    let flags: Vec<(FlagName, bool)> = state
                        .decisions
                        .iter()
                        .filter_map(|d| match &d.value {
                            Decided::Flag(v) if d.qpn == decision.qpn => Some((flag_name_of(state, d), *v)),
                            _ => None,
                        })
                        .collect();
                    let stanzas: Vec<Stanza> = state
                        .decisions
                        .iter()
                        .filter_map(|d| match &d.value {
                            Decided::Stanza(true) if d.qpn == decision.qpn => stanza_of(state, d),
                            _ => None,
                        })
                        .collect();
                    let unit_id = UnitId::new(format!("{}-{}", decision.qpn, pv.version));
                    let dep_unit_ids = dependency_unit_ids(state, &decision.qpn, pv);
                    plan.packages.push(ResolverPackage::Configured {
                        package: pv.clone(),
                        qualifier: decision.qpn.qualifier.clone(),
                        flags,
                        stanzas,
                        unit_id,
                        dep_unit_ids,
                    });
                }
            }
        }
    }

    let sir_issues = check_sir(&plan);
    if let Some(issue) = sir_issues.into_iter().next() {
        return Err(conflict_for_issue(state, &issue));
    }

    let setup_edges: HashSet<(UnitId, UnitId)> = state
        .setup_edges
        .iter()
        .filter_map(|(a, b)| {
            Some((
                unit_id_of_qpn(&state.decisions, a)?,
                unit_id_of_qpn(&state.decisions, b)?,
            ))
        })
        .collect();
    let cycle_issue = check_cycles(&plan, &setup_edges);
    if let Some(issue) = cycle_issue {
        return Err(conflict_for_issue(state, &issue));
    }

    let fact_issues = check_external_facts(state.index, &state.extension_obligations);
    if let Some(issue) = fact_issues.into_iter().next() {
        return Err(conflict_for_issue(state, &issue));
    }

    link_plan(&mut plan);
    Ok(plan)
}

fn conflict_for_issue(state: &mut State, issue: &ValidationIssue) -> ConflictSet {
    let mut c = state.vars.empty_conflict_set();
    match issue {
        ValidationIssue::SirViolation { qualifiers, .. } => {
            for q in qualifiers {
                c.insert(state.vars.intern(Var::Package(q.clone())));
            }
        }
        ValidationIssue::Cycle(unit_ids) => {
            let qpns: Vec<QualifiedPackageName> = state
                .decisions
                .iter()
                .filter(|d| unit_ids.contains(&unit_id_of(d)))
                .map(|d| d.qpn.clone())
                .collect();
            for qpn in qpns {
                c.insert(state.vars.intern(Var::Package(qpn)));
            }
        }
        ValidationIssue::MissingExtension { package, .. }
        | ValidationIssue::MissingLanguage { package, .. }
        | ValidationIssue::MissingPkgConfig { package, .. } => {
            c.insert(state.vars.intern(Var::Package(package.clone())));
        }
    }
    c
}

fn flag_name_of(state: &State, decision: &Decision) -> FlagName {
    match state.vars.resolve(decision.var) {
        Var::Flag(_, f) => f.clone(),
        _ => unreachable!("a Decided::Flag decision always resolves to Var::Flag"),
    }
}

fn stanza_of(state: &State, decision: &Decision) -> Option<Stanza> {
    match state.vars.resolve(decision.var) {
        Var::Stanza(_, s) => Some(*s),
        _ => None,
    }
}

fn dependency_unit_ids(state: &State, qpn: &QualifiedPackageName, pv: &SourcePackageVersion) -> Vec<UnitId> {
    let mut out = Vec::new();
    for dep in &pv.dependencies {
        if let Dependency::Package { name, .. } = dep {
            let target = QualifiedPackageName::new(qpn.qualifier.clone(), name.clone());
            if let Some(id) = unit_id_of_qpn(&state.decisions, &target) {
                out.push(id);
            }
        }
    }
    let setup_qualifier = Qualifier::Setup(qpn.name.clone());
    for dep in &pv.setup_dependencies {
        if let Dependency::Package { name, .. } = dep {
            let target = QualifiedPackageName::new(setup_qualifier.clone(), name.clone());
            if let Some(id) = unit_id_of_qpn(&state.decisions, &target) {
                out.push(id);
            }
        }
    }
    out
}

fn unit_id_of(decision: &Decision) -> UnitId {
    match &decision.value {
        Decided::Package(PackageSource::Installed(p)) => p.unit_id.clone(),
        Decided::Package(PackageSource::Source(pv)) => UnitId::new(format!("{}-{}", decision.qpn, pv.version)),
        _ => UnitId::new(format!("{}", decision.qpn)),
    }
}

fn unit_id_of_qpn(decisions: &[Decision], qpn: &QualifiedPackageName) -> Option<UnitId> {
    decisions.iter().find(|d| &d.qpn == qpn).map(unit_id_of)
}
