//! Post-decision validation: the checks that run against a
//! candidate [`InstallPlan`] once the driver has decided every goal --
//! the Single Instance Restriction, opportunistic linking, the
//! external-fact checks (extensions/languages/pkg-config), and acyclicity.

use std::collections::{HashMap, HashSet};

use crate::index::Index;
use crate::model::{InstallPlan, PackageName, Qualifier, QualifiedPackageName, ResolverPackage, UnitId};

/// One thing wrong with an otherwise-complete plan. The driver treats any
/// of these as a failure requiring backjumping on the named goal.
#[derive(Debug, Clone)]
pub enum ValidationIssue {
    /// Two qualifiers both settled on the same package at different
    /// versions where the Single Instance Restriction requires exactly one.
    SirViolation {
        name: PackageName,
        qualifiers: Vec<QualifiedPackageName>,
    },
    /// The plan's dependency graph (excluding setup edges) contains a cycle.
    Cycle(Vec<UnitId>),
    /// A package's dependency named an extension the compiler doesn't list.
    MissingExtension { package: QualifiedPackageName, extension: String },
    /// A package's dependency named a base language the compiler doesn't list.
    MissingLanguage { package: QualifiedPackageName, language: String },
    /// A package's dependency named a system library pkg-config can't satisfy.
    MissingPkgConfig { package: QualifiedPackageName, lib: String },
}

/// Checks the Single Instance Restriction: within a single shared-scope
/// [`crate::model::Qualifier`] (`Top`, or one `Indep(n)` namespace), a
/// package name may resolve to only one (version, flags, stanzas) tuple.
/// The restriction is intra-qualifier -- two different `Indep(n)` goals are
/// independent SIR domains and may legitimately settle the same package
/// name at different versions, so entries are grouped by the full
/// [`QualifiedPackageName`], not the bare name. In practice this already
/// holds by construction (goals merge per `QualifiedPackageName`), so this
/// is the redundant, independent check the design notes call for: a
/// solver bug that let one qualified name settle on two different unit ids
/// would otherwise go unnoticed until link time.
pub fn check_sir(plan: &InstallPlan) -> Vec<ValidationIssue> {
    // Setup and Exe qualifiers each get their own private copy by design;
    // SIR only binds Top and the Indep(_) independent-goal namespaces.
    fn is_shared_scope(q: &Qualifier) -> bool {
        matches!(q, Qualifier::Top | Qualifier::Indep(_))
    }

    let mut by_qpn: HashMap<QualifiedPackageName, Vec<&UnitId>> = HashMap::new();
    for pkg in &plan.packages {
        if let ResolverPackage::Configured {
            package,
            qualifier,
            unit_id,
            ..
        } = pkg
        {
            if is_shared_scope(qualifier) {
                let qpn = QualifiedPackageName::new(qualifier.clone(), package.name.clone());
                by_qpn.entry(qpn).or_default().push(unit_id);
            }
        }
    }

    let mut issues = Vec::new();
    for (qpn, unit_ids) in by_qpn {
        let distinct: HashSet<&UnitId> = unit_ids.into_iter().collect();
        if distinct.len() > 1 {
            issues.push(ValidationIssue::SirViolation {
                name: qpn.name.clone(),
                qualifiers: vec![qpn],
            });
        }
    }
    issues
}

/// Opportunistic linking: after the plan is otherwise complete, merge any
/// two `Configured` entries that are identical in package, version, flags,
/// and stanzas but sit in different qualifiers, collapsing them to a single
/// build. Linking is never required for soundness, only an optimization, so
/// failing to link anything is not an error.
pub fn link_plan(plan: &mut InstallPlan) {
    let mut canonical: HashMap<(PackageName, crate::version::Version, Vec<(crate::model::FlagName, bool)>, Vec<crate::model::Stanza>), UnitId> =
        HashMap::new();
    let mut rename: HashMap<UnitId, UnitId> = HashMap::new();

    for pkg in &plan.packages {
        if let ResolverPackage::Configured {
            package,
            flags,
            stanzas,
            unit_id,
            ..
        } = pkg
        {
            let mut flags_sorted = flags.clone();
            flags_sorted.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
            let mut stanzas_sorted = stanzas.clone();
            stanzas_sorted.sort();
            let key = (package.name.clone(), package.version.clone(), flags_sorted, stanzas_sorted);
            match canonical.get(&key) {
                Some(existing) if existing != unit_id => {
                    rename.insert(unit_id.clone(), existing.clone());
                }
                Some(_) => {}
                None => {
                    canonical.insert(key, unit_id.clone());
                }
            }
        }
    }

    if rename.is_empty() {
        return;
    }

    plan.packages.retain(|pkg| match pkg {
        ResolverPackage::Configured { unit_id, .. } => !rename.contains_key(unit_id),
        ResolverPackage::PreExisting(_) => true,
    });
    for pkg in &mut plan.packages {
        if let ResolverPackage::Configured { dep_unit_ids, .. } = pkg {
            for dep in dep_unit_ids.iter_mut() {
                if let Some(canon) = rename.get(dep) {
                    *dep = canon.clone();
                }
            }
        }
    }
}

/// Detects a cycle in the plan's dependency graph. Setup edges are excluded
/// from the walk: a package's setup script may depend on a prior version of
/// the same package's library without that counting as a cycle, since the
/// setup build completes and is torn down before the library build starts.
pub fn check_cycles(plan: &InstallPlan, setup_edges: &HashSet<(UnitId, UnitId)>) -> Option<ValidationIssue> {
    let mut adjacency: HashMap<&UnitId, Vec<&UnitId>> = HashMap::new();
    for pkg in &plan.packages {
        if let ResolverPackage::Configured { unit_id, dep_unit_ids, .. } = pkg {
            let edges = dep_unit_ids
                .iter()
                .filter(|dep| !setup_edges.contains(&(unit_id.clone(), (*dep).clone())))
                .collect();
            adjacency.insert(unit_id, edges);
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<&UnitId, Mark> = HashMap::new();
    let mut stack: Vec<UnitId> = Vec::new();

    fn visit<'a>(
        node: &'a UnitId,
        adjacency: &HashMap<&'a UnitId, Vec<&'a UnitId>>,
        marks: &mut HashMap<&'a UnitId, Mark>,
        stack: &mut Vec<UnitId>,
    ) -> Option<Vec<UnitId>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|u| u == node).unwrap_or(0);
                return Some(stack[start..].to_vec());
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node.clone());
        if let Some(deps) = adjacency.get(node) {
            for dep in deps {
                if let Some(cycle) = visit(dep, adjacency, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    for pkg in &plan.packages {
        let unit_id = pkg.unit_id();
        if let Some(cycle) = visit(unit_id, &adjacency, &mut marks, &mut stack) {
            return Some(ValidationIssue::Cycle(cycle));
        }
    }
    None
}

/// Checks every `Extension`/`Language`/`PkgConfig` dependency the final plan
/// still carries against the Index's compiler and pkg-config facts.
pub fn check_external_facts(
    index: &Index,
    obligations: &[(QualifiedPackageName, crate::model::Dependency)],
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for (qpn, dep) in obligations {
        match dep {
            crate::model::Dependency::Extension(ext) => {
                let ok = index.compiler.as_ref().is_some_and(|c| c.supports_extension(ext));
                if !ok {
                    issues.push(ValidationIssue::MissingExtension {
                        package: qpn.clone(),
                        extension: ext.clone(),
                    });
                }
            }
            crate::model::Dependency::Language(lang) => {
                let ok = index.compiler.as_ref().is_some_and(|c| c.supports_language(lang));
                if !ok {
                    issues.push(ValidationIssue::MissingLanguage {
                        package: qpn.clone(),
                        language: lang.clone(),
                    });
                }
            }
            crate::model::Dependency::PkgConfig { lib, range } => {
                if !index.pkg_config.satisfies(lib, range) {
                    issues.push(ValidationIssue::MissingPkgConfig {
                        package: qpn.clone(),
                        lib: lib.clone(),
                    });
                }
            }
            _ => {}
        }
    }
    issues
}
