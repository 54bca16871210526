//! The constraint model: user- and dependency-supplied version constraints,
//! soft preferences, and the stanza policy, all carrying a source label used
//! only for explanations (never for deciding).

use std::fmt;

use crate::model::{PackageName, Stanza};
use crate::version::VersionRange;

/// Where a constraint on a package came from. Preserved through the solver
/// and surfaced in error messages; never changes how the solver decides.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConstraintSource {
    /// Supplied directly by the user (`--constraint`, a target version bound).
    User,
    /// Derived from another package's declared dependency.
    Dependency(PackageName),
    /// Derived from a package's setup-script dependency.
    Setup(PackageName),
    /// Imposed by an already-installed package's own dependency set.
    Installed(PackageName),
    /// Imposed by the sandbox or project configuration.
    Sandbox,
}

impl fmt::Display for ConstraintSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintSource::User => write!(f, "user constraint"),
            ConstraintSource::Dependency(p) => write!(f, "dependency of {p}"),
            ConstraintSource::Setup(p) => write!(f, "setup-dependency of {p}"),
            ConstraintSource::Installed(p) => write!(f, "already-installed {p}"),
            ConstraintSource::Sandbox => write!(f, "sandbox/project configuration"),
        }
    }
}

/// A single labeled version constraint on a package name, as supplied by the
/// caller.
#[derive(Debug, Clone)]
pub struct LabeledPackageConstraint {
    pub package: PackageName,
    pub range: VersionRange,
    pub source: ConstraintSource,
}

/// Whether the solver should favor already-installed versions or the latest
/// available source version when both satisfy the accumulated range.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum InstalledPreference {
    PreferInstalled,
    #[default]
    PreferLatest,
}

/// A soft version preference for a package: ordering only, never pruning.
#[derive(Debug, Clone)]
pub struct PackagePreference {
    pub package: PackageName,
    pub range: VersionRange,
}

/// Whether tests/benchmarks should be preferred enabled when optional.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct StanzaPreference {
    pub tests: bool,
    pub benchmarks: bool,
}

impl StanzaPreference {
    pub fn prefers(&self, stanza: Stanza) -> bool {
        match stanza {
            Stanza::Tests => self.tests,
            Stanza::Benchmarks => self.benchmarks,
        }
    }
}

/// `enable_all_tests` / `enable_all_benchmarks`: stanzas forced on for every
/// package in the closure, not just the preferred-on soft signal above.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct GlobalStanzaPolicy {
    pub enable_all_tests: bool,
    pub enable_all_benchmarks: bool,
}

impl GlobalStanzaPolicy {
    pub fn forces(&self, stanza: Stanza) -> bool {
        match stanza {
            Stanza::Tests => self.enable_all_tests,
            Stanza::Benchmarks => self.enable_all_benchmarks,
        }
    }
}

/// The immutable, once-per-invocation constraint model:
/// everything the caller supplied about which versions/flags/stanzas are
/// acceptable, before the search has made a single decision.
#[derive(Debug, Clone, Default)]
pub struct ConstraintModel {
    pub constraints: Vec<LabeledPackageConstraint>,
    pub preferences: Vec<PackagePreference>,
    pub installed_preference: InstalledPreference,
    pub stanza_preference: StanzaPreference,
    pub global_stanza_policy: GlobalStanzaPolicy,
}

impl ConstraintModel {
    /// The intersection of every user/sandbox constraint on `package`,
    /// independent of anything the search has derived so far.
    pub fn base_range(&self, package: &PackageName) -> VersionRange {
        use crate::version::VersionRangeExt;
        self.constraints
            .iter()
            .filter(|c| &c.package == package)
            .fold(VersionRange::any(), |acc, c| acc.intersection(&c.range))
    }

    pub fn base_constraints(&self, package: &PackageName) -> Vec<&LabeledPackageConstraint> {
        self.constraints.iter().filter(|c| &c.package == package).collect()
    }

    pub fn soft_preference(&self, package: &PackageName) -> Option<&VersionRange> {
        self.preferences
            .iter()
            .find(|p| &p.package == package)
            .map(|p| &p.range)
    }
}
