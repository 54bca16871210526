//! Core data model: names, flags, stanzas, dependency expressions, and the
//! qualifier namespace that the rest of the solver is built on top of.

use std::fmt;
use std::sync::Arc;

use crate::version::{Version, VersionRange};

/// An opaque package identifier.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PackageName(Arc<str>);

impl PackageName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// `(PackageName, Version)`: identifies one concrete release.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PackageId {
    pub name: PackageName,
    pub version: Version,
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// A flag name, scoped to the single package version that declares it.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FlagName(Arc<str>);

impl FlagName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FlagName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The declaration of one flag on one package version: its name and default.
#[derive(Debug, Clone)]
pub struct FlagDecl {
    pub name: FlagName,
    pub default: bool,
}

/// An optional, conditionally-built block of a package version.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Stanza {
    Tests,
    Benchmarks,
}

impl fmt::Display for Stanza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stanza::Tests => write!(f, "tests"),
            Stanza::Benchmarks => write!(f, "benchmarks"),
        }
    }
}

/// Dependencies enabled when a stanza is turned on.
#[derive(Debug, Clone, Default)]
pub struct StanzaDecl {
    pub dependencies: Vec<Dependency>,
}

/// A single dependency requirement, one node of the dependency-expression tree.
#[derive(Debug, Clone)]
pub enum Dependency {
    /// A dependency on another package's library, optionally restricted to a
    /// named internal component.
    Package {
        name: PackageName,
        range: VersionRange,
        component: Option<String>,
    },
    /// A dependency satisfied by a distinct, executable-producing build of
    /// the same-named package, resolved in the package's `Exe` qualifier.
    BuildTool { name: PackageName, range: VersionRange },
    /// Satisfied iff the configured compiler supports this language extension.
    Extension(String),
    /// Satisfied iff the configured compiler supports this base language.
    Language(String),
    /// Satisfied by consulting the external pkg-config database.
    PkgConfig { lib: String, range: VersionRange },
    /// `if flag == value { then_branch } else { else_branch }`, nesting
    /// arbitrarily.
    If {
        flag: FlagName,
        value: bool,
        then_branch: Vec<Dependency>,
        else_branch: Vec<Dependency>,
    },
}

/// One available release of a source package: its flags, stanzas, and the
/// dependency tree they gate.
#[derive(Debug, Clone)]
pub struct SourcePackageVersion {
    pub name: PackageName,
    pub version: Version,
    pub flags: Vec<FlagDecl>,
    pub dependencies: Vec<Dependency>,
    /// Dependencies of this package's own configure/build-system step,
    /// resolved in the `Setup(name)` qualifier so they never compete with
    /// the package's own library dependencies for a single chosen version.
    pub setup_dependencies: Vec<Dependency>,
    pub stanzas: Vec<(Stanza, StanzaDecl)>,
    pub min_compiler_version: Option<Version>,
}

impl SourcePackageVersion {
    pub fn flag(&self, name: &FlagName) -> Option<&FlagDecl> {
        self.flags.iter().find(|f| &f.name == name)
    }

    pub fn stanza(&self, stanza: Stanza) -> Option<&StanzaDecl> {
        self.stanzas.iter().find(|(s, _)| *s == stanza).map(|(_, d)| d)
    }
}

/// A unique handle to a configured or pre-existing build, assigned once a
/// package/flags/stanzas tuple has been decided.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct UnitId(pub Arc<str>);

impl UnitId {
    pub fn new(label: impl Into<String>) -> Self {
        Self(Arc::from(label.into()))
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An already-installed package: immutable, pre-validated, pre-chosen.
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub unit_id: UnitId,
    pub name: PackageName,
    pub version: Version,
    pub depends: Vec<UnitId>,
    pub exposed: bool,
}

/// A release available to the Index: either pre-installed or buildable from source.
#[derive(Debug, Clone)]
pub enum PackageSource {
    Installed(InstalledPackage),
    Source(SourcePackageVersion),
}

impl PackageSource {
    pub fn name(&self) -> &PackageName {
        match self {
            PackageSource::Installed(p) => &p.name,
            PackageSource::Source(p) => &p.name,
        }
    }

    pub fn version(&self) -> &Version {
        match self {
            PackageSource::Installed(p) => &p.version,
            PackageSource::Source(p) => &p.version,
        }
    }

    pub fn is_installed(&self) -> bool {
        matches!(self, PackageSource::Installed(_))
    }
}

/// A namespace on package names, so that copies built for different roles
/// may pick distinct versions.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Qualifier {
    /// The user's own target closure.
    Top,
    /// Independent-goal namespace `n`, used when `independent_goals = true`.
    Indep(u32),
    /// The subspace for building `p`'s own setup/configure script.
    Setup(PackageName),
    /// The build-tool subspace: building `exe` as an executable for `p` to
    /// invoke at build time.
    Exe(PackageName, PackageName),
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Top => write!(f, "top"),
            Qualifier::Indep(n) => write!(f, "indep:{n}"),
            Qualifier::Setup(p) => write!(f, "setup:{p}"),
            Qualifier::Exe(p, exe) => write!(f, "exe:{p}/{exe}"),
        }
    }
}

/// `(Qualifier, PackageName)`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct QualifiedPackageName {
    pub qualifier: Qualifier,
    pub name: PackageName,
}

impl QualifiedPackageName {
    pub fn new(qualifier: Qualifier, name: PackageName) -> Self {
        Self { qualifier, name }
    }

    pub fn top(name: PackageName) -> Self {
        Self::new(Qualifier::Top, name)
    }
}

impl fmt::Display for QualifiedPackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Qualifier::Top => write!(f, "{}", self.name),
            q => write!(f, "{}/{}", q, self.name),
        }
    }
}

/// Why a goal was introduced, kept for conflict explanations.
#[derive(Debug, Clone)]
pub enum GoalReason {
    UserTarget,
    DependencyOf(QualifiedPackageName, Version),
    SetupDependencyOf(QualifiedPackageName, Version),
    StanzaDependencyOf(QualifiedPackageName, Version, Stanza),
    FlagGatedDependencyOf(QualifiedPackageName, Version, FlagName, bool),
}

impl fmt::Display for GoalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalReason::UserTarget => write!(f, "user target"),
            GoalReason::DependencyOf(q, v) => write!(f, "dependency of {q} {v}"),
            GoalReason::SetupDependencyOf(q, v) => write!(f, "setup-dependency of {q} {v}"),
            GoalReason::StanzaDependencyOf(q, v, s) => {
                write!(f, "{s} dependency of {q} {v}")
            }
            GoalReason::FlagGatedDependencyOf(q, v, flag, value) => {
                write!(f, "dependency of {q} {v} when {flag}={value}")
            }
        }
    }
}

/// One package as it appears in a finished [`InstallPlan`].
#[derive(Debug, Clone)]
pub enum ResolverPackage {
    PreExisting(InstalledPackage),
    Configured {
        package: SourcePackageVersion,
        qualifier: Qualifier,
        flags: Vec<(FlagName, bool)>,
        stanzas: Vec<Stanza>,
        unit_id: UnitId,
        dep_unit_ids: Vec<UnitId>,
    },
}

impl ResolverPackage {
    pub fn unit_id(&self) -> &UnitId {
        match self {
            ResolverPackage::PreExisting(p) => &p.unit_id,
            ResolverPackage::Configured { unit_id, .. } => unit_id,
        }
    }

    pub fn name(&self) -> &PackageName {
        match self {
            ResolverPackage::PreExisting(p) => &p.name,
            ResolverPackage::Configured { package, .. } => &package.name,
        }
    }
}

/// A topologically sorted install plan: every dependency edge satisfied, no
/// cycles outside setup edges, at most one entry per (qualifier, name).
#[derive(Debug, Clone, Default)]
pub struct InstallPlan {
    pub packages: Vec<ResolverPackage>,
}

impl InstallPlan {
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
