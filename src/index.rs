//! The Index: a read-only catalogue of installed and source
//! packages, plus the fixed platform/compiler/pkg-config facts the search
//! consults when validating extension, language, and system-library
//! dependencies. Everything here is constructed once, before the search
//! starts, and never mutates afterwards.

use std::collections::HashSet;

use rustc_hash::FxHashMap;

use crate::model::{InstalledPackage, PackageName, PackageSource, SourcePackageVersion, UnitId};
use crate::version::{Version, VersionRange};

/// OS/architecture/wordsize facts, opaque to the solver beyond equality.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
    pub wordsize: u32,
}

/// The configured compiler: what it calls itself, its version, and the set
/// of language extensions/standards and ABI tag it supports.
#[derive(Debug, Clone)]
pub struct CompilerInfo {
    pub flavor: String,
    pub version: Version,
    pub extensions: HashSet<String>,
    pub languages: HashSet<String>,
    pub abi_tag: String,
    /// If `true`, an extension absent from `extensions` is still considered
    /// satisfiable (an "extensible" compiler); unknown extensions are meant to
    /// treat unknowns as satisfiable only when explicitly enumerated, so in
    /// practice this stays `false` unless the caller opts in with the
    /// extension actually listed.
    pub extensible: bool,
}

impl CompilerInfo {
    pub fn supports_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    pub fn supports_language(&self, name: &str) -> bool {
        self.languages.contains(name)
    }
}

/// A mapping from system library name to the set of versions a pkg-config
/// database reports as installed.
#[derive(Debug, Clone, Default)]
pub struct PkgConfigDb {
    libs: FxHashMap<String, Vec<Version>>,
}

impl PkgConfigDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, lib: impl Into<String>, versions: impl IntoIterator<Item = Version>) {
        self.libs.insert(lib.into(), versions.into_iter().collect());
    }

    pub fn satisfies(&self, lib: &str, range: &VersionRange) -> bool {
        self.libs
            .get(lib)
            .map(|versions| versions.iter().any(|v| range.contains(v)))
            .unwrap_or(false)
    }
}

/// The set of already-installed packages, keyed by [`UnitId`].
#[derive(Debug, Clone, Default)]
pub struct InstalledIndex {
    by_unit_id: FxHashMap<UnitId, InstalledPackage>,
}

impl InstalledIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, package: InstalledPackage) {
        self.by_unit_id.insert(package.unit_id.clone(), package);
    }

    pub fn by_unit_id(&self, id: &UnitId) -> Option<&InstalledPackage> {
        self.by_unit_id.get(id)
    }

    pub fn by_name(&self, name: &PackageName) -> Vec<&InstalledPackage> {
        self.by_unit_id.values().filter(|p| &p.name == name).collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &InstalledPackage> {
        self.by_unit_id.values()
    }
}

/// The catalogue of buildable packages, keyed by name, each with an ordered
/// list of available versions.
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    by_name: FxHashMap<PackageName, Vec<SourcePackageVersion>>,
}

impl SourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, version: SourcePackageVersion) {
        self.by_name
            .entry(version.name.clone())
            .or_default()
            .push(version);
    }

    pub fn by_name(&self, name: &PackageName) -> &[SourcePackageVersion] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The combined, read-only view the search queries: `lookup` unifies
/// installed and source releases, ordered high-to-low when requested.
#[derive(Debug, Clone, Default)]
pub struct Index {
    pub installed: InstalledIndex,
    pub source: SourceIndex,
    pub pkg_config: PkgConfigDb,
    pub compiler: Option<CompilerInfo>,
    pub platform: Option<Platform>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// All releases of `name`, installed first, then source versions ordered
    /// highest-to-lowest.
    pub fn lookup(&self, name: &PackageName) -> Vec<PackageSource> {
        let mut out: Vec<PackageSource> = self
            .installed
            .by_name(name)
            .into_iter()
            .cloned()
            .map(PackageSource::Installed)
            .collect();
        let mut source_versions: Vec<&SourcePackageVersion> =
            self.source.by_name(name).iter().collect();
        source_versions.sort_by(|a, b| b.version.cmp(&a.version));
        out.extend(source_versions.into_iter().cloned().map(PackageSource::Source));
        out
    }

    pub fn installed_by_unit_id(&self, id: &UnitId) -> Option<&InstalledPackage> {
        self.installed.by_unit_id(id)
    }

    pub fn known_package(&self, name: &PackageName) -> bool {
        !self.installed.by_name(name).is_empty() || !self.source.by_name(name).is_empty()
    }
}
