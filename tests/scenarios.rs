//! End-to-end scenarios exercising the driver against small hand-built
//! indexes: a plain dependency chain, an already-installed package, two
//! targets that can't share a version, independent goals letting them both
//! resolve anyway, a flag-gated dependency, and a cycle routed entirely
//! through setup edges.

use std::io::Write;

use log::LevelFilter;

use modular_resolve::constraints::ConstraintModel;
use modular_resolve::driver::{resolve, OptionsBuilder};
use modular_resolve::index::Index;
use modular_resolve::model::{
    Dependency, FlagDecl, FlagName, InstalledPackage, PackageName, ResolverPackage, SourcePackageVersion, UnitId,
};
use modular_resolve::version::{Version, VersionRangeExt, VersionRange};

fn init_log() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Trace)
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .is_test(true)
        .try_init();
}

fn source(name: &str, version: impl Into<Version>, deps: Vec<Dependency>) -> SourcePackageVersion {
    SourcePackageVersion {
        name: PackageName::new(name),
        version: version.into(),
        flags: Vec::new(),
        dependencies: deps,
        setup_dependencies: Vec::new(),
        stanzas: Vec::new(),
        min_compiler_version: None,
    }
}

fn dep(name: &str, range: VersionRange) -> Dependency {
    Dependency::Package {
        name: PackageName::new(name),
        range,
        component: None,
    }
}

#[test]
fn already_installed_satisfies_target_without_search() {
    init_log();
    let mut index = Index::new();
    index.installed.insert(InstalledPackage {
        unit_id: UnitId::new("base-4.0"),
        name: PackageName::new("base"),
        version: Version::new([4, 0]),
        depends: Vec::new(),
        exposed: true,
    });

    let constraints = ConstraintModel::default();
    let options = OptionsBuilder::new().target(PackageName::new("base")).build();
    let plan = resolve(&index, &constraints, &options).expect("base is already installed");
    assert_eq!(plan.len(), 1);
}

#[test]
fn simple_dependency_chain_resolves() {
    init_log();
    let mut index = Index::new();
    index.source.insert(source(
        "app",
        [1, 0],
        vec![dep("lib", VersionRange::at_least([1, 0].into()))],
    ));
    index.source.insert(source("lib", [1, 0], vec![]));
    index.source.insert(source("lib", [2, 0], vec![]));

    let constraints = ConstraintModel::default();
    let options = OptionsBuilder::new().target(PackageName::new("app")).build();
    let plan = resolve(&index, &constraints, &options).expect("app + lib should resolve");
    assert_eq!(plan.len(), 2);
}

#[test]
fn incompatible_targets_fail_without_independent_goals() {
    init_log();
    let mut index = Index::new();
    index.source.insert(source(
        "a",
        [1, 0],
        vec![dep("shared", VersionRange::equals([1, 0].into()))],
    ));
    index.source.insert(source(
        "b",
        [1, 0],
        vec![dep("shared", VersionRange::equals([2, 0].into()))],
    ));
    index.source.insert(source("shared", [1, 0], vec![]));
    index.source.insert(source("shared", [2, 0], vec![]));

    let constraints = ConstraintModel::default();
    let options = OptionsBuilder::new()
        .target(PackageName::new("a"))
        .target(PackageName::new("b"))
        .build();
    assert!(resolve(&index, &constraints, &options).is_err());
}

#[test]
fn independent_goals_let_incompatible_targets_both_resolve() {
    init_log();
    let mut index = Index::new();
    index.source.insert(source(
        "a",
        [1, 0],
        vec![dep("shared", VersionRange::equals([1, 0].into()))],
    ));
    index.source.insert(source(
        "b",
        [1, 0],
        vec![dep("shared", VersionRange::equals([2, 0].into()))],
    ));
    index.source.insert(source("shared", [1, 0], vec![]));
    index.source.insert(source("shared", [2, 0], vec![]));

    let constraints = ConstraintModel::default();
    let options = OptionsBuilder::new()
        .target(PackageName::new("a"))
        .target(PackageName::new("b"))
        .independent_goals(true)
        .build();
    let plan = resolve(&index, &constraints, &options).expect("independent goals should allow both");
    assert_eq!(plan.len(), 4);
}

#[test]
fn flag_controlled_dependency_follows_default() {
    init_log();
    let mut with_flag = source("app", [1, 0], vec![]);
    with_flag.flags.push(FlagDecl {
        name: "network".into(),
        default: true,
    });
    with_flag.dependencies.push(Dependency::If {
        flag: "network".into(),
        value: true,
        then_branch: vec![dep("http-client", VersionRange::any())],
        else_branch: vec![],
    });

    let mut index = Index::new();
    index.source.insert(with_flag);
    index.source.insert(source("http-client", [1, 0], vec![]));

    let constraints = ConstraintModel::default();
    let options = OptionsBuilder::new().target(PackageName::new("app")).build();
    let plan = resolve(&index, &constraints, &options).expect("flag default should pull in http-client");
    assert_eq!(plan.len(), 2);
}

#[test]
fn flag_controlled_dependency_backtracks_when_the_gated_branch_dead_ends() {
    init_log();
    // `app` pulls in `net` only when its `usey` flag is on, which it is by
    // default. But `net` itself depends on a version of `missing` that
    // doesn't exist in the index, so that subtree can never resolve. The
    // only way out is for the solver to backtrack onto the flag itself and
    // retry with `usey=false`, at which point `app` alone is a valid plan.
    let mut app = source("app", [1, 0], vec![]);
    app.flags.push(FlagDecl {
        name: "usey".into(),
        default: true,
    });
    app.dependencies.push(Dependency::If {
        flag: "usey".into(),
        value: true,
        then_branch: vec![dep("net", VersionRange::any())],
        else_branch: vec![],
    });

    let net = source("net", [1, 0], vec![dep("missing", VersionRange::any())]);

    let mut index = Index::new();
    index.source.insert(app);
    index.source.insert(net);
    // `missing` is never inserted into the index.

    let constraints = ConstraintModel::default();
    let options = OptionsBuilder::new().target(PackageName::new("app")).build();
    let plan = resolve(&index, &constraints, &options).expect("should backtrack to usey=false");
    assert_eq!(plan.len(), 1);

    let app_plan = &plan.packages[0];
    match app_plan {
        ResolverPackage::Configured { flags, .. } => {
            assert_eq!(flags, &vec![(FlagName::from("usey"), false)]);
        }
        ResolverPackage::PreExisting(_) => panic!("expected a configured app, not a pre-existing package"),
    }
}

#[test]
fn cycle_through_setup_is_not_reported_as_a_cycle() {
    init_log();
    // `app` depends on `lib`'s library. `lib`'s own *setup* build in turn
    // depends on `lib` (a self-hosting build system needing an already-built
    // copy of the very library it configures) -- a self-loop in the raw edge
    // graph that setup edges are excluded from, so resolution still succeeds.
    let mut lib = source("lib", [1, 0], vec![]);
    lib.setup_dependencies.push(dep("lib", VersionRange::any()));

    let mut index = Index::new();
    index.source.insert(source("app", [1, 0], vec![dep("lib", VersionRange::at_least([1, 0].into()))]));
    index.source.insert(lib);

    let constraints = ConstraintModel::default();
    let options = OptionsBuilder::new().target(PackageName::new("app")).build();
    let plan = resolve(&index, &constraints, &options).expect("setup-only cycle should not block resolution");
    assert_eq!(plan.len(), 3);
}
