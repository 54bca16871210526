//! The resolver's error surface: the fixed failure categories and
//! the two outcomes [`crate::driver::resolve`] can return instead of a plan.

use thiserror::Error;

use crate::model::{FlagName, PackageName, QualifiedPackageName, Stanza, UnitId};
use crate::version::VersionRange;

/// One of the fixed categories a failed resolution falls into.
#[derive(Debug, Error, Clone)]
pub enum ResolveError {
    #[error("unknown package {0}")]
    UnknownPackage(PackageName),

    #[error("no version of {package} satisfies {range} (wanted by {qualifier})")]
    VersionConflict {
        package: PackageName,
        qualifier: QualifiedPackageName,
        range: VersionRange,
    },

    #[error("conflicting requirements on flag {flag} of {package}")]
    FlagConflict {
        package: QualifiedPackageName,
        flag: FlagName,
    },

    #[error("{package} requires compiler extension {extension}, which is not available")]
    MissingExtension {
        package: QualifiedPackageName,
        extension: String,
    },

    #[error("{package} requires language {language}, which the configured compiler does not support")]
    MissingLanguage {
        package: QualifiedPackageName,
        language: String,
    },

    #[error("{package} requires system library {lib}, which pkg-config cannot satisfy")]
    MissingPkgConfig {
        package: QualifiedPackageName,
        lib: String,
    },

    #[error("dependency cycle: {}", cycle_str(.0))]
    CycleDetected(Vec<UnitId>),

    #[error("{name} would need two different builds ({}) within the same independent-goals scope", qualifiers_str(.qualifiers))]
    SirViolation {
        name: PackageName,
        qualifiers: Vec<QualifiedPackageName>,
    },

    #[error("{package} cannot enable stanza {stanza} and still satisfy its dependency constraints")]
    LinkingViolation {
        package: QualifiedPackageName,
        stanza: Stanza,
    },

    #[error("search exhausted its backjump budget of {0} before finding a plan")]
    BudgetExhausted(u64),
}

fn cycle_str(ids: &[UnitId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ")
}

fn qualifiers_str(qs: &[QualifiedPackageName]) -> String {
    qs.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// The terminal outcome of a resolution attempt when no plan was found.
#[derive(Debug, Error, Clone)]
#[error("{primary}")]
pub struct ResolveFailure {
    /// The error that finally exhausted the last goal's branch list.
    pub primary: ResolveError,
    /// Every alternative branch the driver tried for the failing goal
    /// before giving up, each paired with why it was rejected.
    pub alternatives_tried: Vec<(String, ResolveError)>,
}
