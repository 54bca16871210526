// SPDX-License-Identifier: MPL-2.0

//! A conflict-directed backjumping dependency resolver core, modeled on
//! cabal's "modular" solver: given an [`index::Index`] of installed and
//! buildable packages, a [`constraints::ConstraintModel`], and a set of
//! user targets, [`driver::resolve`] searches for a consistent
//! [`model::InstallPlan`] -- one concrete version, flag assignment, and
//! stanza selection per package, satisfying every dependency edge, the
//! Single Instance Restriction, and the compiler/pkg-config facts in the
//! index.
//!
//! This crate is deliberately just the solver core: it has no opinions
//! about where packages come from, how they're built, or how they get
//! installed. Callers own the package-description parser, the network
//! fetcher, the build executor, and the CLI.
//!
//! # Basic example
//!
//! ```
//! use modular_resolve::constraints::ConstraintModel;
//! use modular_resolve::driver::{resolve, OptionsBuilder};
//! use modular_resolve::index::Index;
//! use modular_resolve::model::PackageName;
//!
//! let index = Index::new();
//! let constraints = ConstraintModel::default();
//! let options = OptionsBuilder::new().target(PackageName::new("root")).build();
//! match resolve(&index, &constraints, &options) {
//!     Ok(plan) => println!("resolved {} packages", plan.len()),
//!     Err(failure) => eprintln!("{}", failure.primary),
//! }
//! ```

pub mod constraints;
pub mod driver;
pub mod error;
pub mod index;
pub mod model;
pub mod report;
pub mod tree;
pub mod validate;
pub mod variable;
pub mod version;

pub use driver::{resolve, Options, OptionsBuilder};
pub use error::{ResolveError, ResolveFailure};
pub use model::InstallPlan;
