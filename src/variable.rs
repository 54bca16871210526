//! Dense variable identity and compact conflict sets.
//!
//! Every decidable quantity in the search -- a package's version, a flag's
//! value, a stanza's enablement -- gets a small dense integer id the first
//! time it is mentioned. [`ConflictSet`]s are then bitsets over those ids, so
//! union and membership are both cheap regardless of how large the graph
//! gets. A side table (kept in [`VariableTable`]) maps ids back to the
//! human-readable [`Var`] for the explainer.

use std::fmt;

use indexmap::IndexMap;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;

use crate::model::{FlagName, QualifiedPackageName, Stanza};

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// What a [`VarId`] stands for: a package's chosen version, one package's
/// flag, or one package's stanza.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Var {
    Package(QualifiedPackageName),
    Flag(QualifiedPackageName, FlagName),
    Stanza(QualifiedPackageName, Stanza),
}

impl Var {
    pub fn qualified_name(&self) -> &QualifiedPackageName {
        match self {
            Var::Package(q) => q,
            Var::Flag(q, _) => q,
            Var::Stanza(q, _) => q,
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::Package(q) => write!(f, "{q}"),
            Var::Flag(q, flag) => write!(f, "{q}:flag:{flag}"),
            Var::Stanza(q, stanza) => write!(f, "{q}:stanza:{stanza}"),
        }
    }
}

/// A dense id for a [`Var`]. Cheap to copy, compare, and hash; use
/// [`VariableTable`] to go back to the human-readable form.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct VarId(u32);

impl VarId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Interns [`Var`]s into dense [`VarId`]s.
#[derive(Debug, Default)]
pub struct VariableTable {
    ids: FxIndexMap<Var, VarId>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or allocate the id for `var`.
    pub fn intern(&mut self, var: Var) -> VarId {
        if let Some(id) = self.ids.get(&var) {
            return *id;
        }
        let id = VarId(self.ids.len() as u32);
        self.ids.insert(var, id);
        id
    }

    pub fn get(&self, var: &Var) -> Option<VarId> {
        self.ids.get(var).copied()
    }

    pub fn resolve(&self, id: VarId) -> &Var {
        self.ids
            .get_index(id.index())
            .map(|(var, _)| var)
            .expect("VarId from this table is always present")
    }

    fn capacity_words(&self) -> usize {
        self.ids.len().div_ceil(64).max(1)
    }

    /// A fresh, empty conflict set sized to the variables interned so far.
    pub fn empty_conflict_set(&self) -> ConflictSet {
        ConflictSet {
            words: vec![0u64; self.capacity_words()],
        }
    }
}

/// A compact bitset of [`VarId`]s: the set of variables whose assignment
/// contributed to an observed failure.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct ConflictSet {
    words: Vec<u64>,
}

impl ConflictSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure(&mut self, word: usize) {
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
    }

    pub fn insert(&mut self, id: VarId) {
        let word = id.index() / 64;
        let bit = id.index() % 64;
        self.ensure(word);
        self.words[word] |= 1u64 << bit;
    }

    pub fn contains(&self, id: VarId) -> bool {
        let word = id.index() / 64;
        let bit = id.index() % 64;
        self.words
            .get(word)
            .map(|w| (w >> bit) & 1 == 1)
            .unwrap_or(false)
    }

    pub fn remove(&mut self, id: VarId) {
        let word = id.index() / 64;
        let bit = id.index() % 64;
        if let Some(w) = self.words.get_mut(word) {
            *w &= !(1u64 << bit);
        }
    }

    pub fn union_with(&mut self, other: &ConflictSet) {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = VarId> + '_ {
        self.words.iter().enumerate().flat_map(|(word, bits)| {
            (0..64).filter_map(move |bit| {
                if (bits >> bit) & 1 == 1 {
                    Some(VarId((word * 64 + bit) as u32))
                } else {
                    None
                }
            })
        })
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
    fn interning_is_stable() {
        let mut table = VariableTable::new();
        let a = table.intern(Var::Package(qpn("a")));
        let a2 = table.intern(Var::Package(qpn("a")));
        let b = table.intern(Var::Package(qpn("b")));
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(table.resolve(a), &Var::Package(qpn("a")));
    }

    #[test]
    fn conflict_set_union_and_membership() {
        let mut table = VariableTable::new();
        let a = table.intern(Var::Package(qpn("a")));
        let b = table.intern(Var::Package(qpn("b")));
        let mut c1 = ConflictSet::new();
        c1.insert(a);
        let mut c2 = ConflictSet::new();
        c2.insert(b);
        c1.union_with(&c2);
        assert!(c1.contains(a));
        assert!(c1.contains(b));
        assert_eq!(c1.iter().count(), 2);
    }

    #[test]
    fn spans_multiple_words() {
        let mut table = VariableTable::new();
        let mut ids = Vec::new();
        for i in 0..200 {
            ids.push(table.intern(Var::Package(qpn(&format!("p{i}")))));
        }
        let mut set = ConflictSet::new();
        for id in &ids {
            set.insert(*id);
        }
        for id in &ids {
            assert!(set.contains(*id));
        }
        assert_eq!(set.iter().count(), 200);
    }
}
