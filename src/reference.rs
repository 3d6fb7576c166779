use std::fmt::{Display, Formatter};
use std::ops::Neg;

use crate::utils::{fold_sign, Fingerprint};

/// Handle to a node in a [`Bdd`][crate::bdd::Bdd] manager.
///
/// The sign carries a complement edge: `-r` denotes the negation of `r`.
/// Index `0` is never a valid node, index `1` is the terminal.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Ref(i32);

impl Ref {
    pub(crate) const fn positive(index: u32) -> Self {
        Self(index as i32)
    }

    pub const fn is_negated(self) -> bool {
        self.0 < 0
    }

    /// Strip the complement bit.
    pub const fn regular(self) -> Self {
        Self(self.0.abs())
    }

    /// Index of the underlying node in the unique table.
    pub const fn index(self) -> usize {
        self.0.unsigned_abs() as usize
    }

    /// Signed integer representation.
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_negated() {
            write!(f, "~@{}", self.index())
        } else {
            write!(f, "@{}", self.index())
        }
    }
}

impl Fingerprint for Ref {
    fn fingerprint(&self) -> u64 {
        fold_sign(self.0)
    }
}
