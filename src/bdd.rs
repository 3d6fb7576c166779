//! # Decision-diagram manager
//!
//! [`Bdd`] owns every node of a session. Functions are handed around as
//! [`Ref`] handles; two handles are equal iff they denote the same boolean
//! function (for the fixed variable order). That canonicity turns the
//! equivalence query of the checker into a pointer comparison.
//!
//! Variables are numbered from `1`; a smaller number sits closer to the root.
//!
//! All constructors return `Result`, since every new node is charged against
//! the session [`Budget`]: a query that outgrows its node limit or deadline
//! fails with a [`SolverError`] instead of running unbounded.
//!
//! ```
//! use fw_equiv::bdd::Bdd;
//!
//! let bdd = Bdd::default();
//! let x1 = bdd.mk_var(1).unwrap();
//! let x2 = bdd.mk_var(2).unwrap();
//! let f = bdd.apply_and(x1, -x2).unwrap();
//! let g = -bdd.apply_or(-x1, x2).unwrap();
//! assert_eq!(f, g); // De Morgan
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::Debug;

use log::debug;

use crate::budget::{Budget, SessionConfig};
use crate::cache::Cache;
use crate::error::SolverError;
use crate::node::Node;
use crate::reference::Ref;
use crate::table::UniqueTable;
use crate::utils::{triple, Fingerprint};

/// Key of the computed table: a normalized ITE triple.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct IteKey(Ref, Ref, Ref);

impl Fingerprint for IteKey {
    fn fingerprint(&self) -> u64 {
        triple(
            self.0.fingerprint(),
            self.1.fingerprint(),
            self.2.fingerprint(),
        )
    }
}

pub struct Bdd {
    table: RefCell<UniqueTable>,
    cache: RefCell<Cache<IteKey, Ref>>,
    budget: Budget,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    /// Table sizes above [`SessionConfig::MAX_BITS`] are clamped.
    pub fn new(config: &SessionConfig) -> Self {
        let one = Ref::positive(1);
        let table_bits = config.table_bits.min(SessionConfig::MAX_BITS);
        let cache_bits = config.cache_bits.min(SessionConfig::MAX_BITS);
        Self {
            table: RefCell::new(UniqueTable::new(table_bits)),
            cache: RefCell::new(Cache::new(cache_bits)),
            budget: Budget::new(config),
            zero: -one,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(&SessionConfig::default())
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table.borrow();
        let cache = self.cache.borrow();
        f.debug_struct("Bdd")
            .field("nodes", &table.len())
            .field("buckets", &table.num_buckets())
            .field("cache_hits", &cache.hits())
            .field("cache_misses", &cache.misses())
            .finish()
    }
}

impl Bdd {
    /// Number of nodes stored in this session, terminal included.
    pub fn num_nodes(&self) -> usize {
        self.table.borrow().len()
    }

    pub fn cache_hits(&self) -> usize {
        self.cache.borrow().hits()
    }

    pub fn cache_misses(&self) -> usize {
        self.cache.borrow().misses()
    }

    fn node(&self, f: Ref) -> Node {
        *self.table.borrow().node(f.index())
    }

    /// Decision variable at the root of `f`, `0` for constants.
    pub fn variable(&self, f: Ref) -> u32 {
        self.node(f).variable
    }

    /// Like [`variable`][Self::variable], but constants sort below everything.
    fn level(&self, f: Ref) -> u32 {
        match self.variable(f) {
            0 => u32::MAX,
            v => v,
        }
    }

    pub fn low_node(&self, f: Ref) -> Ref {
        let low = self.node(f).low;
        if f.is_negated() {
            -low
        } else {
            low
        }
    }

    pub fn high_node(&self, f: Ref) -> Ref {
        let high = self.node(f).high;
        if f.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, f: Ref) -> bool {
        f == self.zero
    }

    pub fn is_one(&self, f: Ref) -> bool {
        f == self.one
    }

    pub fn is_terminal(&self, f: Ref) -> bool {
        f.index() == 1
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Result<Ref, SolverError> {
        assert_ne!(v, 0, "Variable index should not be zero");

        if low == high {
            return Ok(low);
        }

        // Canonical form: the high edge is never complemented.
        if high.is_negated() {
            return Ok(-self.mk_node(v, -low, -high)?);
        }

        let node = Node {
            variable: v,
            low,
            high,
        };
        if let Some(i) = self.table.borrow().lookup(&node) {
            return Ok(Ref::positive(i as u32));
        }

        let live = self.num_nodes();
        self.budget.charge_node(live)?;
        let i = self.table.borrow_mut().insert(node);
        Ok(Ref::positive(i as u32))
    }

    pub fn mk_var(&self, v: u32) -> Result<Ref, SolverError> {
        self.mk_node(v, self.zero, self.one)
    }

    /// Conjunction of literals `(variable, polarity)`, in any order.
    pub fn cube(&self, literals: impl IntoIterator<Item = (u32, bool)>) -> Result<Ref, SolverError> {
        let mut literals: Vec<(u32, bool)> = literals.into_iter().collect();
        // Build bottom-up: deepest variable first.
        literals.sort_by(|a, b| b.0.cmp(&a.0));
        literals.dedup();

        let mut current = self.one;
        for (v, polarity) in literals {
            current = if polarity {
                self.mk_node(v, self.zero, current)?
            } else {
                self.mk_node(v, current, self.zero)?
            };
        }
        Ok(current)
    }

    /// Cofactors of `f` with respect to `v`, which must not lie below the root of `f`.
    pub fn top_cofactors(&self, f: Ref, v: u32) -> (Ref, Ref) {
        if self.level(f) > v {
            return (f, f);
        }
        debug_assert_eq!(self.variable(f), v);
        (self.low_node(f), self.high_node(f))
    }

    /// If-then-else, `(f ∧ g) ∨ (¬f ∧ h)`, the single primitive every
    /// other connective is expressed with.
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Result<Ref, SolverError> {
        self.budget.tick()?;

        // Terminal cases.
        if self.is_one(f) || g == h {
            return Ok(g);
        }
        if self.is_zero(f) {
            return Ok(h);
        }
        if self.is_one(g) && self.is_zero(h) {
            return Ok(f);
        }
        if self.is_zero(g) && self.is_one(h) {
            return Ok(-f);
        }

        // Replace arguments that repeat `f` by constants:
        //   ite(F,F,H) = ite(F,1,H), ite(F,~F,H) = ite(F,0,H)
        //   ite(F,G,F) = ite(F,G,0), ite(F,G,~F) = ite(F,G,1)
        let g = if g == f {
            self.one
        } else if g == -f {
            self.zero
        } else {
            g
        };
        let h = if h == f {
            self.zero
        } else if h == -f {
            self.one
        } else {
            h
        };
        if g == h {
            return Ok(g);
        }
        if self.is_one(g) && self.is_zero(h) {
            return Ok(f);
        }
        if self.is_zero(g) && self.is_one(h) {
            return Ok(-f);
        }

        // Normalize complement bits so that equal calls share a cache entry:
        //   ite(~F,G,H) = ite(F,H,G), ite(F,~G,H) = ~ite(F,G,~H)
        let (f, g, h) = if f.is_negated() { (-f, h, g) } else { (f, g, h) };
        let (g, h, negate) = if g.is_negated() { (-g, -h, true) } else { (g, h, false) };

        let key = IteKey(f, g, h);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return Ok(if negate { -res } else { res });
        }

        let m = self.level(f).min(self.level(g)).min(self.level(h));
        debug_assert_ne!(m, u32::MAX);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0)?;
        let t = self.apply_ite(f1, g1, h1)?;
        let res = self.mk_node(m, e, t)?;

        self.cache.borrow_mut().insert(key, res);
        Ok(if negate { -res } else { res })
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Result<Ref, SolverError> {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Result<Ref, SolverError> {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Result<Ref, SolverError> {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Result<Ref, SolverError> {
        self.apply_ite(u, v, -v)
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Result<Ref, SolverError> {
        let mut res = self.one;
        for node in nodes {
            res = self.apply_and(res, node)?;
            if self.is_zero(res) {
                break;
            }
        }
        Ok(res)
    }

    pub fn apply_or_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Result<Ref, SolverError> {
        let mut res = self.zero;
        for node in nodes {
            res = self.apply_or(res, node)?;
            if self.is_one(res) {
                break;
            }
        }
        Ok(res)
    }

    /// Value of `f` under a total assignment.
    pub fn eval(&self, f: Ref, assignment: impl Fn(u32) -> bool) -> bool {
        let mut current = f;
        while !self.is_terminal(current) {
            let v = self.variable(current);
            current = if assignment(v) {
                self.high_node(current)
            } else {
                self.low_node(current)
            };
        }
        self.is_one(current)
    }

    /// Indices of all nodes reachable from `nodes`, terminal included.
    pub fn descendants(&self, nodes: impl IntoIterator<Item = Ref>) -> HashSet<usize> {
        let mut visited = HashSet::new();
        let mut stack: Vec<Ref> = nodes.into_iter().collect();
        while let Some(f) = stack.pop() {
            if visited.insert(f.index()) && !self.is_terminal(f) {
                let node = self.node(f);
                stack.push(node.low);
                stack.push(node.high);
            }
        }
        visited
    }

    /// Number of nodes in the diagram of `f`, terminal included.
    pub fn size(&self, f: Ref) -> usize {
        let size = self.descendants([f]).len();
        debug!("size({}) = {}", f, size);
        size
    }

    pub fn to_bracket_string(&self, f: Ref) -> String {
        if self.is_zero(f) {
            return "(0)".to_string();
        } else if self.is_one(f) {
            return "(1)".to_string();
        }
        format!(
            "{}:(x{}, {}, {})",
            f,
            self.variable(f),
            self.to_bracket_string(self.high_node(f)),
            self.to_bracket_string(self.low_node(f))
        )
    }
}
