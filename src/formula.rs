//! Decision formulas: a policy flattened into nested if-then-else over
//! packet conditions.
//!
//! Formulas are plain immutable trees (in fact DAGs, subterms are shared via
//! [`Arc`]), independent of any diagram session. They can be evaluated on a
//! concrete [`Packet`], compiled into a [`Bdd`] or printed for an external
//! solver (see [`smtlib`][crate::smtlib]).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::bdd::Bdd;
use crate::bitvec;
use crate::error::SolverError;
use crate::packet::{Packet, PacketVars};
use crate::reference::Ref;
use crate::rule::Predicate;

/// Result sort of a decision.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Outcome {
    Accept,
    Drop,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Accept => write!(f, "ACCEPT"),
            Outcome::Drop => write!(f, "DROP"),
        }
    }
}

/// Condition of an if-then-else.
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum Cond {
    True,
    Test(Predicate),
    All(Vec<Arc<Cond>>),
}

impl Cond {
    pub fn evaluate(&self, packet: &Packet) -> bool {
        match self {
            Cond::True => true,
            Cond::Test(predicate) => predicate.matches(packet),
            Cond::All(conds) => conds.iter().all(|c| c.evaluate(packet)),
        }
    }
}

#[derive(Debug)]
pub enum Decision {
    Leaf(Outcome),
    Ite(Arc<Cond>, Arc<Decision>, Arc<Decision>),
}

impl Decision {
    pub fn leaf(outcome: Outcome) -> Arc<Decision> {
        Arc::new(Decision::Leaf(outcome))
    }

    /// `if cond then then_ else else_`, folding the trivial cases.
    pub fn ite(cond: Arc<Cond>, then_: Arc<Decision>, else_: Arc<Decision>) -> Arc<Decision> {
        if *cond == Cond::True || Arc::ptr_eq(&then_, &else_) {
            return then_;
        }
        if let (Decision::Leaf(a), Decision::Leaf(b)) = (&*then_, &*else_) {
            if a == b {
                return then_;
            }
        }
        Arc::new(Decision::Ite(cond, then_, else_))
    }
}

/// A total function from packets to [`Outcome`], over a fixed packet layout.
#[derive(Debug, Clone)]
pub struct DecisionFormula {
    root: Arc<Decision>,
    vars: PacketVars,
}

impl DecisionFormula {
    pub fn new(root: Arc<Decision>, vars: PacketVars) -> Self {
        Self { root, vars }
    }

    pub fn root(&self) -> &Arc<Decision> {
        &self.root
    }

    pub fn vars(&self) -> &PacketVars {
        &self.vars
    }

    pub fn evaluate(&self, packet: &Packet) -> Outcome {
        let mut current = &*self.root;
        loop {
            match current {
                Decision::Leaf(outcome) => return *outcome,
                Decision::Ite(cond, then_, else_) => {
                    current = if cond.evaluate(packet) { then_ } else { else_ };
                }
            }
        }
    }

    /// Decision nodes in post-order, each shared node once, root last.
    pub fn postorder(&self) -> Vec<&Decision> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<(&Decision, bool)> = vec![(&*self.root, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            if !seen.insert(node as *const Decision) {
                continue;
            }
            stack.push((node, true));
            if let Decision::Ite(_, then_, else_) = node {
                stack.push((&**else_, false));
                stack.push((&**then_, false));
            }
        }
        order
    }

    /// Number of distinct if-then-else nodes.
    pub fn size(&self) -> usize {
        self.postorder()
            .iter()
            .filter(|d| matches!(d, Decision::Ite(..)))
            .count()
    }

    /// Diagram of the accepted packets.
    pub fn compile(&self, bdd: &Bdd) -> Result<Ref, SolverError> {
        let mut conds: HashMap<*const Cond, Ref> = HashMap::new();
        let mut memo: HashMap<*const Decision, Ref> = HashMap::new();

        for node in self.postorder() {
            let res = match node {
                Decision::Leaf(Outcome::Accept) => bdd.one,
                Decision::Leaf(Outcome::Drop) => bdd.zero,
                Decision::Ite(cond, then_, else_) => {
                    let c = compile_cond(bdd, &self.vars, cond, &mut conds)?;
                    let t = memo[&Arc::as_ptr(then_)];
                    let e = memo[&Arc::as_ptr(else_)];
                    bdd.apply_ite(c, t, e)?
                }
            };
            memo.insert(node as *const Decision, res);
        }

        let res = memo[&Arc::as_ptr(&self.root)];
        debug!("compile: {} decision nodes -> {} diagram nodes", memo.len(), bdd.size(res));
        Ok(res)
    }
}

fn compile_cond(
    bdd: &Bdd,
    vars: &PacketVars,
    cond: &Arc<Cond>,
    memo: &mut HashMap<*const Cond, Ref>,
) -> Result<Ref, SolverError> {
    if let Some(&res) = memo.get(&Arc::as_ptr(cond)) {
        return Ok(res);
    }
    let res = match &**cond {
        Cond::True => bdd.one,
        Cond::Test(predicate) => bitvec::predicate(bdd, vars, predicate)?,
        Cond::All(conds) => {
            let mut res = bdd.one;
            for c in conds {
                let f = compile_cond(bdd, vars, c, memo)?;
                res = bdd.apply_and(res, f)?;
            }
            res
        }
    };
    memo.insert(Arc::as_ptr(cond), res);
    Ok(res)
}
