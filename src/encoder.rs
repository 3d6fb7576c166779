//! Inlining of a [`Policy`] into a single [`DecisionFormula`].
//!
//! A chain is folded from its last rule to its first:
//!
//! ```text
//! eval(C, k) = ite(match(r1), resolve(r1), ite(match(r2), resolve(r2), ... default(C, k)))
//! ```
//!
//! where `k` is what happens when `C` returns to its caller. A jump to chain
//! `N` resolves to `eval(N, rest)`, with `rest` the decision for the rules
//! that follow the jump, so a `RETURN` inside `N` continues right after the
//! jumping rule. Because the first matching rule is the outermost `ite`
//! whose condition holds, the nesting alone yields first-match semantics.
//!
//! Rules that only log or count are left out. Every chain is evaluated at
//! most once per continuation, and identical rule conditions are shared.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use crate::error::EncodeError;
use crate::formula::{Cond, Decision, DecisionFormula, Outcome};
use crate::packet::PacketVars;
use crate::rule::{Action, ChainPolicy, Policy, Predicate, Rule};

/// Build the decision function of `policy`'s entry chain over `vars`.
pub fn encode(policy: &Policy, vars: &PacketVars) -> Result<DecisionFormula, EncodeError> {
    let entry = policy
        .entry_chain()
        .ok_or_else(|| EncodeError::MissingEntry(policy.entry.clone()))?;

    let mut encoder = Encoder::new(policy);
    // Returning from the entry chain applies its own policy.
    let k = match entry.policy {
        ChainPolicy::Drop => encoder.drop.clone(),
        ChainPolicy::Accept | ChainPolicy::Return => encoder.accept.clone(),
    };
    let root = encoder.eval(&entry.name, &k)?;
    let formula = DecisionFormula::new(root, *vars);

    info!(
        "Encoded policy '{}' ({} rules, {} skipped) into {} decision nodes",
        policy.name,
        policy.num_rules(),
        encoder.skipped,
        formula.size()
    );
    Ok(formula)
}

struct Encoder<'p> {
    policy: &'p Policy,
    accept: Arc<Decision>,
    drop: Arc<Decision>,
    always: Arc<Cond>,
    tests: HashMap<&'p Predicate, Arc<Cond>>,
    matches: HashMap<&'p [Predicate], Arc<Cond>>,
    /// `(chain, continuation) -> (continuation, result)`; the continuation is
    /// kept alive so that its address stays unique.
    chains: HashMap<(&'p str, *const Decision), (Arc<Decision>, Arc<Decision>)>,
    /// Chains currently being inlined, outermost first.
    stack: Vec<&'p str>,
    skipped: usize,
}

impl<'p> Encoder<'p> {
    fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            accept: Decision::leaf(Outcome::Accept),
            drop: Decision::leaf(Outcome::Drop),
            always: Arc::new(Cond::True),
            tests: HashMap::new(),
            matches: HashMap::new(),
            chains: HashMap::new(),
            stack: Vec::new(),
            skipped: 0,
        }
    }

    fn eval(&mut self, name: &'p str, k: &Arc<Decision>) -> Result<Arc<Decision>, EncodeError> {
        if let Some(pos) = self.stack.iter().position(|&c| c == name) {
            let mut path: Vec<String> = self.stack[pos..].iter().map(|c| c.to_string()).collect();
            path.push(name.to_string());
            return Err(EncodeError::Cycle(path));
        }

        let key = (name, Arc::as_ptr(k));
        if let Some((_, res)) = self.chains.get(&key) {
            return Ok(res.clone());
        }

        let chain = match self.stack.last() {
            None => self.policy.chain(name).ok_or_else(|| EncodeError::MissingEntry(name.to_string()))?,
            Some(&from) => self.policy.chain(name).ok_or_else(|| EncodeError::UnresolvedChain {
                from: from.to_string(),
                target: name.to_string(),
            })?,
        };
        debug!("Inlining chain '{}' ({} rules)", name, chain.rules.len());

        self.stack.push(name);
        let mut acc = match chain.policy {
            ChainPolicy::Accept => self.accept.clone(),
            ChainPolicy::Drop => self.drop.clone(),
            ChainPolicy::Return => k.clone(),
        };
        self.skipped += chain.rules.iter().filter(|r| !r.action.affects_outcome()).count();
        for rule in chain.rules.iter().rev().filter(|r| r.action.affects_outcome()) {
            let then_ = match &rule.action {
                Action::Accept => self.accept.clone(),
                Action::Drop => self.drop.clone(),
                Action::Return => k.clone(),
                Action::Jump(target) => self.eval(target, &acc)?,
                Action::Goto(target) => self.eval(target, k)?,
                Action::Log(_) | Action::Count => continue,
            };
            let cond = self.rule_cond(rule);
            acc = Decision::ite(cond, then_, acc);
        }
        self.stack.pop();

        self.chains.insert(key, (k.clone(), acc.clone()));
        Ok(acc)
    }

    /// Conjunction of the rule's predicates; `true` for a rule without any.
    fn rule_cond(&mut self, rule: &'p Rule) -> Arc<Cond> {
        if let Some(cond) = self.matches.get(rule.predicates.as_slice()) {
            return cond.clone();
        }
        let cond = match rule.predicates.as_slice() {
            [] => self.always.clone(),
            [single] => self.test(single),
            many => Arc::new(Cond::All(many.iter().map(|p| self.test(p)).collect())),
        };
        self.matches.insert(rule.predicates.as_slice(), cond.clone());
        cond
    }

    fn test(&mut self, predicate: &'p Predicate) -> Arc<Cond> {
        self.tests
            .entry(predicate)
            .or_insert_with(|| Arc::new(Cond::Test(predicate.clone())))
            .clone()
    }
}
