//! Equivalence of two decision formulas.
//!
//! Both formulas are compiled into one diagram session. Since the diagrams
//! are canonical, the formulas agree on every packet exactly when the miter
//! `left XOR right` is the constant false; otherwise any path of the miter
//! is a packet on which they disagree.

use std::fmt;

use log::{debug, info, warn};
use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::budget::SessionConfig;
use crate::error::SolverError;
use crate::formula::{DecisionFormula, Outcome};
use crate::packet::Packet;

/// A packet that two formulas decide differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub witness: Packet,
    /// Decision of the first formula on the witness.
    pub left: Outcome,
    /// Decision of the second formula on the witness.
    pub right: Outcome,
    /// Number of packets the formulas disagree on.
    pub count: BigUint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Equivalent,
    Divergent(Divergence),
    /// The session ran out of budget or was cancelled; nothing is known.
    Inconclusive(SolverError),
}

impl Verdict {
    pub fn is_equivalent(&self) -> bool {
        matches!(self, Verdict::Equivalent)
    }

    pub fn is_divergent(&self) -> bool {
        matches!(self, Verdict::Divergent(_))
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(self, Verdict::Inconclusive(_))
    }

    pub fn divergence(&self) -> Option<&Divergence> {
        match self {
            Verdict::Divergent(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Equivalent => write!(f, "equivalent"),
            Verdict::Divergent(d) => write!(
                f,
                "divergent on {} packets, e.g. {} (left {}, right {})",
                d.count, d.witness, d.left, d.right
            ),
            Verdict::Inconclusive(e) => write!(f, "inconclusive: {}", e),
        }
    }
}

/// Size and cache statistics of a finished session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub nodes: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

impl SessionStats {
    fn of(bdd: &Bdd) -> Self {
        Self {
            nodes: bdd.num_nodes(),
            cache_hits: bdd.cache_hits(),
            cache_misses: bdd.cache_misses(),
        }
    }
}

/// Decide whether `left` and `right` agree on every packet.
pub fn check(left: &DecisionFormula, right: &DecisionFormula, config: &SessionConfig) -> Verdict {
    check_with_stats(left, right, config).0
}

pub fn check_with_stats(left: &DecisionFormula, right: &DecisionFormula, config: &SessionConfig) -> (Verdict, SessionStats) {
    let bdd = Bdd::new(config);
    let verdict = match decide(&bdd, left, right) {
        Ok(None) => Verdict::Equivalent,
        Ok(Some(divergence)) => Verdict::Divergent(divergence),
        Err(e) => {
            warn!("Equivalence check inconclusive: {}", e);
            Verdict::Inconclusive(e)
        }
    };
    let stats = SessionStats::of(&bdd);
    debug!("Session finished: {:?}", stats);
    (verdict, stats)
}

fn decide(bdd: &Bdd, left: &DecisionFormula, right: &DecisionFormula) -> Result<Option<Divergence>, SolverError> {
    if left.vars() != right.vars() {
        return Err(SolverError::Inconsistent("formulas use different packet layouts".to_string()));
    }
    let vars = left.vars();

    let a = left.compile(bdd)?;
    let b = right.compile(bdd)?;
    let miter = bdd.apply_xor(a, b)?;
    if bdd.is_zero(miter) {
        info!("Formulas are equivalent ({} diagram nodes)", bdd.num_nodes());
        return Ok(None);
    }

    let path = bdd
        .one_sat(miter)
        .ok_or_else(|| SolverError::Inconsistent("non-zero miter without a path".to_string()))?;
    let witness = Packet::from_bits(vars, &path);
    let left_outcome = left.evaluate(&witness);
    let right_outcome = right.evaluate(&witness);

    let accepts = |f| bdd.eval(f, |v| vars.value_of(&witness, v));
    if left_outcome == right_outcome
        || accepts(a) != (left_outcome == Outcome::Accept)
        || accepts(b) != (right_outcome == Outcome::Accept)
    {
        return Err(SolverError::Inconsistent(format!(
            "witness {} does not separate the formulas",
            witness
        )));
    }

    let count = bdd.sat_count(miter, vars.num_vars());
    info!("Formulas diverge on {} packets, e.g. {}", count, witness);
    Ok(Some(Divergence {
        witness,
        left: left_outcome,
        right: right_outcome,
        count,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    use test_log::test;

    use super::*;
    use crate::encoder::encode;
    use crate::packet::{declare_packet, PacketField};
    use crate::parser::parse;

    fn formula(text: &str) -> DecisionFormula {
        encode(&parse(text).unwrap(), &declare_packet()).unwrap()
    }

    #[test]
    fn test_reflexive() {
        let f = formula(":INPUT DROP\n-A INPUT -p tcp --dport 22 -j ACCEPT\n-A INPUT -s 10.0.0.0/8 -j ACCEPT\n");
        assert_eq!(check(&f, &f, &SessionConfig::default()), Verdict::Equivalent);
    }

    #[test]
    fn test_reordered_disjoint_rules_are_equivalent() {
        let f = formula(":INPUT DROP\n-A INPUT -p tcp -j ACCEPT\n-A INPUT -p udp -j ACCEPT\n");
        let g = formula(":INPUT DROP\n-A INPUT -p udp -j ACCEPT\n-A INPUT -p tcp -j ACCEPT\n");
        assert!(check(&f, &g, &SessionConfig::default()).is_equivalent());
    }

    #[test]
    fn test_divergent_witness() {
        let f = formula(":INPUT DROP\n-A INPUT -p tcp --dport 22 -j ACCEPT\n");
        let g = formula(":INPUT DROP\n-A INPUT -p tcp --dport 23 -j ACCEPT\n");
        let verdict = check(&f, &g, &SessionConfig::default());
        let d = verdict.divergence().expect("policies differ");

        assert_ne!(d.left, d.right);
        assert_eq!(f.evaluate(&d.witness), d.left);
        assert_eq!(g.evaluate(&d.witness), d.right);
        assert_eq!(d.witness.proto, 6);
        assert!(d.witness.dport == 22 || d.witness.dport == 23);
        // Unconstrained fields stay zero.
        assert_eq!(d.witness.get(PacketField::SourceAddr), 0);
        assert_eq!(d.count, BigUint::from(2u32) << 88);
    }

    #[test]
    fn test_shadowed_rule_is_irrelevant() {
        let f = formula(":INPUT DROP\n-A INPUT -p tcp -j ACCEPT\n-A INPUT -p tcp --dport 22 -j DROP\n");
        let g = formula(":INPUT DROP\n-A INPUT -p tcp -j ACCEPT\n");
        assert!(check(&f, &g, &SessionConfig::default()).is_equivalent());

        let h = formula(":INPUT DROP\n-A INPUT -p tcp --dport 22 -j DROP\n-A INPUT -p tcp -j ACCEPT\n");
        assert!(check(&f, &h, &SessionConfig::default()).is_divergent());
    }

    #[test]
    fn test_budget_exhaustion_is_inconclusive() {
        let f = formula(":INPUT DROP\n-A INPUT -s 10.0.0.0/8 -p tcp --dport 1000:2000 -j ACCEPT\n");
        let g = formula(":INPUT DROP\n-A INPUT -s 10.0.0.0/8 -p tcp --dport 1000:2001 -j ACCEPT\n");

        let config = SessionConfig::default().with_max_nodes(16);
        assert_eq!(check(&f, &g, &config), Verdict::Inconclusive(SolverError::NodeLimit(16)));

        let config = SessionConfig::default().with_timeout(Duration::ZERO);
        assert_eq!(check(&f, &g, &config), Verdict::Inconclusive(SolverError::Timeout));

        let cancel = Arc::new(AtomicBool::new(true));
        let config = SessionConfig::default().with_cancel_flag(cancel);
        assert_eq!(check(&f, &g, &config), Verdict::Inconclusive(SolverError::Cancelled));
    }

    #[test]
    fn test_oversized_tables_do_not_panic() {
        let f = formula(":INPUT DROP\n-A INPUT -p tcp -j ACCEPT\n");
        let config = SessionConfig::default().with_cache_bits(30).with_table_bits(30);
        assert_eq!(check(&f, &f, &config), Verdict::Equivalent);

        // Fields set directly bypass the builders.
        let mut config = SessionConfig::default();
        config.cache_bits = 40;
        config.table_bits = 40;
        assert_eq!(check(&f, &f, &config), Verdict::Equivalent);
    }

    #[test]
    fn test_stats() {
        let f = formula(":INPUT DROP\n-A INPUT -p tcp -j ACCEPT\n");
        let (verdict, stats) = check_with_stats(&f, &f, &SessionConfig::default());
        assert!(verdict.is_equivalent());
        // Terminal plus the 8 protocol bits.
        assert_eq!(stats.nodes, 9);
    }
}
