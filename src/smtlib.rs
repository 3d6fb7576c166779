//! SMT-LIB 2 (`QF_BV`) rendering of decision formulas.
//!
//! Packet fields become bitvector constants named after
//! [`PacketField::name`]. Each decision node gets its own `define-fun`, so
//! shared subterms are printed once and the script grows linearly with the
//! formula. A decision is a `Bool` that holds when the packet is accepted.
//!
//! ```
//! use fw_equiv::encoder::encode;
//! use fw_equiv::packet::declare_packet;
//! use fw_equiv::parser::parse;
//! use fw_equiv::smtlib::to_smtlib;
//!
//! let policy = parse(":INPUT DROP\n-A INPUT -p tcp --dport 22 -j ACCEPT\n").unwrap();
//! let formula = encode(&policy, &declare_packet()).unwrap();
//! let script = to_smtlib(&formula).unwrap();
//! assert!(script.contains("(declare-const dst_port (_ BitVec 16))"));
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::formula::{Cond, Decision, DecisionFormula, Outcome};
use crate::packet::PacketField;
use crate::rule::{prefix_mask, Predicate};

fn bv(value: u32, width: u32) -> String {
    format!("(_ bv{} {})", value, width)
}

fn predicate_term(predicate: &Predicate) -> String {
    match predicate {
        Predicate::Exact { field, value } => format!("(= {} {})", field, bv(*value, field.width())),
        Predicate::Prefix { len: 0, .. } => "true".to_string(),
        Predicate::Prefix { field, addr, len } => format!(
            "(= (bvand {} {}) {})",
            field,
            bv(prefix_mask(*len), 32),
            bv(*addr, 32)
        ),
        Predicate::Range { field, lo, hi } if lo == hi => format!("(= {} {})", field, bv(*lo, field.width())),
        Predicate::Range { field, lo, hi } => format!(
            "(and (bvule {} {}) (bvule {} {}))",
            bv(*lo, field.width()),
            field,
            field,
            bv(*hi, field.width())
        ),
        Predicate::Masked { field, mask, value } => format!(
            "(= (bvand {} {}) {})",
            field,
            bv(*mask, field.width()),
            bv(*value, field.width())
        ),
        Predicate::AnyOf(alternatives) => match alternatives.as_slice() {
            [] => "false".to_string(),
            [single] => predicate_term(single),
            many => {
                let terms: Vec<String> = many.iter().map(predicate_term).collect();
                format!("(or {})", terms.join(" "))
            }
        },
        Predicate::Not(inner) => format!("(not {})", predicate_term(inner)),
    }
}

fn cond_term(cond: &Cond) -> String {
    match cond {
        Cond::True => "true".to_string(),
        Cond::Test(predicate) => predicate_term(predicate),
        Cond::All(conds) => {
            let terms: Vec<String> = conds.iter().map(|c| cond_term(c)).collect();
            format!("(and {})", terms.join(" "))
        }
    }
}

fn write_declarations(out: &mut String) -> std::fmt::Result {
    writeln!(out, "(set-logic QF_BV)")?;
    for field in PacketField::ALL {
        writeln!(out, "(declare-const {} (_ BitVec {}))", field, field.width())?;
    }
    Ok(())
}

/// Emit one `define-fun` per decision node, names prefixed with `prefix`,
/// and return the term for the root.
fn write_decisions(out: &mut String, formula: &DecisionFormula, prefix: &str) -> Result<String, std::fmt::Error> {
    let mut conds: HashMap<*const Cond, String> = HashMap::new();
    let mut names: HashMap<*const Decision, String> = HashMap::new();
    let mut next = 0;

    for node in formula.postorder() {
        let name = match node {
            Decision::Leaf(Outcome::Accept) => "true".to_string(),
            Decision::Leaf(Outcome::Drop) => "false".to_string(),
            Decision::Ite(cond, then_, else_) => {
                let c = match conds.get(&Arc::as_ptr(cond)) {
                    Some(c) => c.clone(),
                    None => {
                        let c = format!("{}c{}", prefix, conds.len());
                        writeln!(out, "(define-fun {} () Bool {})", c, cond_term(cond))?;
                        conds.insert(Arc::as_ptr(cond), c.clone());
                        c
                    }
                };
                let d = format!("{}d{}", prefix, next);
                next += 1;
                writeln!(
                    out,
                    "(define-fun {} () Bool (ite {} {} {}))",
                    d,
                    c,
                    names[&Arc::as_ptr(then_)],
                    names[&Arc::as_ptr(else_)]
                )?;
                d
            }
        };
        names.insert(node as *const Decision, name);
    }
    Ok(names[&Arc::as_ptr(formula.root())].clone())
}

/// Script defining `accept`, true exactly for the packets the formula accepts.
pub fn to_smtlib(formula: &DecisionFormula) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    write_declarations(&mut out)?;
    let root = write_decisions(&mut out, formula, "")?;
    writeln!(out, "(define-fun accept () Bool {})", root)?;
    Ok(out)
}

/// Script that is satisfiable iff the two formulas differ on some packet;
/// a model is a distinguishing packet.
pub fn equivalence_query(left: &DecisionFormula, right: &DecisionFormula) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    write_declarations(&mut out)?;
    let l = write_decisions(&mut out, left, "l_")?;
    let r = write_decisions(&mut out, right, "r_")?;
    writeln!(out, "(assert (distinct {} {}))", l, r)?;
    writeln!(out, "(check-sat)")?;
    writeln!(out, "(get-model)")?;
    Ok(out)
}
