//! # fw-equiv: packet-filter equivalence via Binary Decision Diagrams
//!
//! **`fw-equiv`** decides whether two iptables-style filtering policies treat
//! every packet the same way, and when they do not, produces a concrete
//! packet on which they disagree.
//!
//! ## How it works
//!
//! 1. The [`parser`] turns iptables-save text into a [`Policy`][crate::rule::Policy]:
//!    named chains of first-match rules over packet header fields.
//! 2. The [`encoder`] inlines the chains into one nested if-then-else
//!    [`DecisionFormula`][crate::formula::DecisionFormula] mapping each packet to
//!    accept or drop.
//! 3. The [`checker`] compiles both formulas into a single [`Bdd`][crate::bdd::Bdd]
//!    session over the bit-blasted packet (see [`packet`]). Diagrams are
//!    **canonical**, so two formulas are equivalent exactly when the diagram of
//!    their exclusive-or is the constant false. Any path through that diagram
//!    is a witness.
//!
//! The [`verify`] module chains the three steps.
//!
//! ## Basic Usage
//!
//! ```rust
//! use fw_equiv::checker::Verdict;
//! use fw_equiv::verify::verify_text;
//!
//! let original = "\
//! *filter
//! :INPUT DROP [0:0]
//! -A INPUT -p tcp --dport 22 -j ACCEPT
//! -A INPUT -p tcp --dport 80 -j ACCEPT
//! COMMIT
//! ";
//! let candidate = "\
//! *filter
//! :INPUT DROP [0:0]
//! -A INPUT -p tcp -m multiport --dports 22,80 -j ACCEPT
//! COMMIT
//! ";
//! assert_eq!(verify_text(original, candidate).unwrap(), Verdict::Equivalent);
//! ```
//!
//! A verification that exceeds its [`SessionConfig`][crate::budget::SessionConfig]
//! (deadline, node limit, or cancellation) yields
//! [`Verdict::Inconclusive`][crate::checker::Verdict::Inconclusive], never `Equivalent`.
//!
//! ## Core Components
//!
//! - **[`bdd`]**: The diagram manager, with hash-consed nodes, complement edges and an ITE cache.
//! - **[`bitvec`]**: Field comparisons (equality, prefix, range, mask) as diagrams.
//! - **[`rule`]**, **[`parser`]**: The policy model and its text format.
//! - **[`formula`]**, **[`encoder`]**: Decision formulas and how policies become one.
//! - **[`checker`]**, **[`verify`]**: Verdicts and witnesses.
//! - **[`smtlib`]**, **[`dot`]**: Export to SMT solvers and Graphviz.

pub mod bdd;
pub mod bitvec;
pub mod budget;
pub mod cache;
pub mod checker;
pub mod dot;
pub mod encoder;
pub mod error;
pub mod formula;
pub mod node;
pub mod packet;
pub mod parser;
pub mod reference;
pub mod rule;
pub mod sat;
pub mod smtlib;
pub mod table;
pub mod utils;
pub mod verify;
