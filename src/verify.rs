//! Parse, encode and check in one call.
//!
//! Every call owns its whole pipeline, including a fresh diagram session,
//! so independent verifications may run on different threads.
//!
//! ```
//! use fw_equiv::verify::verify_text;
//!
//! let a = ":INPUT DROP\n-A INPUT -p tcp --dport 22 -j ACCEPT\n";
//! let b = ":INPUT DROP\n-A INPUT -p tcp --dport 23 -j ACCEPT\n";
//! let verdict = verify_text(a, b).unwrap();
//! let d = verdict.divergence().unwrap();
//! assert_ne!(d.left, d.right);
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use log::info;

use crate::budget::SessionConfig;
use crate::checker::{check_with_stats, SessionStats, Verdict};
use crate::encoder::encode;
use crate::error::{EncodeError, Error};
use crate::packet::declare_packet;
use crate::parser::{parse_with, ParserConfig};
use crate::rule::Policy;

/// Check two policies with the default session limits.
pub fn verify(left: &Policy, right: &Policy) -> Result<Verdict, EncodeError> {
    verify_with(left, right, &SessionConfig::default())
}

pub fn verify_with(left: &Policy, right: &Policy, config: &SessionConfig) -> Result<Verdict, EncodeError> {
    Ok(verify_report(left, right, config)?.verdict)
}

/// Parse both texts with the default [`ParserConfig`] and check them.
pub fn verify_text(left: &str, right: &str) -> Result<Verdict, Error> {
    verify_text_with(left, right, &ParserConfig::default(), &SessionConfig::default())
}

pub fn verify_text_with(
    left: &str,
    right: &str,
    parser: &ParserConfig,
    session: &SessionConfig,
) -> Result<Verdict, Error> {
    let left = parse_with(left, parser)?;
    let right = parse_with(right, parser)?;
    Ok(verify_with(&left, &right, session)?)
}

/// Verdict plus what it took to reach it.
#[derive(Debug, Clone)]
pub struct Report {
    pub verdict: Verdict,
    pub left_rules: usize,
    pub right_rules: usize,
    /// Decision nodes of each encoded formula.
    pub left_size: usize,
    pub right_size: usize,
    pub stats: SessionStats,
    pub elapsed: Duration,
}

pub fn verify_report(left: &Policy, right: &Policy, config: &SessionConfig) -> Result<Report, EncodeError> {
    let start = Instant::now();
    let vars = declare_packet();
    let f1 = encode(left, &vars)?;
    let f2 = encode(right, &vars)?;
    let (verdict, stats) = check_with_stats(&f1, &f2, config);
    let elapsed = start.elapsed();
    info!("'{}' vs '{}': {} in {:?}", left.name, right.name, verdict, elapsed);

    Ok(Report {
        verdict,
        left_rules: left.num_rules(),
        right_rules: right.num_rules(),
        left_size: f1.size(),
        right_size: f2.size(),
        stats,
        elapsed,
    })
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "verdict:  {}", self.verdict)?;
        writeln!(f, "rules:    {} vs {}", self.left_rules, self.right_rules)?;
        writeln!(f, "formulas: {} vs {} decision nodes", self.left_size, self.right_size)?;
        writeln!(
            f,
            "diagram:  {} nodes, {} cache hits, {} misses",
            self.stats.nodes, self.stats.cache_hits, self.stats.cache_misses
        )?;
        write!(f, "time:     {:?}", self.elapsed)
    }
}
