//! Error types.
//!
//! Each stage of the pipeline has its own error: [`ParseError`] for the
//! policy text, [`EncodeError`] for chain inlining and [`SolverError`] for
//! an exhausted decision-diagram session. [`Error`] wraps the first two for
//! callers that go straight from text to a verdict; solver failures are never
//! errors at that level but an [`Inconclusive`][crate::checker::Verdict::Inconclusive] verdict.

use std::fmt;

use crate::packet::PacketField;

/// An invalid [`Predicate`][crate::rule::Predicate].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateError {
    /// Value does not fit into the field.
    TooWide { field: PacketField, value: u32 },
    /// Prefix length above 32.
    PrefixTooLong(u8),
    /// Prefix match on a field that is not an address.
    NotAnAddress(PacketField),
    /// Range with `lo > hi`.
    EmptyRange { lo: u32, hi: u32 },
    /// Masked match whose value has bits outside the mask.
    OutsideMask { mask: u32, value: u32 },
}

impl fmt::Display for PredicateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateError::TooWide { field, value } => {
                write!(f, "value {} does not fit into {}-bit field {}", value, field.width(), field)
            }
            PredicateError::PrefixTooLong(len) => write!(f, "prefix length {} exceeds 32", len),
            PredicateError::NotAnAddress(field) => write!(f, "field {} is not an address", field),
            PredicateError::EmptyRange { lo, hi } => write!(f, "range {}:{} is empty", lo, hi),
            PredicateError::OutsideMask { mask, value } => {
                write!(f, "value {:#x} has bits outside mask {:#x}", value, mask)
            }
        }
    }
}

impl std::error::Error for PredicateError {}

/// What went wrong on a policy line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A numeric literal (port, protocol number, prefix length) failed to parse.
    BadNumber(String),
    /// Malformed IPv4 address, including more than four parts.
    BadAddress(String),
    /// Prefix length or dotted mask that is not a number or not contiguous.
    BadPrefix(String),
    /// Port range with `lo > hi` or similar.
    BadRange(String),
    UnknownProtocol(String),
    UnknownTcpFlag(String),
    /// `-A` or `-j` naming a chain that was never declared.
    UnknownChain(String),
    /// Chain default policy other than `ACCEPT`, `DROP` or `-`.
    UnknownPolicy(String),
    DuplicateChain(String),
    /// A flag that requires an argument was the last token.
    MissingValue(String),
    InvalidPredicate(PredicateError),
    /// A line that is neither a table, chain, rule, `COMMIT` nor comment.
    UnexpectedLine,
    /// The configured entry chain is not declared in the modelled table.
    MissingEntryChain(String),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::BadNumber(s) => write!(f, "malformed number '{}'", s),
            ParseErrorKind::BadAddress(s) => write!(f, "malformed address '{}'", s),
            ParseErrorKind::BadPrefix(s) => write!(f, "malformed prefix '{}'", s),
            ParseErrorKind::BadRange(s) => write!(f, "malformed range '{}'", s),
            ParseErrorKind::UnknownProtocol(s) => write!(f, "unknown protocol '{}'", s),
            ParseErrorKind::UnknownTcpFlag(s) => write!(f, "unknown TCP flag '{}'", s),
            ParseErrorKind::UnknownChain(s) => write!(f, "undeclared chain '{}'", s),
            ParseErrorKind::UnknownPolicy(s) => write!(f, "unknown chain policy '{}'", s),
            ParseErrorKind::DuplicateChain(s) => write!(f, "chain '{}' declared twice", s),
            ParseErrorKind::MissingValue(s) => write!(f, "option '{}' requires a value", s),
            ParseErrorKind::InvalidPredicate(e) => write!(f, "{}", e),
            ParseErrorKind::UnexpectedLine => write!(f, "unexpected line"),
            ParseErrorKind::MissingEntryChain(s) => write!(f, "entry chain '{}' is not declared", s),
        }
    }
}

/// A policy text that could not be turned into a [`Policy`][crate::rule::Policy].
///
/// `line` is 1-based; `0` refers to the end of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub text: String,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: usize, text: impl Into<String>, kind: ParseErrorKind) -> Self {
        Self {
            line,
            text: text.into(),
            kind,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "at end of input: {}", self.kind)
        } else {
            write!(f, "line {}: {} in '{}'", self.line, self.kind, self.text)
        }
    }
}

impl std::error::Error for ParseError {}

/// Failure to inline the chains of a policy into one decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Chain jumps form a cycle; the path starts and ends with the same chain.
    Cycle(Vec<String>),
    /// A jump to a chain the policy does not contain.
    UnresolvedChain { from: String, target: String },
    /// The policy's entry chain does not exist.
    MissingEntry(String),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::Cycle(path) => write!(f, "chain cycle: {}", path.join(" -> ")),
            EncodeError::UnresolvedChain { from, target } => {
                write!(f, "chain '{}' jumps to unknown chain '{}'", from, target)
            }
            EncodeError::MissingEntry(name) => write!(f, "entry chain '{}' not found", name),
        }
    }
}

impl std::error::Error for EncodeError {}

/// A decision-diagram session that could not finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// The deadline passed.
    Timeout,
    /// The unique table reached its node limit.
    NodeLimit(usize),
    /// The session's cancellation flag was raised.
    Cancelled,
    /// The witness disagrees with the diagram it was read from.
    Inconsistent(String),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::Timeout => write!(f, "solver timed out"),
            SolverError::NodeLimit(n) => write!(f, "solver exceeded the limit of {} nodes", n),
            SolverError::Cancelled => write!(f, "solver session cancelled"),
            SolverError::Inconsistent(msg) => write!(f, "inconsistent solver state: {}", msg),
        }
    }
}

impl std::error::Error for SolverError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Parse(ParseError),
    Encode(EncodeError),
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Self {
        Error::Encode(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "parse error: {}", e),
            Error::Encode(e) => write!(f, "encode error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Parse(e) => Some(e),
            Error::Encode(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let e = ParseError::new(3, "-A INPUT -p foo", ParseErrorKind::UnknownProtocol("foo".into()));
        assert_eq!(e.to_string(), "line 3: unknown protocol 'foo' in '-A INPUT -p foo'");

        let e = ParseError::new(0, "", ParseErrorKind::MissingEntryChain("INPUT".into()));
        assert_eq!(e.to_string(), "at end of input: entry chain 'INPUT' is not declared");
    }

    #[test]
    fn test_cycle_display() {
        let e = EncodeError::Cycle(vec!["A".into(), "B".into(), "A".into()]);
        assert_eq!(e.to_string(), "chain cycle: A -> B -> A");
    }

    #[test]
    fn test_error_source() {
        use std::error::Error as _;
        let e: Error = EncodeError::MissingEntry("INPUT".into()).into();
        assert!(e.source().is_some());
    }
}
