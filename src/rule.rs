//! The rule model: predicates, rules, chains and whole policies.
//!
//! A [`Policy`] is what the parser produces and what the encoder consumes.
//! It can also be assembled by hand, which is how a policy obtained from
//! somewhere other than iptables-save text enters the pipeline:
//!
//! ```
//! use fw_equiv::packet::PacketField;
//! use fw_equiv::rule::{Action, Chain, ChainPolicy, Policy, Predicate, Rule};
//!
//! let ssh = Rule::new(Action::Accept)
//!     .with_predicate(Predicate::exact(PacketField::Protocol, 6).unwrap())
//!     .with_predicate(Predicate::range(PacketField::DestPort, 22, 22).unwrap());
//! let input = Chain::new("INPUT", ChainPolicy::Drop).with_rule(ssh);
//! let policy = Policy::new("candidate", "INPUT").with_chain(input);
//!
//! assert_eq!(policy.num_rules(), 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::error::PredicateError;
use crate::packet::{Packet, PacketField};

/// Protocol names understood by `-p`.
pub const PROTOCOLS: [(&str, u8); 5] = [
    ("icmp", 1),
    ("tcp", 6),
    ("udp", 17),
    ("icmpv6", 58),
    ("ipv6-icmp", 58),
];

/// TCP flag names understood by `--tcp-flags`, with their bit in the flags byte.
pub const TCP_FLAGS: [(&str, u8); 8] = [
    ("FIN", 0x01),
    ("SYN", 0x02),
    ("RST", 0x04),
    ("PSH", 0x08),
    ("ACK", 0x10),
    ("URG", 0x20),
    ("ECE", 0x40),
    ("CWR", 0x80),
];

/// Network mask of a prefix of length `len` (at most 32).
pub fn prefix_mask(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (32 - len as u32)
    }
}

/// A constraint on packet fields.
///
/// Built through the checked constructors, which reject values that do not
/// fit the field, prefixes longer than 32 bits and empty ranges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    Exact { field: PacketField, value: u32 },
    /// `field & prefix_mask(len) == addr`; `addr` has no bits below the prefix.
    Prefix { field: PacketField, addr: u32, len: u8 },
    /// Inclusive on both ends.
    Range { field: PacketField, lo: u32, hi: u32 },
    /// `field & mask == value`.
    Masked { field: PacketField, mask: u32, value: u32 },
    /// Matches when any alternative does.
    AnyOf(Vec<Predicate>),
    /// Matches exactly the packets the inner predicate rejects.
    Not(Box<Predicate>),
}

fn check_fits(field: PacketField, value: u32) -> Result<(), PredicateError> {
    if value > field.max_value() {
        return Err(PredicateError::TooWide { field, value });
    }
    Ok(())
}

impl Predicate {
    pub fn exact(field: PacketField, value: u32) -> Result<Self, PredicateError> {
        check_fits(field, value)?;
        Ok(Predicate::Exact { field, value })
    }

    /// Address prefix. Host bits of `addr` are cleared, so `10.0.0.5/24` and
    /// `10.0.0.0/24` build the same predicate.
    pub fn prefix(field: PacketField, addr: Ipv4Addr, len: u8) -> Result<Self, PredicateError> {
        if !field.is_address() {
            return Err(PredicateError::NotAnAddress(field));
        }
        if len > 32 {
            return Err(PredicateError::PrefixTooLong(len));
        }
        Ok(Predicate::Prefix {
            field,
            addr: u32::from(addr) & prefix_mask(len),
            len,
        })
    }

    pub fn range(field: PacketField, lo: u32, hi: u32) -> Result<Self, PredicateError> {
        check_fits(field, hi)?;
        if lo > hi {
            return Err(PredicateError::EmptyRange { lo, hi });
        }
        Ok(Predicate::Range { field, lo, hi })
    }

    pub fn masked(field: PacketField, mask: u32, value: u32) -> Result<Self, PredicateError> {
        check_fits(field, mask)?;
        if value & !mask != 0 {
            return Err(PredicateError::OutsideMask { mask, value });
        }
        Ok(Predicate::Masked { field, mask, value })
    }

    /// Disjunction; a single alternative is returned unchanged.
    pub fn any_of(mut alternatives: Vec<Predicate>) -> Self {
        if alternatives.len() == 1 {
            return alternatives.remove(0);
        }
        Predicate::AnyOf(alternatives)
    }

    /// Negation; negating a negation returns the inner predicate.
    pub fn negate(predicate: Predicate) -> Self {
        match predicate {
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }

    /// Predicate that no packet satisfies.
    pub fn nothing() -> Self {
        Predicate::AnyOf(Vec::new())
    }

    /// Field constrained by this predicate, `None` for disjunctions over several fields.
    pub fn field(&self) -> Option<PacketField> {
        match self {
            Predicate::Exact { field, .. }
            | Predicate::Prefix { field, .. }
            | Predicate::Range { field, .. }
            | Predicate::Masked { field, .. } => Some(*field),
            Predicate::AnyOf(alternatives) => {
                let first = alternatives.first()?.field()?;
                alternatives
                    .iter()
                    .all(|p| p.field() == Some(first))
                    .then_some(first)
            }
            Predicate::Not(inner) => inner.field(),
        }
    }

    pub fn matches(&self, packet: &Packet) -> bool {
        match self {
            Predicate::Exact { field, value } => packet.get(*field) == *value,
            Predicate::Prefix { field, addr, len } => packet.get(*field) & prefix_mask(*len) == *addr,
            Predicate::Range { field, lo, hi } => (*lo..=*hi).contains(&packet.get(*field)),
            Predicate::Masked { field, mask, value } => packet.get(*field) & mask == *value,
            Predicate::AnyOf(alternatives) => alternatives.iter().any(|p| p.matches(packet)),
            Predicate::Not(inner) => !inner.matches(packet),
        }
    }
}

fn protocol_name(value: u32) -> Option<&'static str> {
    PROTOCOLS
        .iter()
        .find(|(_, number)| *number as u32 == value)
        .map(|(name, _)| *name)
}

/// Comma-separated flag names, `NONE` for an empty set and `ALL` for a full one.
pub fn tcp_flag_names(bits: u32) -> String {
    if bits == 0 {
        return "NONE".to_string();
    }
    if bits == 0xFF {
        return "ALL".to_string();
    }
    TCP_FLAGS
        .iter()
        .filter(|(_, bit)| bits & *bit as u32 != 0)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(",")
}

fn port_flag(field: PacketField) -> &'static str {
    match field {
        PacketField::SourcePort => "--sport",
        _ => "--dport",
    }
}

fn port_list(alternatives: &[Predicate]) -> Option<(PacketField, String)> {
    let field = alternatives.first()?.field()?;
    let items: Option<Vec<String>> = alternatives
        .iter()
        .map(|p| match p {
            Predicate::Exact { field: f, value } if *f == field => Some(value.to_string()),
            Predicate::Range { field: f, lo, hi } if *f == field && lo == hi => Some(lo.to_string()),
            Predicate::Range { field: f, lo, hi } if *f == field => Some(format!("{}:{}", lo, hi)),
            _ => None,
        })
        .collect();
    Some((field, items?.join(",")))
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Exact { field: PacketField::Protocol, value } => match protocol_name(*value) {
                Some(name) => write!(f, "-p {}", name),
                None => write!(f, "-p {}", value),
            },
            Predicate::Exact { field, value } if field.is_address() => {
                write!(f, "{} {}/32", address_flag(*field), Ipv4Addr::from(*value))
            }
            Predicate::Exact { field: PacketField::TcpFlags, value } => {
                write!(f, "--tcp-flags ALL {}", tcp_flag_names(*value))
            }
            Predicate::Exact { field, value } => write!(f, "{} {}", port_flag(*field), value),
            Predicate::Prefix { field, addr, len } => {
                write!(f, "{} {}/{}", address_flag(*field), Ipv4Addr::from(*addr), len)
            }
            Predicate::Range { field, lo, hi } if lo == hi => write!(f, "{} {}", port_flag(*field), lo),
            Predicate::Range { field, lo, hi } => write!(f, "{} {}:{}", port_flag(*field), lo, hi),
            Predicate::Masked { field: PacketField::TcpFlags, mask, value } => {
                write!(f, "--tcp-flags {} {}", tcp_flag_names(*mask), tcp_flag_names(*value))
            }
            Predicate::Masked { field, mask, value } => write!(f, "[{} & {:#x} == {:#x}]", field, mask, value),
            // `-p all` negated.
            Predicate::AnyOf(alternatives) if alternatives.is_empty() => write!(f, "! -p all"),
            Predicate::AnyOf(alternatives) => {
                if let Some((field, list)) = port_list(alternatives) {
                    let flag = if field == PacketField::SourcePort { "--sports" } else { "--dports" };
                    return write!(f, "-m multiport {} {}", flag, list);
                }
                // `--ports` expands to the same list on both port fields.
                let (sources, dests) = alternatives.split_at(alternatives.len() / 2);
                if let (Some((PacketField::SourcePort, s)), Some((PacketField::DestPort, d))) =
                    (port_list(sources), port_list(dests))
                {
                    if s == d {
                        return write!(f, "-m multiport --ports {}", s);
                    }
                }
                let parts: Vec<String> = alternatives.iter().map(|p| p.to_string()).collect();
                write!(f, "[{}]", parts.join(" | "))
            }
            Predicate::Not(inner) => {
                let text = inner.to_string();
                // iptables puts the `!` after the match module.
                match text.strip_prefix("-m multiport ") {
                    Some(rest) => write!(f, "-m multiport ! {}", rest),
                    None => write!(f, "! {}", text),
                }
            }
        }
    }
}

fn address_flag(field: PacketField) -> &'static str {
    match field {
        PacketField::SourceAddr => "-s",
        _ => "-d",
    }
}

/// What happens to a packet matched by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Accept,
    Drop,
    /// Evaluate the named chain, then continue after this rule if it returns.
    Jump(String),
    /// Evaluate the named chain; when it returns, return from this chain too.
    Goto(String),
    /// Leave the current chain.
    Return,
    /// Logging or bookkeeping target; does not decide anything.
    Log(String),
    /// No target at all, the rule only updates counters.
    Count,
}

impl Action {
    /// `false` for rules that leave the verdict to the following rules.
    pub fn affects_outcome(&self) -> bool {
        !matches!(self, Action::Log(_) | Action::Count)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Accept => write!(f, "-j ACCEPT"),
            Action::Drop => write!(f, "-j DROP"),
            Action::Jump(chain) => write!(f, "-j {}", chain),
            Action::Goto(chain) => write!(f, "-g {}", chain),
            Action::Return => write!(f, "-j RETURN"),
            Action::Log(target) => write!(f, "-j {}", target),
            Action::Count => Ok(()),
        }
    }
}

/// Outcome for packets that fall off the end of a chain.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum ChainPolicy {
    #[default]
    Accept,
    Drop,
    /// Back to the calling chain; written `-` by iptables-save.
    Return,
}

impl fmt::Display for ChainPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainPolicy::Accept => write!(f, "ACCEPT"),
            ChainPolicy::Drop => write!(f, "DROP"),
            ChainPolicy::Return => write!(f, "-"),
        }
    }
}

/// One `-A` line: a conjunction of predicates and an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub predicates: Vec<Predicate>,
    pub action: Action,
    pub in_iface: Option<String>,
    pub out_iface: Option<String>,
    /// Match options kept verbatim because they are not part of the packet domain.
    pub options: Vec<String>,
    /// Source line, `0` for rules built in code.
    pub line: usize,
}

impl Rule {
    pub fn new(action: Action) -> Self {
        Self {
            predicates: Vec::new(),
            action,
            in_iface: None,
            out_iface: None,
            options: Vec::new(),
            line: 0,
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    /// A rule without predicates matches everything.
    pub fn matches(&self, packet: &Packet) -> bool {
        self.predicates.iter().all(|p| p.matches(packet))
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(iface) = &self.in_iface {
            parts.push(format!("-i {}", iface));
        }
        if let Some(iface) = &self.out_iface {
            parts.push(format!("-o {}", iface));
        }
        parts.extend(self.predicates.iter().map(|p| p.to_string()));
        parts.extend(self.options.iter().cloned());
        if self.action != Action::Count {
            parts.push(self.action.to_string());
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// A named, ordered rule list; the first matching rule decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub name: String,
    pub policy: ChainPolicy,
    pub rules: Vec<Rule>,
}

impl Chain {
    pub fn new(name: impl Into<String>, policy: ChainPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// One table of an iptables ruleset, rooted at its entry chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub name: String,
    pub table: String,
    pub entry: String,
    chains: Vec<Chain>,
    index: HashMap<String, usize>,
}

impl Policy {
    pub fn new(name: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: "filter".to_string(),
            entry: entry.into(),
            chains: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Add a chain, replacing any chain of the same name.
    pub fn with_chain(mut self, chain: Chain) -> Self {
        match self.index.get(&chain.name) {
            Some(&i) => self.chains[i] = chain,
            None => {
                self.add_chain(chain);
            }
        }
        self
    }

    /// Add a chain unless one of that name exists; returns whether it was added.
    pub fn add_chain(&mut self, chain: Chain) -> bool {
        if self.index.contains_key(&chain.name) {
            return false;
        }
        self.index.insert(chain.name.clone(), self.chains.len());
        self.chains.push(chain);
        true
    }

    pub fn chain(&self, name: &str) -> Option<&Chain> {
        self.index.get(name).map(|&i| &self.chains[i])
    }

    pub fn chain_mut(&mut self, name: &str) -> Option<&mut Chain> {
        self.index.get(name).map(|&i| &mut self.chains[i])
    }

    pub fn entry_chain(&self) -> Option<&Chain> {
        self.chain(&self.entry)
    }

    /// Chains in declaration order.
    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.chains.iter()
    }

    pub fn num_rules(&self) -> usize {
        self.chains.iter().map(|c| c.rules.len()).sum()
    }
}

/// Renders the policy as iptables-save text for its table.
impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "*{}", self.table)?;
        for chain in &self.chains {
            writeln!(f, ":{} {} [0:0]", chain.name, chain.policy)?;
        }
        for chain in &self.chains {
            for rule in &chain.rules {
                let rule = rule.to_string();
                if rule.is_empty() {
                    writeln!(f, "-A {}", chain.name)?;
                } else {
                    writeln!(f, "-A {} {}", chain.name, rule)?;
                }
            }
        }
        writeln!(f, "COMMIT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_prefix_mask() {
        assert_eq!(prefix_mask(0), 0);
        assert_eq!(prefix_mask(8), 0xFF00_0000);
        assert_eq!(prefix_mask(24), 0xFFFF_FF00);
        assert_eq!(prefix_mask(32), u32::MAX);
    }

    #[test]
    fn test_prefix_matches() {
        let p = Predicate::prefix(PacketField::SourceAddr, addr("10.0.0.0"), 24).unwrap();
        let packet = Packet::default();
        assert!(p.matches(&Packet { src: addr("10.0.0.5"), ..packet }));
        assert!(!p.matches(&Packet { src: addr("10.0.1.5"), ..packet }));

        let host = Predicate::prefix(PacketField::SourceAddr, addr("10.0.0.5"), 32).unwrap();
        assert!(host.matches(&Packet { src: addr("10.0.0.5"), ..packet }));
        assert!(!host.matches(&Packet { src: addr("10.0.0.4"), ..packet }));
    }

    #[test]
    fn test_prefix_clears_host_bits() {
        let a = Predicate::prefix(PacketField::DestAddr, addr("10.0.0.5"), 24).unwrap();
        let b = Predicate::prefix(PacketField::DestAddr, addr("10.0.0.0"), 24).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_negation() {
        let net = Predicate::prefix(PacketField::SourceAddr, addr("10.0.0.0"), 8).unwrap();
        let not_net = Predicate::negate(net.clone());
        let packet = Packet::default();
        assert!(!not_net.matches(&Packet { src: addr("10.1.2.3"), ..packet }));
        assert!(not_net.matches(&Packet { src: addr("192.168.0.1"), ..packet }));
        assert_eq!(not_net.field(), Some(PacketField::SourceAddr));
        assert_eq!(not_net.to_string(), "! -s 10.0.0.0/8");
        assert_eq!(Predicate::negate(not_net), net);

        let ports = Predicate::any_of(vec![
            Predicate::range(PacketField::DestPort, 22, 22).unwrap(),
            Predicate::range(PacketField::DestPort, 23, 23).unwrap(),
        ]);
        assert_eq!(Predicate::negate(ports).to_string(), "-m multiport ! --dports 22,23");

        assert!(!Predicate::nothing().matches(&packet));
        assert_eq!(Predicate::nothing().to_string(), "! -p all");
    }

    #[test]
    fn test_invalid_predicates() {
        assert_eq!(
            Predicate::prefix(PacketField::SourceAddr, addr("1.2.3.4"), 33),
            Err(PredicateError::PrefixTooLong(33))
        );
        assert_eq!(
            Predicate::prefix(PacketField::DestPort, addr("1.2.3.4"), 8),
            Err(PredicateError::NotAnAddress(PacketField::DestPort))
        );
        assert_eq!(
            Predicate::range(PacketField::DestPort, 2000, 1000),
            Err(PredicateError::EmptyRange { lo: 2000, hi: 1000 })
        );
        assert_eq!(
            Predicate::exact(PacketField::Protocol, 256),
            Err(PredicateError::TooWide {
                field: PacketField::Protocol,
                value: 256
            })
        );
        assert!(Predicate::masked(PacketField::TcpFlags, 0x02, 0x03).is_err());
    }

    #[test]
    fn test_range_matches() {
        let p = Predicate::range(PacketField::DestPort, 1000, 2000).unwrap();
        for (port, expected) in [(999, false), (1000, true), (1500, true), (2000, true), (2001, false)] {
            let packet = Packet::default().with(PacketField::DestPort, port);
            assert_eq!(p.matches(&packet), expected, "port {}", port);
        }
    }

    #[test]
    fn test_any_of() {
        let p = Predicate::any_of(vec![
            Predicate::range(PacketField::DestPort, 80, 80).unwrap(),
            Predicate::range(PacketField::DestPort, 443, 443).unwrap(),
        ]);
        assert_eq!(p.field(), Some(PacketField::DestPort));
        assert!(p.matches(&Packet::default().with(PacketField::DestPort, 443)));
        assert!(!p.matches(&Packet::default().with(PacketField::DestPort, 8080)));
        assert_eq!(p.to_string(), "-m multiport --dports 80,443");

        let single = Predicate::any_of(vec![Predicate::exact(PacketField::Protocol, 6).unwrap()]);
        assert_eq!(single, Predicate::Exact { field: PacketField::Protocol, value: 6 });
    }

    #[test]
    fn test_predicate_display() {
        let p = Predicate::exact(PacketField::Protocol, 6).unwrap();
        assert_eq!(p.to_string(), "-p tcp");
        let p = Predicate::exact(PacketField::Protocol, 47).unwrap();
        assert_eq!(p.to_string(), "-p 47");
        let p = Predicate::prefix(PacketField::SourceAddr, addr("192.168.1.0"), 24).unwrap();
        assert_eq!(p.to_string(), "-s 192.168.1.0/24");
        let p = Predicate::range(PacketField::SourcePort, 1024, 65535).unwrap();
        assert_eq!(p.to_string(), "--sport 1024:65535");
        let p = Predicate::masked(PacketField::TcpFlags, 0x17, 0x02).unwrap();
        assert_eq!(p.to_string(), "--tcp-flags FIN,SYN,RST,ACK SYN");
    }

    #[test]
    fn test_policy_builder() {
        let mut policy = Policy::new("p", "INPUT")
            .with_chain(Chain::new("INPUT", ChainPolicy::Drop))
            .with_chain(Chain::new("helper", ChainPolicy::Return));
        assert!(!policy.add_chain(Chain::new("INPUT", ChainPolicy::Accept)));
        assert_eq!(policy.entry_chain().map(|c| c.policy), Some(ChainPolicy::Drop));

        policy
            .chain_mut("INPUT")
            .unwrap()
            .rules
            .push(Rule::new(Action::Jump("helper".into())));
        assert_eq!(policy.num_rules(), 1);

        let names: Vec<&str> = policy.chains().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["INPUT", "helper"]);
    }

    #[test]
    fn test_policy_display() {
        let rule = Rule::new(Action::Accept)
            .with_predicate(Predicate::exact(PacketField::Protocol, 6).unwrap())
            .with_predicate(Predicate::range(PacketField::DestPort, 22, 22).unwrap());
        let policy = Policy::new("p", "INPUT")
            .with_chain(Chain::new("INPUT", ChainPolicy::Drop).with_rule(rule))
            .with_chain(Chain::new("empty", ChainPolicy::Return));
        assert_eq!(
            policy.to_string(),
            "*filter\n:INPUT DROP [0:0]\n:empty - [0:0]\n-A INPUT -p tcp --dport 22 -j ACCEPT\nCOMMIT\n"
        );
    }
}
