//! Parser for iptables-save text.
//!
//! Only one table is modelled (by default `filter`); lines that belong to
//! other tables are skipped. Chains are collected before rules, so a jump may
//! name a chain declared further down.
//!
//! ```
//! use fw_equiv::parser::parse;
//! use fw_equiv::rule::{Action, ChainPolicy};
//!
//! let text = "\
//! *filter
//! :INPUT DROP [0:0]
//! -A INPUT -p tcp --dport 22 -j ACCEPT
//! COMMIT
//! ";
//! let policy = parse(text).unwrap();
//! let input = policy.entry_chain().unwrap();
//! assert_eq!(input.policy, ChainPolicy::Drop);
//! assert_eq!(input.rules[0].action, Action::Accept);
//! ```

use std::net::Ipv4Addr;

use log::{debug, info, warn};

use crate::error::{ParseError, ParseErrorKind};
use crate::packet::PacketField;
use crate::rule::{prefix_mask, Action, Chain, ChainPolicy, Policy, Predicate, Rule, PROTOCOLS, TCP_FLAGS};

/// Targets whose rules only log or do bookkeeping, and therefore never
/// change the accept/drop outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipList {
    /// Targets matched by exact name.
    pub targets: Vec<String>,
    /// Targets matched when their name contains one of these.
    pub substrings: Vec<String>,
}

impl Default for SkipList {
    fn default() -> Self {
        Self {
            targets: ["LOG", "NFLOG", "ULOG", "LOGGING", "LOGGING_FORWARD"]
                .into_iter()
                .map(String::from)
                .collect(),
            substrings: [
                "ufw-logging",
                "ufw-track",
                "ufw-before-logging",
                "ufw-after-logging",
                "ufw-skip-to-policy",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl SkipList {
    /// A list that skips nothing.
    pub fn empty() -> Self {
        Self {
            targets: Vec::new(),
            substrings: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    pub fn with_substring(mut self, substring: impl Into<String>) -> Self {
        self.substrings.push(substring.into());
        self
    }

    pub fn is_skipped(&self, target: &str) -> bool {
        self.targets.iter().any(|t| t == target) || self.substrings.iter().any(|s| target.contains(s.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Table to model.
    pub table: String,
    /// Chain every packet enters through.
    pub entry_chain: String,
    /// Name given to the resulting policy.
    pub name: String,
    pub skip: SkipList,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            table: "filter".to_string(),
            entry_chain: "INPUT".to_string(),
            name: "policy".to_string(),
            skip: SkipList::default(),
        }
    }
}

impl ParserConfig {
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_entry_chain(mut self, chain: impl Into<String>) -> Self {
        self.entry_chain = chain.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_skip_list(mut self, skip: SkipList) -> Self {
        self.skip = skip;
        self
    }
}

/// Parse iptables-save text with the default [`ParserConfig`].
pub fn parse(text: &str) -> Result<Policy, ParseError> {
    parse_with(text, &ParserConfig::default())
}

pub fn parse_with(text: &str, config: &ParserConfig) -> Result<Policy, ParseError> {
    let lines = table_lines(text, &config.table);

    let mut policy = Policy::new(config.name.clone(), config.entry_chain.clone()).with_table(config.table.clone());

    for &(number, line) in &lines {
        if let Some(declaration) = line.strip_prefix(':') {
            let chain = parse_chain(declaration).map_err(|kind| ParseError::new(number, line, kind))?;
            let name = chain.name.clone();
            if !policy.add_chain(chain) {
                return Err(ParseError::new(number, line, ParseErrorKind::DuplicateChain(name)));
            }
        }
    }

    for &(number, line) in &lines {
        if line.starts_with(':') {
            continue;
        }
        let (chain, rule) = parse_rule_line(line, &policy, &config.skip).map_err(|kind| ParseError::new(number, line, kind))?;
        let rule = rule.with_line(number);
        debug!("line {}: {} {}", number, chain, rule);
        if let Some(chain) = policy.chain_mut(&chain) {
            chain.rules.push(rule);
        }
    }

    if policy.entry_chain().is_none() {
        return Err(ParseError::new(
            0,
            "",
            ParseErrorKind::MissingEntryChain(config.entry_chain.clone()),
        ));
    }

    info!(
        "Parsed policy '{}': {} chains, {} rules",
        policy.name,
        policy.chains().count(),
        policy.num_rules()
    );
    Ok(policy)
}

/// Numbered, trimmed lines that belong to `table`, without comments, blank
/// lines and table markers. Text before the first `*` line counts as `table`.
fn table_lines<'a>(text: &'a str, table: &str) -> Vec<(usize, &'a str)> {
    let mut current: Option<&str> = None;
    let mut lines = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let number = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('*') {
            current = Some(name.trim());
            continue;
        }
        if line == "COMMIT" {
            current = None;
            continue;
        }
        match current {
            Some(name) if name != table => debug!("Skipping line {} of table '{}'", number, name),
            _ => lines.push((number, line)),
        }
    }
    lines
}

/// `NAME [POLICY] [packets:bytes]`, without the leading colon.
fn parse_chain(declaration: &str) -> Result<Chain, ParseErrorKind> {
    let mut parts = declaration.split_whitespace();
    let name = parts.next().ok_or(ParseErrorKind::UnexpectedLine)?;
    let policy = match parts.next() {
        None => ChainPolicy::Accept,
        Some(token) if token.starts_with('[') => ChainPolicy::Accept,
        Some("ACCEPT") => ChainPolicy::Accept,
        Some("DROP") => ChainPolicy::Drop,
        Some("-") => ChainPolicy::Return,
        Some(other) => return Err(ParseErrorKind::UnknownPolicy(other.to_string())),
    };
    Ok(Chain::new(name, policy))
}

/// Split a line into tokens; double quotes group words and are removed.
/// Inside quotes, `\"` and `\\` stand for a literal quote and backslash.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes && matches!(chars.peek(), Some('"') | Some('\\')) => {
                current.extend(chars.next());
            }
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }
    tokens
}

fn parse_rule_line(line: &str, policy: &Policy, skip: &SkipList) -> Result<(String, Rule), ParseErrorKind> {
    let mut tokens = tokenize(line);
    // `iptables-save -c` prefixes rules with `[packets:bytes]`.
    if tokens.first().is_some_and(|t| t.starts_with('[')) {
        tokens.remove(0);
    }
    match tokens.first().map(String::as_str) {
        Some("-A") | Some("--append") => {}
        _ => return Err(ParseErrorKind::UnexpectedLine),
    }
    let chain = tokens
        .get(1)
        .cloned()
        .ok_or_else(|| ParseErrorKind::MissingValue("-A".to_string()))?;
    if policy.chain(&chain).is_none() {
        return Err(ParseErrorKind::UnknownChain(chain));
    }

    let parser = RuleParser {
        tokens: &tokens[2..],
        pos: 0,
        policy,
        skip,
    };
    let rule = parser.parse()?;
    Ok((chain, rule))
}

struct RuleParser<'a> {
    tokens: &'a [String],
    pos: usize,
    policy: &'a Policy,
    skip: &'a SkipList,
}

enum FieldMatch {
    Predicate(Predicate),
    /// `-p all`: no constraint at all.
    Everything,
    /// Not a header field match.
    Unknown,
}

fn is_flag(token: &str) -> bool {
    token.starts_with('-') && token.len() > 1 || token == "!"
}

impl<'a> RuleParser<'a> {
    fn next(&mut self) -> Option<&'a str> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token.as_str())
    }

    fn value(&mut self, flag: &str) -> Result<&'a str, ParseErrorKind> {
        self.next().ok_or_else(|| ParseErrorKind::MissingValue(flag.to_string()))
    }

    /// All following tokens up to the next flag.
    fn values(&mut self) -> Vec<&'a str> {
        let mut values = Vec::new();
        while let Some(token) = self.tokens.get(self.pos) {
            if is_flag(token) {
                break;
            }
            values.push(token.as_str());
            self.pos += 1;
        }
        values
    }

    fn opaque(&mut self, flag: &str) -> String {
        let mut option = vec![flag];
        option.extend(self.values());
        option.join(" ")
    }

    fn parse(mut self) -> Result<Rule, ParseErrorKind> {
        let mut rule = Rule::new(Action::Count);
        while let Some(token) = self.next() {
            match token {
                "!" => {
                    let flag = self.value("!")?;
                    match self.field_match(flag)? {
                        FieldMatch::Predicate(predicate) => rule.predicates.push(Predicate::negate(predicate)),
                        FieldMatch::Everything => rule.predicates.push(Predicate::nothing()),
                        FieldMatch::Unknown => {
                            let option = format!("! {}", self.opaque(flag));
                            warn!("Negated match '{}' is not modelled and is ignored", option);
                            rule.options.push(option);
                        }
                    }
                }
                "-i" | "--in-interface" => rule.in_iface = Some(self.value(token)?.to_string()),
                "-o" | "--out-interface" => rule.out_iface = Some(self.value(token)?.to_string()),
                "-m" | "--match" => {
                    let module = self.value(token)?;
                    rule.options.push(format!("-m {}", module));
                }
                "-j" | "--jump" => {
                    let target = self.value(token)?;
                    rule.action = self.resolve_target(target)?;
                }
                "-g" | "--goto" => {
                    let target = self.value(token)?;
                    if self.policy.chain(target).is_none() {
                        return Err(ParseErrorKind::UnknownChain(target.to_string()));
                    }
                    rule.action = Action::Goto(target.to_string());
                }
                other => match self.field_match(other)? {
                    FieldMatch::Predicate(predicate) => rule.predicates.push(predicate),
                    FieldMatch::Everything => {}
                    FieldMatch::Unknown => {
                        let option = self.opaque(other);
                        debug!("Keeping opaque option '{}'", option);
                        rule.options.push(option);
                    }
                },
            }
        }
        Ok(rule)
    }

    /// Match on a modelled header field, consuming its arguments.
    fn field_match(&mut self, flag: &'a str) -> Result<FieldMatch, ParseErrorKind> {
        let predicate = match flag {
            "-p" | "--protocol" => match parse_protocol(self.value(flag)?)? {
                Some(predicate) => predicate,
                None => return Ok(FieldMatch::Everything),
            },
            "-s" | "--source" => parse_address(PacketField::SourceAddr, self.value(flag)?)?,
            "-d" | "--destination" => parse_address(PacketField::DestAddr, self.value(flag)?)?,
            "--sport" | "--source-port" => parse_port_range(PacketField::SourcePort, self.value(flag)?)?,
            "--dport" | "--destination-port" => parse_port_range(PacketField::DestPort, self.value(flag)?)?,
            "--sports" | "--source-ports" => {
                Predicate::any_of(parse_port_list(PacketField::SourcePort, self.value(flag)?)?)
            }
            "--dports" | "--destination-ports" => {
                Predicate::any_of(parse_port_list(PacketField::DestPort, self.value(flag)?)?)
            }
            "--ports" => {
                let value = self.value(flag)?;
                let mut alternatives = parse_port_list(PacketField::SourcePort, value)?;
                alternatives.extend(parse_port_list(PacketField::DestPort, value)?);
                Predicate::any_of(alternatives)
            }
            "--tcp-flags" => {
                let mask = parse_tcp_flags(self.value(flag)?)?;
                let comp = parse_tcp_flags(self.value(flag)?)?;
                Predicate::masked(PacketField::TcpFlags, mask, comp).map_err(ParseErrorKind::InvalidPredicate)?
            }
            "--syn" => {
                Predicate::masked(PacketField::TcpFlags, 0x17, 0x02).map_err(ParseErrorKind::InvalidPredicate)?
            }
            _ => return Ok(FieldMatch::Unknown),
        };
        Ok(FieldMatch::Predicate(predicate))
    }

    fn resolve_target(&self, target: &str) -> Result<Action, ParseErrorKind> {
        let action = match target {
            "ACCEPT" => Action::Accept,
            "DROP" | "REJECT" => Action::Drop,
            "RETURN" => Action::Return,
            t if self.skip.is_skipped(t) => Action::Log(t.to_string()),
            t if self.policy.chain(t).is_some() => Action::Jump(t.to_string()),
            t => return Err(ParseErrorKind::UnknownChain(t.to_string())),
        };
        Ok(action)
    }
}

fn parse_number(s: &str) -> Result<u32, ParseErrorKind> {
    s.parse().map_err(|_| ParseErrorKind::BadNumber(s.to_string()))
}

/// `None` for `all`, which matches every protocol.
fn parse_protocol(value: &str) -> Result<Option<Predicate>, ParseErrorKind> {
    let name = value.to_ascii_lowercase();
    if name == "all" {
        return Ok(None);
    }
    let number = match PROTOCOLS.iter().find(|(n, _)| *n == name) {
        Some(&(_, number)) => number as u32,
        None if name.chars().all(|c| c.is_ascii_digit()) => parse_number(&name)?,
        None => return Err(ParseErrorKind::UnknownProtocol(value.to_string())),
    };
    if number == 0 {
        return Ok(None);
    }
    Predicate::exact(PacketField::Protocol, number)
        .map(Some)
        .map_err(ParseErrorKind::InvalidPredicate)
}

fn parse_ipv4(s: &str) -> Result<Ipv4Addr, ParseErrorKind> {
    let bad = || ParseErrorKind::BadAddress(s.to_string());
    let octets: Vec<&str> = s.split('.').collect();
    if octets.len() != 4 {
        return Err(bad());
    }
    let mut bytes = [0u8; 4];
    for (byte, octet) in bytes.iter_mut().zip(octets) {
        *byte = octet.parse().map_err(|_| bad())?;
    }
    Ok(Ipv4Addr::from(bytes))
}

/// `a.b.c.d`, `a.b.c.d/len` or `a.b.c.d/m.m.m.m`.
fn parse_address(field: PacketField, value: &str) -> Result<Predicate, ParseErrorKind> {
    let (addr, len) = match value.split_once('/') {
        None => (parse_ipv4(value)?, 32),
        Some((addr, prefix)) if prefix.contains('.') => {
            let mask = u32::from(parse_ipv4(prefix)?);
            let len = mask.count_ones() as u8;
            if prefix_mask(len) != mask {
                return Err(ParseErrorKind::BadPrefix(prefix.to_string()));
            }
            (parse_ipv4(addr)?, len)
        }
        Some((addr, prefix)) => {
            let len = prefix
                .parse::<u8>()
                .map_err(|_| ParseErrorKind::BadPrefix(prefix.to_string()))?;
            (parse_ipv4(addr)?, len)
        }
    };
    Predicate::prefix(field, addr, len).map_err(ParseErrorKind::InvalidPredicate)
}

/// `p`, `p:q`, `:q` or `p:`; open bounds extend to the ends of the port space.
fn parse_port_range(field: PacketField, value: &str) -> Result<Predicate, ParseErrorKind> {
    let (lo, hi) = match value.split_once(':') {
        None => {
            let port = parse_number(value)?;
            (port, port)
        }
        Some((lo, hi)) => {
            let lo = if lo.is_empty() { 0 } else { parse_number(lo)? };
            let hi = if hi.is_empty() { field.max_value() } else { parse_number(hi)? };
            (lo, hi)
        }
    };
    if lo > hi {
        return Err(ParseErrorKind::BadRange(value.to_string()));
    }
    Predicate::range(field, lo, hi).map_err(ParseErrorKind::InvalidPredicate)
}

/// Multiport list: `p[,q[:r]]...`.
fn parse_port_list(field: PacketField, value: &str) -> Result<Vec<Predicate>, ParseErrorKind> {
    value.split(',').map(|item| parse_port_range(field, item)).collect()
}

fn parse_tcp_flags(value: &str) -> Result<u32, ParseErrorKind> {
    let mut bits = 0;
    for name in value.split(',') {
        let name = name.to_ascii_uppercase();
        bits |= match name.as_str() {
            "ALL" => 0xFF,
            "NONE" => 0,
            _ => TCP_FLAGS
                .iter()
                .find(|(n, _)| *n == name)
                .map(|&(_, bit)| bit as u32)
                .ok_or_else(|| ParseErrorKind::UnknownTcpFlag(name.clone()))?,
        };
    }
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::error::PredicateError;

    fn kind(text: &str) -> ParseErrorKind {
        parse(text).unwrap_err().kind
    }

    #[test]
    fn test_tokenize_quotes() {
        let tokens = tokenize(r#"-A INPUT -m comment --comment "allow ssh" -j ACCEPT"#);
        assert_eq!(tokens, ["-A", "INPUT", "-m", "comment", "--comment", "allow ssh", "-j", "ACCEPT"]);
        assert_eq!(tokenize(r#"--comment """#), ["--comment", ""]);
    }

    #[test]
    fn test_tokenize_escaped_quotes() {
        let tokens = tokenize(r#"-A INPUT -m comment --comment "say \"hi\" -j DROP" -j ACCEPT"#);
        assert_eq!(tokens, ["-A", "INPUT", "-m", "comment", "--comment", r#"say "hi" -j DROP"#, "-j", "ACCEPT"]);
        assert_eq!(tokenize(r#""a\\b" c\d"#), [r"a\b", r"c\d"]);

        let policy = parse(":INPUT\n-A INPUT -m comment --comment \"say \\\"hi\\\" -j DROP\" -j ACCEPT\n").unwrap();
        let rule = &policy.entry_chain().unwrap().rules[0];
        assert_eq!(rule.action, Action::Accept);
        assert_eq!(rule.options, ["-m comment", r#"--comment say "hi" -j DROP"#]);
    }

    #[test]
    fn test_chain_declarations() {
        let policy = parse(":INPUT DROP [0:0]\n:FORWARD ACCEPT\n:helper - [0:0]\n:bare\n").unwrap();
        let policies: Vec<ChainPolicy> = policy.chains().map(|c| c.policy).collect();
        assert_eq!(
            policies,
            [ChainPolicy::Drop, ChainPolicy::Accept, ChainPolicy::Return, ChainPolicy::Accept]
        );
    }

    #[test]
    fn test_full_rule() {
        let text = "*filter\n:INPUT DROP [0:0]\n-A INPUT -i eth0 -s 10.0.0.0/8 -d 192.168.1.1 -p tcp -m tcp --sport 1024:65535 --dport 22 -j ACCEPT\nCOMMIT\n";
        let policy = parse(text).unwrap();
        let rule = &policy.entry_chain().unwrap().rules[0];
        assert_eq!(rule.line, 3);
        assert_eq!(rule.in_iface.as_deref(), Some("eth0"));
        assert_eq!(rule.options, ["-m tcp"]);
        assert_eq!(rule.action, Action::Accept);
        assert_eq!(
            rule.predicates,
            [
                Predicate::prefix(PacketField::SourceAddr, "10.0.0.0".parse().unwrap(), 8).unwrap(),
                Predicate::prefix(PacketField::DestAddr, "192.168.1.1".parse().unwrap(), 32).unwrap(),
                Predicate::exact(PacketField::Protocol, 6).unwrap(),
                Predicate::range(PacketField::SourcePort, 1024, 65535).unwrap(),
                Predicate::range(PacketField::DestPort, 22, 22).unwrap(),
            ]
        );
    }

    #[test]
    fn test_protocols() {
        let text = ":INPUT\n-A INPUT -p udp\n-A INPUT -p ICMP\n-A INPUT -p 47\n-A INPUT -p all\n-A INPUT -p ipv6-icmp\n";
        let policy = parse(text).unwrap();
        let protos: Vec<Vec<Predicate>> = policy.entry_chain().unwrap().rules.iter().map(|r| r.predicates.clone()).collect();
        let proto = |n| vec![Predicate::exact(PacketField::Protocol, n).unwrap()];
        assert_eq!(protos, [proto(17), proto(1), proto(47), vec![], proto(58)]);
        assert_eq!(kind(":INPUT\n-A INPUT -p sctpx -j DROP\n"), ParseErrorKind::UnknownProtocol("sctpx".into()));
    }

    #[test]
    fn test_open_port_ranges() {
        let policy = parse(":INPUT\n-A INPUT --dport :1023\n-A INPUT --sport 1024:\n").unwrap();
        let rules = &policy.entry_chain().unwrap().rules;
        assert_eq!(rules[0].predicates[0], Predicate::range(PacketField::DestPort, 0, 1023).unwrap());
        assert_eq!(rules[1].predicates[0], Predicate::range(PacketField::SourcePort, 1024, 65535).unwrap());
        assert_eq!(rules[0].action, Action::Count);
    }

    #[test]
    fn test_multiport_and_flags() {
        let text = ":INPUT\n-A INPUT -p tcp -m multiport --dports 80,443,8000:8080 -j ACCEPT\n-A INPUT -p tcp --tcp-flags SYN,ACK SYN -j DROP\n-A INPUT -p tcp --syn -j DROP\n";
        let policy = parse(text).unwrap();
        let rules = &policy.entry_chain().unwrap().rules;
        assert_eq!(
            rules[0].predicates[1],
            Predicate::AnyOf(vec![
                Predicate::range(PacketField::DestPort, 80, 80).unwrap(),
                Predicate::range(PacketField::DestPort, 443, 443).unwrap(),
                Predicate::range(PacketField::DestPort, 8000, 8080).unwrap(),
            ])
        );
        assert_eq!(rules[1].predicates[1], Predicate::masked(PacketField::TcpFlags, 0x12, 0x02).unwrap());
        assert_eq!(rules[2].predicates[1], Predicate::masked(PacketField::TcpFlags, 0x17, 0x02).unwrap());
        assert_eq!(
            kind(":INPUT\n-A INPUT --tcp-flags SYN,BOGUS SYN\n"),
            ParseErrorKind::UnknownTcpFlag("BOGUS".into())
        );
    }

    #[test]
    fn test_multiport_source_and_both_ports() {
        let text = ":INPUT\n-A INPUT -p tcp -m multiport --ports 80,443 -j ACCEPT\n-A INPUT -p udp -m multiport --sports 53,123 -j ACCEPT\n";
        let policy = parse(text).unwrap();
        let rules = &policy.entry_chain().unwrap().rules;
        let port = |field, p| Predicate::range(field, p, p).unwrap();
        assert_eq!(
            rules[0].predicates[1],
            Predicate::AnyOf(vec![
                port(PacketField::SourcePort, 80),
                port(PacketField::SourcePort, 443),
                port(PacketField::DestPort, 80),
                port(PacketField::DestPort, 443),
            ])
        );
        assert_eq!(rules[0].predicates[1].field(), None);
        assert_eq!(rules[0].predicates[1].to_string(), "-m multiport --ports 80,443");
        assert_eq!(
            rules[1].predicates[1],
            Predicate::AnyOf(vec![port(PacketField::SourcePort, 53), port(PacketField::SourcePort, 123)])
        );
        assert_eq!(rules[1].predicates[1].to_string(), "-m multiport --sports 53,123");
    }

    #[test]
    fn test_dotted_mask() {
        let policy = parse(":INPUT\n-A INPUT -s 10.1.0.0/255.255.0.0 -j DROP\n").unwrap();
        let rule = &policy.entry_chain().unwrap().rules[0];
        assert_eq!(
            rule.predicates[0],
            Predicate::prefix(PacketField::SourceAddr, "10.1.0.0".parse().unwrap(), 16).unwrap()
        );
        assert_eq!(
            kind(":INPUT\n-A INPUT -s 10.1.0.0/255.0.255.0 -j DROP\n"),
            ParseErrorKind::BadPrefix("255.0.255.0".into())
        );
    }

    #[test]
    fn test_targets() {
        let text = "\
:INPUT DROP
:ufw-before-logging-input -
:helper -
-A INPUT -j ufw-before-logging-input
-A INPUT -j LOG --log-prefix \"[BLOCK] \"
-A INPUT -p icmp -j REJECT --reject-with icmp-port-unreachable
-A INPUT -j helper
-A INPUT -g helper
-A helper -j RETURN
";
        let policy = parse(text).unwrap();
        let actions: Vec<Action> = policy.entry_chain().unwrap().rules.iter().map(|r| r.action.clone()).collect();
        assert_eq!(
            actions,
            [
                Action::Log("ufw-before-logging-input".into()),
                Action::Log("LOG".into()),
                Action::Drop,
                Action::Jump("helper".into()),
                Action::Goto("helper".into()),
            ]
        );
        let reject = &policy.entry_chain().unwrap().rules[2];
        assert_eq!(reject.options, ["--reject-with icmp-port-unreachable"]);
        assert_eq!(policy.chain("helper").unwrap().rules[0].action, Action::Return);
    }

    #[test]
    fn test_custom_skip_list() {
        let config = ParserConfig::default().with_skip_list(SkipList::empty().with_target("AUDIT"));
        let policy = parse_with(":INPUT\n:LOG\n-A INPUT -j AUDIT\n-A INPUT -j LOG\n", &config).unwrap();
        let actions: Vec<Action> = policy.entry_chain().unwrap().rules.iter().map(|r| r.action.clone()).collect();
        assert_eq!(actions, [Action::Log("AUDIT".into()), Action::Jump("LOG".into())]);
    }

    #[test]
    fn test_negated_field_matches() {
        let policy = parse(":INPUT\n-A INPUT ! -s 10.0.0.0/8 -p tcp -j DROP\n").unwrap();
        let rule = &policy.entry_chain().unwrap().rules[0];
        assert!(rule.options.is_empty());
        let net = Predicate::prefix(PacketField::SourceAddr, Ipv4Addr::new(10, 0, 0, 0), 8).unwrap();
        assert_eq!(
            rule.predicates,
            [Predicate::negate(net), Predicate::exact(PacketField::Protocol, 6).unwrap()]
        );

        let policy = parse(":INPUT\n-A INPUT -p tcp -m multiport ! --dports 22,23 ! --syn -j DROP\n").unwrap();
        let rule = &policy.entry_chain().unwrap().rules[0];
        assert_eq!(rule.options, ["-m multiport"]);
        let ports = Predicate::any_of(vec![
            Predicate::range(PacketField::DestPort, 22, 22).unwrap(),
            Predicate::range(PacketField::DestPort, 23, 23).unwrap(),
        ]);
        let syn = Predicate::masked(PacketField::TcpFlags, 0x17, 0x02).unwrap();
        assert_eq!(
            rule.predicates,
            [
                Predicate::exact(PacketField::Protocol, 6).unwrap(),
                Predicate::negate(ports),
                Predicate::negate(syn)
            ]
        );

        let policy = parse(":INPUT\n-A INPUT ! -p all -j DROP\n").unwrap();
        assert_eq!(policy.entry_chain().unwrap().rules[0].predicates, [Predicate::nothing()]);
    }

    #[test]
    fn test_negated_interface_is_opaque() {
        let policy = parse(":INPUT\n-A INPUT ! -i eth0 -p tcp -j DROP\n").unwrap();
        let rule = &policy.entry_chain().unwrap().rules[0];
        assert_eq!(rule.options, ["! -i eth0"]);
        assert_eq!(rule.in_iface, None);
        assert_eq!(rule.predicates, [Predicate::exact(PacketField::Protocol, 6).unwrap()]);
    }

    #[test]
    fn test_other_tables_are_skipped() {
        let text = "\
*nat
:PREROUTING ACCEPT [0:0]
-A PREROUTING -j NOWHERE
COMMIT
*filter
:INPUT ACCEPT [0:0]
-A INPUT -j DROP
COMMIT
*mangle
:INPUT ACCEPT [0:0]
COMMIT
";
        let policy = parse(text).unwrap();
        assert_eq!(policy.chains().count(), 1);
        assert_eq!(policy.entry_chain().unwrap().rules[0].line, 7);

        let config = ParserConfig::default().with_table("nat").with_entry_chain("PREROUTING");
        let err = parse_with(text, &config).unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.kind, ParseErrorKind::UnknownChain("NOWHERE".into()));
    }

    #[test]
    fn test_counters_prefix() {
        let policy = parse(":INPUT ACCEPT [12:3456]\n[3:180] -A INPUT -p tcp -j DROP\n").unwrap();
        assert_eq!(policy.entry_chain().unwrap().rules[0].action, Action::Drop);
    }

    #[test]
    fn test_forward_reference() {
        let policy = parse(":INPUT\n-A INPUT -j later\n:later DROP\n").unwrap();
        assert_eq!(policy.entry_chain().unwrap().rules[0].action, Action::Jump("later".into()));
    }

    #[test]
    fn test_errors() {
        let err = parse(":INPUT\n\n-A INPUT -s 1.2.3.4.5 -j DROP\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.text, "-A INPUT -s 1.2.3.4.5 -j DROP");
        assert_eq!(err.kind, ParseErrorKind::BadAddress("1.2.3.4.5".into()));

        assert_eq!(kind(":INPUT\n-A INPUT -s 1.2.300.4\n"), ParseErrorKind::BadAddress("1.2.300.4".into()));
        assert_eq!(
            kind(":INPUT\n-A INPUT -d 1.2.3.4/40\n"),
            ParseErrorKind::InvalidPredicate(PredicateError::PrefixTooLong(40))
        );
        assert_eq!(kind(":INPUT\n-A INPUT --dport 8o\n"), ParseErrorKind::BadNumber("8o".into()));
        assert_eq!(kind(":INPUT\n-A INPUT --dport 2000:1000\n"), ParseErrorKind::BadRange("2000:1000".into()));
        assert!(matches!(
            kind(":INPUT\n-A INPUT --dport 70000\n"),
            ParseErrorKind::InvalidPredicate(PredicateError::TooWide { .. })
        ));
        assert_eq!(kind(":INPUT\n-A OUTPUT -j DROP\n"), ParseErrorKind::UnknownChain("OUTPUT".into()));
        assert_eq!(kind(":INPUT\n-A INPUT -j nowhere\n"), ParseErrorKind::UnknownChain("nowhere".into()));
        assert_eq!(kind(":INPUT MAYBE\n"), ParseErrorKind::UnknownPolicy("MAYBE".into()));
        assert_eq!(kind(":INPUT\n:INPUT\n"), ParseErrorKind::DuplicateChain("INPUT".into()));
        assert_eq!(kind(":INPUT\n-A INPUT -p\n"), ParseErrorKind::MissingValue("-p".into()));
        assert_eq!(kind(":INPUT\n-I INPUT 1 -j DROP\n"), ParseErrorKind::UnexpectedLine);

        let err = parse(":OUTPUT\n").unwrap_err();
        assert_eq!(err.line, 0);
        assert_eq!(err.kind, ParseErrorKind::MissingEntryChain("INPUT".into()));
    }

    #[test]
    fn test_display_reparses() {
        let text = "\
*filter
:INPUT DROP [0:0]
:helper - [0:0]
-A INPUT -p tcp -m multiport --dports 80,443 -j ACCEPT
-A INPUT -s 10.0.0.0/8 -j helper
-A INPUT -p tcp --tcp-flags SYN,RST SYN -j DROP
-A INPUT -p tcp -m multiport --ports 8000,8080:8090 -j ACCEPT
-A INPUT ! -s 192.168.0.0/16 -p udp -m multiport ! --dports 53,123 -j DROP
-A INPUT ! -p all -j ACCEPT
-A helper -p udp --sport 53 -j ACCEPT
COMMIT
";
        let policy = parse(text).unwrap();
        let again = parse(&policy.to_string()).unwrap();
        for (a, b) in policy.chains().zip(again.chains()) {
            assert_eq!(a.policy, b.policy);
            let summary = |c: &Chain| -> Vec<(Vec<Predicate>, Action)> {
                c.rules.iter().map(|r| (r.predicates.clone(), r.action.clone())).collect()
            };
            assert_eq!(summary(a), summary(b));
        }
    }
}
