//! Field predicates over the bit-blasted packet, compiled to diagrams.
//!
//! Every field is an unsigned bitvector whose bits are diagram variables,
//! most significant bit on top (see [`PacketVars`]). Comparisons against a
//! constant are built bottom-up in one pass over the bits, so each of them
//! has at most one node per bit.

use crate::bdd::Bdd;
use crate::error::SolverError;
use crate::packet::{PacketField, PacketVars};
use crate::reference::Ref;
use crate::rule::{prefix_mask, Predicate};

/// `field == value`.
pub fn field_eq(bdd: &Bdd, vars: &PacketVars, field: PacketField, value: u32) -> Result<Ref, SolverError> {
    field_masked(bdd, vars, field, field.max_value(), value)
}

/// The top `len` bits of an address equal those of `addr`.
pub fn field_prefix(bdd: &Bdd, vars: &PacketVars, field: PacketField, addr: u32, len: u8) -> Result<Ref, SolverError> {
    field_masked(bdd, vars, field, prefix_mask(len), addr & prefix_mask(len))
}

/// `field & mask == value`; constant false when `value` has bits outside `mask`.
pub fn field_masked(bdd: &Bdd, vars: &PacketVars, field: PacketField, mask: u32, value: u32) -> Result<Ref, SolverError> {
    if value & !mask != 0 {
        return Ok(bdd.zero);
    }
    let literals = (0..field.width())
        .filter(|&bit| (mask >> bit) & 1 == 1)
        .map(|bit| (vars.var(field, bit), (value >> bit) & 1 == 1));
    bdd.cube(literals)
}

/// `field >= c`, unsigned.
pub fn field_ge(bdd: &Bdd, vars: &PacketVars, field: PacketField, c: u32) -> Result<Ref, SolverError> {
    let mut res = bdd.one;
    for bit in 0..field.width() {
        let v = vars.var(field, bit);
        res = if (c >> bit) & 1 == 1 {
            bdd.mk_node(v, bdd.zero, res)?
        } else {
            bdd.mk_node(v, res, bdd.one)?
        };
    }
    Ok(res)
}

/// `field <= c`, unsigned.
pub fn field_le(bdd: &Bdd, vars: &PacketVars, field: PacketField, c: u32) -> Result<Ref, SolverError> {
    let mut res = bdd.one;
    for bit in 0..field.width() {
        let v = vars.var(field, bit);
        res = if (c >> bit) & 1 == 1 {
            bdd.mk_node(v, bdd.one, res)?
        } else {
            bdd.mk_node(v, res, bdd.zero)?
        };
    }
    Ok(res)
}

/// `lo <= field <= hi`.
pub fn field_range(bdd: &Bdd, vars: &PacketVars, field: PacketField, lo: u32, hi: u32) -> Result<Ref, SolverError> {
    if lo > hi {
        return Ok(bdd.zero);
    }
    let ge = if lo > 0 { field_ge(bdd, vars, field, lo)? } else { bdd.one };
    let le = if hi < field.max_value() {
        field_le(bdd, vars, field, hi)?
    } else {
        bdd.one
    };
    bdd.apply_and(ge, le)
}

/// Diagram of the packets matched by `predicate`.
pub fn predicate(bdd: &Bdd, vars: &PacketVars, predicate: &Predicate) -> Result<Ref, SolverError> {
    match predicate {
        Predicate::Exact { field, value } => field_eq(bdd, vars, *field, *value),
        Predicate::Prefix { field, addr, len } => field_prefix(bdd, vars, *field, *addr, *len),
        Predicate::Range { field, lo, hi } => field_range(bdd, vars, *field, *lo, *hi),
        Predicate::Masked { field, mask, value } => field_masked(bdd, vars, *field, *mask, *value),
        Predicate::AnyOf(alternatives) => {
            let parts = alternatives
                .iter()
                .map(|alternative| self::predicate(bdd, vars, alternative))
                .collect::<Result<Vec<_>, _>>()?;
            bdd.apply_or_many(parts)
        }
        Predicate::Not(inner) => Ok(bdd.apply_not(self::predicate(bdd, vars, inner)?)),
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use test_log::test;

    use super::*;
    use crate::packet::{declare_packet, Packet};

    fn holds(bdd: &Bdd, vars: &PacketVars, f: Ref, packet: &Packet) -> bool {
        bdd.eval(f, |v| vars.value_of(packet, v))
    }

    #[test]
    fn test_ge_le_exhaustive_on_protocol() {
        let bdd = Bdd::default();
        let vars = declare_packet();
        for c in [0, 1, 6, 17, 128, 200, 255] {
            let ge = field_ge(&bdd, &vars, PacketField::Protocol, c).unwrap();
            let le = field_le(&bdd, &vars, PacketField::Protocol, c).unwrap();
            for x in 0..=255u32 {
                let packet = Packet::default().with(PacketField::Protocol, x);
                assert_eq!(holds(&bdd, &vars, ge, &packet), x >= c, "{} >= {}", x, c);
                assert_eq!(holds(&bdd, &vars, le, &packet), x <= c, "{} <= {}", x, c);
            }
        }
    }

    #[test]
    fn test_range_count() {
        let bdd = Bdd::default();
        let vars = declare_packet();
        let f = field_range(&bdd, &vars, PacketField::DestPort, 1000, 2000).unwrap();
        // 1001 ports, every other bit free.
        let expected = BigUint::from(1001u32) << (vars.num_vars() - 16);
        assert_eq!(bdd.sat_count(f, vars.num_vars()), expected);

        for (port, inside) in [(999, false), (1000, true), (1500, true), (2000, true), (2001, false)] {
            let packet = Packet::default().with(PacketField::DestPort, port);
            assert_eq!(holds(&bdd, &vars, f, &packet), inside, "port {}", port);
        }
    }

    #[test]
    fn test_full_range_is_true() {
        let bdd = Bdd::default();
        let vars = declare_packet();
        assert_eq!(field_range(&bdd, &vars, PacketField::SourcePort, 0, 65535).unwrap(), bdd.one);
    }

    #[test]
    fn test_prefix() {
        let bdd = Bdd::default();
        let vars = declare_packet();
        let net = u32::from(std::net::Ipv4Addr::new(10, 0, 0, 0));
        let f = field_prefix(&bdd, &vars, PacketField::SourceAddr, net, 24).unwrap();
        assert_eq!(bdd.size(f), 25);

        let inside = Packet::default().with(PacketField::SourceAddr, net + 5);
        let outside = Packet::default().with(PacketField::SourceAddr, net + 256 + 5);
        assert!(holds(&bdd, &vars, f, &inside));
        assert!(!holds(&bdd, &vars, f, &outside));

        assert_eq!(field_prefix(&bdd, &vars, PacketField::DestAddr, net, 0).unwrap(), bdd.one);
    }

    #[test]
    fn test_masked() {
        let bdd = Bdd::default();
        let vars = declare_packet();
        let syn = field_masked(&bdd, &vars, PacketField::TcpFlags, 0x12, 0x02).unwrap();
        let flags = |bits| Packet::default().with(PacketField::TcpFlags, bits);
        assert!(holds(&bdd, &vars, syn, &flags(0x02)));
        assert!(holds(&bdd, &vars, syn, &flags(0x03)));
        assert!(!holds(&bdd, &vars, syn, &flags(0x12)));
        assert_eq!(field_masked(&bdd, &vars, PacketField::TcpFlags, 0x02, 0x01).unwrap(), bdd.zero);
    }

    #[test]
    fn test_any_of() {
        let bdd = Bdd::default();
        let vars = declare_packet();
        let p = Predicate::AnyOf(vec![
            Predicate::range(PacketField::DestPort, 80, 80).unwrap(),
            Predicate::range(PacketField::DestPort, 443, 443).unwrap(),
        ]);
        let f = predicate(&bdd, &vars, &p).unwrap();
        assert_eq!(bdd.sat_count(f, vars.num_vars()), BigUint::from(2u32) << (vars.num_vars() - 16));
        assert_eq!(predicate(&bdd, &vars, &Predicate::AnyOf(vec![])).unwrap(), bdd.zero);
    }

    #[test]
    fn test_not() {
        let bdd = Bdd::default();
        let vars = declare_packet();
        let net = Predicate::prefix(PacketField::SourceAddr, std::net::Ipv4Addr::new(10, 0, 0, 0), 8).unwrap();
        let f = predicate(&bdd, &vars, &net).unwrap();
        let g = predicate(&bdd, &vars, &Predicate::negate(net)).unwrap();
        assert_eq!(g, -f);

        let inside = Packet::default().with(PacketField::SourceAddr, 0x0A01_0203);
        let outside = Packet::default().with(PacketField::SourceAddr, 0xC0A8_0001);
        assert!(!holds(&bdd, &vars, g, &inside));
        assert!(holds(&bdd, &vars, g, &outside));

        let total = BigUint::from(1u32) << vars.num_vars();
        assert_eq!(bdd.sat_count(f, vars.num_vars()) + bdd.sat_count(g, vars.num_vars()), total);
    }
}
