//! The packet domain: header fields, their bit layout in the diagram, and
//! concrete packets.

use std::fmt;
use std::net::Ipv4Addr;

/// A header field that policies can match on.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum PacketField {
    SourceAddr,
    DestAddr,
    SourcePort,
    DestPort,
    Protocol,
    TcpFlags,
}

impl PacketField {
    /// Every field, in diagram variable order.
    pub const ALL: [PacketField; 6] = [
        PacketField::SourceAddr,
        PacketField::DestAddr,
        PacketField::SourcePort,
        PacketField::DestPort,
        PacketField::Protocol,
        PacketField::TcpFlags,
    ];

    pub const fn width(self) -> u32 {
        match self {
            PacketField::SourceAddr | PacketField::DestAddr => 32,
            PacketField::SourcePort | PacketField::DestPort => 16,
            PacketField::Protocol | PacketField::TcpFlags => 8,
        }
    }

    /// Largest value the field can hold.
    pub const fn max_value(self) -> u32 {
        match self.width() {
            32 => u32::MAX,
            w => (1 << w) - 1,
        }
    }

    pub const fn is_address(self) -> bool {
        matches!(self, PacketField::SourceAddr | PacketField::DestAddr)
    }

    /// Name of the field as a solver-level bitvector.
    pub const fn name(self) -> &'static str {
        match self {
            PacketField::SourceAddr => "src_ip",
            PacketField::DestAddr => "dst_ip",
            PacketField::SourcePort => "src_port",
            PacketField::DestPort => "dst_port",
            PacketField::Protocol => "proto",
            PacketField::TcpFlags => "tcp_flags",
        }
    }
}

impl fmt::Display for PacketField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Assignment of diagram variables to packet bits.
///
/// Fields occupy consecutive blocks in [`PacketField::ALL`] order, most
/// significant bit first, starting at variable `1`. Two formulas can only be
/// compared when they were encoded over the same layout.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PacketVars {
    offsets: [u32; 6],
    num_vars: u32,
}

/// Lay out the packet fields over diagram variables.
pub fn declare_packet() -> PacketVars {
    let mut offsets = [0; 6];
    let mut next = 1;
    for (i, field) in PacketField::ALL.iter().enumerate() {
        offsets[i] = next;
        next += field.width();
    }
    PacketVars {
        offsets,
        num_vars: next - 1,
    }
}

impl Default for PacketVars {
    fn default() -> Self {
        declare_packet()
    }
}

impl PacketVars {
    pub fn num_vars(&self) -> usize {
        self.num_vars as usize
    }

    fn offset(&self, field: PacketField) -> u32 {
        self.offsets[field as usize]
    }

    /// Variable holding bit `bit` of `field`, where bit `0` is the least significant one.
    pub fn var(&self, field: PacketField, bit: u32) -> u32 {
        assert!(bit < field.width(), "bit {} out of range for {}", bit, field);
        self.offset(field) + (field.width() - 1 - bit)
    }

    /// Field and bit position encoded by variable `v`.
    pub fn field_of(&self, v: u32) -> Option<(PacketField, u32)> {
        PacketField::ALL.iter().find_map(|&field| {
            let offset = self.offset(field);
            if v >= offset && v < offset + field.width() {
                Some((field, field.width() - 1 - (v - offset)))
            } else {
                None
            }
        })
    }

    /// Value of variable `v` in a concrete packet.
    pub fn value_of(&self, packet: &Packet, v: u32) -> bool {
        match self.field_of(v) {
            Some((field, bit)) => packet.bit(field, bit),
            None => false,
        }
    }
}

/// A concrete packet: one value for every field.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Packet {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub sport: u16,
    pub dport: u16,
    pub proto: u8,
    pub tcp_flags: u8,
}

impl Default for Packet {
    fn default() -> Self {
        Self {
            src: Ipv4Addr::UNSPECIFIED,
            dst: Ipv4Addr::UNSPECIFIED,
            sport: 0,
            dport: 0,
            proto: 0,
            tcp_flags: 0,
        }
    }
}

impl Packet {
    pub fn get(&self, field: PacketField) -> u32 {
        match field {
            PacketField::SourceAddr => u32::from(self.src),
            PacketField::DestAddr => u32::from(self.dst),
            PacketField::SourcePort => self.sport as u32,
            PacketField::DestPort => self.dport as u32,
            PacketField::Protocol => self.proto as u32,
            PacketField::TcpFlags => self.tcp_flags as u32,
        }
    }

    /// Set `field`, truncating `value` to the field width.
    pub fn set(&mut self, field: PacketField, value: u32) {
        let value = value & field.max_value();
        match field {
            PacketField::SourceAddr => self.src = Ipv4Addr::from(value),
            PacketField::DestAddr => self.dst = Ipv4Addr::from(value),
            PacketField::SourcePort => self.sport = value as u16,
            PacketField::DestPort => self.dport = value as u16,
            PacketField::Protocol => self.proto = value as u8,
            PacketField::TcpFlags => self.tcp_flags = value as u8,
        }
    }

    pub fn with(mut self, field: PacketField, value: u32) -> Self {
        self.set(field, value);
        self
    }

    pub fn bit(&self, field: PacketField, bit: u32) -> bool {
        (self.get(field) >> bit) & 1 == 1
    }

    /// Packet described by a partial assignment; unmentioned bits are zero.
    pub fn from_bits(vars: &PacketVars, bits: &[(u32, bool)]) -> Self {
        let mut packet = Packet::default();
        for &(v, value) in bits {
            if !value {
                continue;
            }
            if let Some((field, bit)) = vars.field_of(v) {
                let current = packet.get(field);
                packet.set(field, current | (1 << bit));
            }
        }
        packet
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "src={} dst={} proto={} sport={} dport={} flags={:#04x}",
            self.src, self.dst, self.proto, self.sport, self.dport, self.tcp_flags
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let vars = declare_packet();
        assert_eq!(vars.num_vars(), 112);
        assert_eq!(vars.var(PacketField::SourceAddr, 31), 1);
        assert_eq!(vars.var(PacketField::SourceAddr, 0), 32);
        assert_eq!(vars.var(PacketField::DestAddr, 31), 33);
        assert_eq!(vars.var(PacketField::SourcePort, 15), 65);
        assert_eq!(vars.var(PacketField::DestPort, 15), 81);
        assert_eq!(vars.var(PacketField::Protocol, 7), 97);
        assert_eq!(vars.var(PacketField::TcpFlags, 0), 112);
    }

    #[test]
    fn test_field_of_inverts_var() {
        let vars = declare_packet();
        for field in PacketField::ALL {
            for bit in 0..field.width() {
                assert_eq!(vars.field_of(vars.var(field, bit)), Some((field, bit)));
            }
        }
        assert_eq!(vars.field_of(0), None);
        assert_eq!(vars.field_of(113), None);
    }

    #[test]
    fn test_from_bits() {
        let vars = declare_packet();
        let bits = [
            (vars.var(PacketField::DestPort, 4), true),
            (vars.var(PacketField::DestPort, 2), true),
            (vars.var(PacketField::DestPort, 1), true),
            (vars.var(PacketField::DestPort, 0), false),
            (vars.var(PacketField::SourceAddr, 31), true),
        ];
        let packet = Packet::from_bits(&vars, &bits);
        assert_eq!(packet.dport, 22);
        assert_eq!(packet.src, Ipv4Addr::new(128, 0, 0, 0));
        assert_eq!(packet.proto, 0);
    }

    #[test]
    fn test_set_truncates() {
        let packet = Packet::default().with(PacketField::Protocol, 0x106);
        assert_eq!(packet.proto, 6);
        assert_eq!(PacketField::TcpFlags.max_value(), 255);
        assert_eq!(PacketField::SourceAddr.max_value(), u32::MAX);
    }

    #[test]
    fn test_display() {
        let packet = Packet {
            src: Ipv4Addr::new(10, 0, 0, 5),
            dport: 22,
            proto: 6,
            tcp_flags: 2,
            ..Packet::default()
        };
        assert_eq!(
            packet.to_string(),
            "src=10.0.0.5 dst=0.0.0.0 proto=6 sport=0 dport=22 flags=0x02"
        );
    }
}
