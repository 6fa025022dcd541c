//! ARP message record and its 28 byte wire codec.

use crate::{FramingError, Record};
use std::fmt;
use std::net::Ipv4Addr;
use zerocopy::byteorder::big_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Number of bytes in an encoded [`ArpRecord`].
pub const ARP_RECORD_SIZE: usize = 28;

/// Length of an Ethernet hardware address.
pub const ETH_ALEN: usize = 6;

/// Hardware format for Ethernet.
pub const HW_ETHERNET: u16 = 0x0001;

/// Protocol format for IPv4.
pub const PROTO_IPV4: u16 = 0x0800;

/// ARP request opcode.
pub const OP_REQUEST: u16 = 1;

/// ARP reply opcode.
pub const OP_REPLY: u16 = 2;

/// One ARP message, as carried over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArpRecord {
    /// Format of hardware address.
    pub hw_format: u16,

    /// Format of protocol address.
    pub proto_format: u16,

    /// Length of hardware address.
    pub hw_len: u8,

    /// Length of protocol address.
    pub proto_len: u8,

    /// ARP opcode.
    pub opcode: u16,

    /// Sender hardware address.
    pub sender_hw_addr: [u8; ETH_ALEN],

    /// Sender protocol address.
    pub sender_proto_addr: [u8; 4],

    /// Target hardware address.
    pub target_hw_addr: [u8; ETH_ALEN],

    /// Target protocol address.
    pub target_proto_addr: [u8; 4],
}

// Exact on-wire layout. All fields have alignment of 1, so there is no padding.
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
struct Wire {
    hw_format: U16,
    proto_format: U16,
    hw_len: u8,
    proto_len: u8,
    opcode: U16,
    sender_hw_addr: [u8; ETH_ALEN],
    sender_proto_addr: [u8; 4],
    target_hw_addr: [u8; ETH_ALEN],
    target_proto_addr: [u8; 4],
}

const _: () = assert!(size_of::<Wire>() == ARP_RECORD_SIZE);

impl ArpRecord {
    /// Create an Ethernet/IPv4 ARP record.
    ///
    /// # Arguments
    ///
    /// * `opcode` - ARP opcode, usually [`OP_REQUEST`] or [`OP_REPLY`].
    /// * `sender` - Sender hardware and protocol address.
    /// * `target` - Target hardware and protocol address.
    pub fn ethernet_ipv4(
        opcode: u16,
        sender: ([u8; ETH_ALEN], Ipv4Addr),
        target: ([u8; ETH_ALEN], Ipv4Addr),
    ) -> Self {
        Self {
            hw_format: HW_ETHERNET,
            proto_format: PROTO_IPV4,
            hw_len: ETH_ALEN as u8,
            proto_len: 4,
            opcode,
            sender_hw_addr: sender.0,
            sender_proto_addr: sender.1.octets(),
            target_hw_addr: target.0,
            target_proto_addr: target.1.octets(),
        }
    }

    /// Sender protocol address as an IPv4 address.
    pub fn sender_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.sender_proto_addr)
    }

    /// Target protocol address as an IPv4 address.
    pub fn target_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.target_proto_addr)
    }
}

impl Record for ArpRecord {
    const SIZE: usize = ARP_RECORD_SIZE;
    type Bytes = [u8; ARP_RECORD_SIZE];

    fn encode(&self) -> Self::Bytes {
        let wire = Wire {
            hw_format: U16::new(self.hw_format),
            proto_format: U16::new(self.proto_format),
            hw_len: self.hw_len,
            proto_len: self.proto_len,
            opcode: U16::new(self.opcode),
            sender_hw_addr: self.sender_hw_addr,
            sender_proto_addr: self.sender_proto_addr,
            target_hw_addr: self.target_hw_addr,
            target_proto_addr: self.target_proto_addr,
        };

        let mut bytes = [0; ARP_RECORD_SIZE];
        bytes.copy_from_slice(wire.as_bytes());
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<Self, FramingError> {
        let wire = Wire::ref_from_bytes(bytes).map_err(|_| FramingError {
            len: bytes.len(),
            expected: ARP_RECORD_SIZE,
        })?;

        Ok(Self {
            hw_format: wire.hw_format.get(),
            proto_format: wire.proto_format.get(),
            hw_len: wire.hw_len,
            proto_len: wire.proto_len,
            opcode: wire.opcode.get(),
            sender_hw_addr: wire.sender_hw_addr,
            sender_proto_addr: wire.sender_proto_addr,
            target_hw_addr: wire.target_hw_addr,
            target_proto_addr: wire.target_proto_addr,
        })
    }
}

/// Colon separated hex form of a hardware address.
struct Mac<'a>(&'a [u8; ETH_ALEN]);

impl fmt::Display for Mac<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Display for ArpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.opcode {
            OP_REQUEST => "request",
            OP_REPLY => "reply",
            _ => "op",
        };

        write!(
            f,
            "{op}({}) hrd=0x{:04x} pro=0x{:04x} hln={} pln={} {} ({}) -> {} ({})",
            self.opcode,
            self.hw_format,
            self.proto_format,
            self.hw_len,
            self.proto_len,
            Mac(&self.sender_hw_addr),
            self.sender_ip(),
            Mac(&self.target_hw_addr),
            self.target_ip(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolero::check;

    fn request() -> ArpRecord {
        ArpRecord::ethernet_ipv4(
            OP_REQUEST,
            (
                [0x49, 0x72, 0x16, 0x08, 0x64, 0x14],
                Ipv4Addr::new(129, 25, 10, 72),
            ),
            ([0; ETH_ALEN], Ipv4Addr::new(129, 25, 10, 11)),
        )
    }

    #[test]
    fn encode_layout() {
        let bytes = request().encode();
        assert_eq!(
            bytes,
            [
                0x00, 0x01, // hw_format
                0x80, 0x00, // proto_format
                0x06, // hw_len
                0x04, // proto_len
                0x00, 0x01, // opcode
                0x49, 0x72, 0x16, 0x08, 0x64, 0x14, // sender_hw_addr
                129, 25, 10, 72, // sender_proto_addr
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // target_hw_addr
                129, 25, 10, 11, // target_proto_addr
            ]
        );
    }

    #[test]
    fn round_trip_record() {
        // Every 28 byte pattern is a valid record.
        check!().with_type::<[u8; ARP_RECORD_SIZE]>().for_each(|bytes| {
            let record = ArpRecord::decode(bytes).unwrap();
            assert_eq!(&record.encode(), bytes);
            assert_eq!(ArpRecord::decode(&record.encode()), Ok(record));
        });
    }

    #[test]
    fn decode_wrong_length() {
        check!().with_type::<Vec<u8>>().for_each(|bytes| {
            if bytes.len() != ARP_RECORD_SIZE {
                assert_eq!(
                    ArpRecord::decode(bytes),
                    Err(FramingError {
                        len: bytes.len(),
                        expected: ARP_RECORD_SIZE,
                    })
                );
            }
        });
    }

    #[test]
    fn display() {
        assert_eq!(
            request().to_string(),
            "request(1) hrd=0x0001 pro=0x0800 hln=6 pln=4 \
             49:72:16:08:64:14 (129.25.10.72) -> 00:00:00:00:00:00 (129.25.10.11)"
        );
    }
}
