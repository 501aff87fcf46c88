//
// Copyright (c) The ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::LazyLock as Lazy;

use bytes::Bytes;
use maplit::btreeset;
use ospfd::packet::error::DecodeError;
use ospfd::packet::lsa::{
    Lsa, LsaAsExternal, LsaAsExternalFlags, LsaBody, LsaKey, LsaNetwork,
    LsaRouter, LsaRouterFlags, LsaRouterLink, LsaRouterLinkType, LsaSummary,
    LsaType,
};
use ospfd::packet::{
    DbDesc, DbDescFlags, Hello, LsAck, LsRequest, LsUpdate, Options, Packet,
    PacketHdr, PacketType,
};

//
// Helper functions.
//

fn test_encode_packet(bytes_expected: &[u8], packet: &Packet) {
    let bytes_actual = packet.encode();
    assert_eq!(bytes_expected, bytes_actual.as_ref());
}

fn test_decode_packet(bytes: &[u8], packet_expected: &Packet) {
    let mut buf = Bytes::copy_from_slice(bytes);
    let packet_actual = Packet::decode(&mut buf).unwrap();
    assert_eq!(*packet_expected, packet_actual);
}

fn test_encode_lsa(bytes_expected: &[u8], lsa: &Lsa) {
    assert_eq!(bytes_expected, lsa.raw.as_ref());
}

fn test_decode_lsa(bytes: &[u8], lsa_expected: &Lsa) {
    let mut bytes = Bytes::copy_from_slice(bytes);
    let lsa_actual = Lsa::decode(&mut bytes).unwrap();
    assert_eq!(*lsa_expected, lsa_actual);
}

fn router_lsa() -> Lsa {
    Lsa::new(
        1,
        Options::E,
        Ipv4Addr::new(2, 2, 2, 2),
        Ipv4Addr::new(2, 2, 2, 2),
        0x80000001,
        LsaBody::Router(LsaRouter {
            flags: LsaRouterFlags::empty(),
            links: vec![LsaRouterLink::new(
                LsaRouterLinkType::TransitNetwork,
                Ipv4Addr::new(10, 0, 0, 2),
                Ipv4Addr::new(10, 0, 0, 2),
                10,
            )],
        }),
    )
}

//
// Test packets.
//

static HELLO1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x01, 0x00, 0x30, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
            0x00, 0x00, 0xe2, 0x91, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0x00, 0x00, 0x0a,
            0x02, 0x01, 0x00, 0x00, 0x00, 0x28, 0x0a, 0x00, 0x00, 0x02,
            0x0a, 0x00, 0x00, 0x01, 0x02, 0x02, 0x02, 0x02,
        ],
        Packet::Hello(Hello {
            hdr: PacketHdr {
                pkt_type: PacketType::Hello,
                router_id: Ipv4Addr::new(1, 1, 1, 1),
                area_id: Ipv4Addr::new(0, 0, 0, 0),
            },
            network_mask: Ipv4Addr::new(255, 255, 255, 0),
            hello_interval: 10,
            options: Options::E,
            priority: 1,
            dead_interval: 40,
            dr: Some(Ipv4Addr::new(10, 0, 0, 2).into()),
            bdr: Some(Ipv4Addr::new(10, 0, 0, 1).into()),
            neighbors: btreeset![Ipv4Addr::new(2, 2, 2, 2)],
        }),
    )
});

static DBDESC1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x02, 0x00, 0x20, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00,
            0x00, 0x00, 0xdf, 0xc2, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x05, 0xdc, 0x02, 0x07, 0x00, 0x00,
            0x12, 0x34,
        ],
        Packet::DbDesc(DbDesc {
            hdr: PacketHdr {
                pkt_type: PacketType::DbDesc,
                router_id: Ipv4Addr::new(2, 2, 2, 2),
                area_id: Ipv4Addr::new(0, 0, 0, 0),
            },
            mtu: 1500,
            options: Options::E,
            dd_flags: DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
            dd_seq_no: 0x1234,
            lsa_hdrs: vec![],
        }),
    )
});

static DBDESC2: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x02, 0x00, 0x34, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
            0x00, 0x00, 0x9b, 0x21, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x05, 0xdc, 0x02, 0x00, 0x00, 0x00,
            0x12, 0x35, 0x00, 0x01, 0x02, 0x01, 0x02, 0x02, 0x02, 0x02,
            0x02, 0x02, 0x02, 0x02, 0x80, 0x00, 0x00, 0x01, 0xbc, 0x65,
            0x00, 0x24,
        ],
        Packet::DbDesc(DbDesc {
            hdr: PacketHdr {
                pkt_type: PacketType::DbDesc,
                router_id: Ipv4Addr::new(1, 1, 1, 1),
                area_id: Ipv4Addr::new(0, 0, 0, 0),
            },
            mtu: 1500,
            options: Options::E,
            dd_flags: DbDescFlags::empty(),
            dd_seq_no: 0x1235,
            lsa_hdrs: vec![router_lsa().hdr],
        }),
    )
});

static LSREQUEST1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x03, 0x00, 0x24, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
            0x00, 0x00, 0xf3, 0xcd, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x02,
            0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
        ],
        Packet::LsRequest(LsRequest {
            hdr: PacketHdr {
                pkt_type: PacketType::LsRequest,
                router_id: Ipv4Addr::new(1, 1, 1, 1),
                area_id: Ipv4Addr::new(0, 0, 0, 0),
            },
            entries: vec![LsaKey {
                lsa_type: LsaType(1),
                adv_rtr: Ipv4Addr::new(2, 2, 2, 2),
                lsa_id: Ipv4Addr::new(2, 2, 2, 2),
            }],
        }),
    )
});

static LSUPDATE1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x04, 0x00, 0x40, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00,
            0x00, 0x00, 0x9d, 0x12, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01,
            0x02, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
            0x80, 0x00, 0x00, 0x01, 0xbc, 0x65, 0x00, 0x24, 0x00, 0x00,
            0x00, 0x01, 0x0a, 0x00, 0x00, 0x02, 0x0a, 0x00, 0x00, 0x02,
            0x02, 0x00, 0x00, 0x0a,
        ],
        Packet::LsUpdate(LsUpdate {
            hdr: PacketHdr {
                pkt_type: PacketType::LsUpdate,
                router_id: Ipv4Addr::new(2, 2, 2, 2),
                area_id: Ipv4Addr::new(0, 0, 0, 0),
            },
            lsas: vec![router_lsa()],
        }),
    )
});

static LSACK1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x05, 0x00, 0x2c, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
            0x00, 0x00, 0xb5, 0x37, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x01, 0x02, 0x02,
            0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x80, 0x00, 0x00, 0x01,
            0xbc, 0x65, 0x00, 0x24,
        ],
        Packet::LsAck(LsAck {
            hdr: PacketHdr {
                pkt_type: PacketType::LsAck,
                router_id: Ipv4Addr::new(1, 1, 1, 1),
                area_id: Ipv4Addr::new(0, 0, 0, 0),
            },
            lsa_hdrs: vec![router_lsa().hdr],
        }),
    )
});

//
// Test LSAs.
//

static ROUTER_LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x02, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
            0x02, 0x02, 0x80, 0x00, 0x00, 0x01, 0xbc, 0x65, 0x00, 0x24,
            0x00, 0x00, 0x00, 0x01, 0x0a, 0x00, 0x00, 0x02, 0x0a, 0x00,
            0x00, 0x02, 0x02, 0x00, 0x00, 0x0a,
        ],
        router_lsa(),
    )
});

static NETWORK_LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x02, 0x02, 0x0a, 0x00, 0x00, 0x02, 0x02, 0x02,
            0x02, 0x02, 0x80, 0x00, 0x00, 0x01, 0x35, 0x05, 0x00, 0x20,
            0xff, 0xff, 0xff, 0x00, 0x01, 0x01, 0x01, 0x01, 0x02, 0x02,
            0x02, 0x02,
        ],
        Lsa::new(
            1,
            Options::E,
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(2, 2, 2, 2),
            0x80000001,
            LsaBody::Network(LsaNetwork {
                mask: Ipv4Addr::new(255, 255, 255, 0),
                attached_rtrs: btreeset![
                    Ipv4Addr::new(1, 1, 1, 1),
                    Ipv4Addr::new(2, 2, 2, 2)
                ],
            }),
        ),
    )
});

static SUMMARY_LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x02, 0x03, 0xac, 0x10, 0x01, 0x00, 0x01, 0x01,
            0x01, 0x01, 0x80, 0x00, 0x00, 0x01, 0xe9, 0x93, 0x00, 0x1c,
            0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x1e,
        ],
        Lsa::new(
            1,
            Options::E,
            Ipv4Addr::new(172, 16, 1, 0),
            Ipv4Addr::new(1, 1, 1, 1),
            0x80000001,
            LsaBody::SummaryNetwork(LsaSummary {
                mask: Ipv4Addr::new(255, 255, 255, 0),
                metric: 30,
            }),
        ),
    )
});

static AS_EXTERNAL_LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x02, 0x05, 0xc0, 0xa8, 0x01, 0x00, 0x02, 0x02,
            0x02, 0x02, 0x80, 0x00, 0x00, 0x01, 0xb2, 0x99, 0x00, 0x24,
            0xff, 0xff, 0xff, 0x00, 0x80, 0x00, 0x00, 0x14, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ],
        Lsa::new(
            1,
            Options::E,
            Ipv4Addr::new(192, 168, 1, 0),
            Ipv4Addr::new(2, 2, 2, 2),
            0x80000001,
            LsaBody::AsExternal(LsaAsExternal {
                mask: Ipv4Addr::new(255, 255, 255, 0),
                flags: LsaAsExternalFlags::E,
                metric: 20,
                fwd_addr: None,
                tag: 0,
            }),
        ),
    )
});

//
// Tests.
//

#[test]
fn test_encode_hello1() {
    let (ref bytes, ref packet) = *HELLO1;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_hello1() {
    let (ref bytes, ref packet) = *HELLO1;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_dbdesc1() {
    let (ref bytes, ref packet) = *DBDESC1;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_dbdesc1() {
    let (ref bytes, ref packet) = *DBDESC1;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_dbdesc2() {
    let (ref bytes, ref packet) = *DBDESC2;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_dbdesc2() {
    let (ref bytes, ref packet) = *DBDESC2;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_lsrequest1() {
    let (ref bytes, ref packet) = *LSREQUEST1;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_lsrequest1() {
    let (ref bytes, ref packet) = *LSREQUEST1;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_lsupdate1() {
    let (ref bytes, ref packet) = *LSUPDATE1;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_lsupdate1() {
    let (ref bytes, ref packet) = *LSUPDATE1;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_lsack1() {
    let (ref bytes, ref packet) = *LSACK1;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_lsack1() {
    let (ref bytes, ref packet) = *LSACK1;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_router_lsa1() {
    let (ref bytes, ref lsa) = *ROUTER_LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_router_lsa1() {
    let (ref bytes, ref lsa) = *ROUTER_LSA1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_encode_network_lsa1() {
    let (ref bytes, ref lsa) = *NETWORK_LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_network_lsa1() {
    let (ref bytes, ref lsa) = *NETWORK_LSA1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_encode_summary_lsa1() {
    let (ref bytes, ref lsa) = *SUMMARY_LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_summary_lsa1() {
    let (ref bytes, ref lsa) = *SUMMARY_LSA1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_encode_as_external_lsa1() {
    let (ref bytes, ref lsa) = *AS_EXTERNAL_LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_as_external_lsa1() {
    let (ref bytes, ref lsa) = *AS_EXTERNAL_LSA1;
    test_decode_lsa(bytes, lsa);
}

//
// Malformed input.
//

#[test]
fn test_decode_bad_version() {
    let (ref bytes, _) = *HELLO1;
    let mut bytes = bytes.clone();
    bytes[0] = 3;
    let mut buf = Bytes::copy_from_slice(&bytes);
    assert!(matches!(
        Packet::decode(&mut buf),
        Err(DecodeError::InvalidVersion(3))
    ));
}

#[test]
fn test_decode_unknown_packet_type() {
    let (ref bytes, _) = *HELLO1;
    let mut bytes = bytes.clone();
    bytes[1] = 9;
    let mut buf = Bytes::copy_from_slice(&bytes);
    assert!(matches!(
        Packet::decode(&mut buf),
        Err(DecodeError::UnknownPacketType(9))
    ));
}

#[test]
fn test_decode_unsupported_auth_type() {
    let (ref bytes, _) = *HELLO1;
    let mut bytes = bytes.clone();
    // AuType = Simple password.
    bytes[15] = 1;
    let mut buf = Bytes::copy_from_slice(&bytes);
    assert!(matches!(
        Packet::decode(&mut buf),
        Err(DecodeError::UnsupportedAuthType(1))
    ));
}

#[test]
fn test_decode_bad_checksum() {
    let (ref bytes, _) = *HELLO1;
    let mut bytes = bytes.clone();
    // Corrupt the Hello priority field.
    bytes[31] = 0xff;
    let mut buf = Bytes::copy_from_slice(&bytes);
    assert!(matches!(
        Packet::decode(&mut buf),
        Err(DecodeError::InvalidChecksum)
    ));
}

#[test]
fn test_decode_truncated() {
    let (ref bytes, _) = *HELLO1;
    let mut buf = Bytes::copy_from_slice(&bytes[..20]);
    assert!(matches!(
        Packet::decode(&mut buf),
        Err(DecodeError::IncompletePacket)
    ));
}
