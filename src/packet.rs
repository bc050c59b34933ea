use pcap::Linktype;
use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::udp::UdpPacket;
use std::net::{IpAddr, SocketAddr};

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const LOOPBACK_HEADER_LEN: usize = 4;
const LINUX_SLL_HEADER_LEN: usize = 16;
const IPV6_HEADER_LEN: usize = 40;
const UDP_HEADER_LEN: usize = 8;
const MORE_FRAGMENTS: u8 = 0b001;

/// Zero-copy view of one UDP datagram inside a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpDatagram<'a> {
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub payload: &'a [u8],
}

/// Owned UDP payload handed to the protocol stack
#[derive(Debug, Clone, PartialEq)]
pub struct RawPacket {
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub timestamp: f64,       // Capture time (seconds since epoch)
    pub payload: Vec<u8>,
}

impl RawPacket {
    pub fn new(datagram: &UdpDatagram<'_>, timestamp: f64) -> Self {
        Self {
            source: datagram.source,
            destination: datagram.destination,
            timestamp,
            payload: datagram.payload.to_vec(),
        }
    }
}

/// Parses a raw link-layer frame down to its UDP payload.
///
/// Returns `None` for anything that is not a well-formed, unfragmented
/// UDP datagram over IPv4 or IPv6 in one of the recognised framings.
pub fn parse_frame(linktype: Linktype, frame: &[u8]) -> Option<UdpDatagram<'_>> {
    let ip = strip_link_layer(linktype, frame)?;
    match ip.first()? >> 4 {
        4 => parse_ipv4(ip),
        6 => parse_ipv6(ip),
        _ => None,
    }
}

fn strip_link_layer(linktype: Linktype, frame: &[u8]) -> Option<&[u8]> {
    match linktype.0 {
        // DLT_EN10MB
        1 => strip_ethernet(frame),
        // DLT_NULL / DLT_LOOP: 4-byte address family
        0 | 108 => frame.get(LOOPBACK_HEADER_LEN..),
        // DLT_LINUX_SLL
        113 => frame.get(LINUX_SLL_HEADER_LEN..),
        // DLT_RAW (12, 14 on OpenBSD), LINKTYPE_RAW, DLT_IPV4, DLT_IPV6
        12 | 14 | 101 | 228 | 229 => Some(frame),
        _ => None,
    }
}

fn strip_ethernet(frame: &[u8]) -> Option<&[u8]> {
    let ethernet = EthernetPacket::new(frame)?;
    let mut ethertype = ethernet.get_ethertype();
    let mut offset = ETHERNET_HEADER_LEN;

    // Single 802.1Q tag
    if ethertype == EtherTypes::Vlan {
        let inner = frame.get(offset + 2..offset + VLAN_TAG_LEN)?;
        ethertype = EtherType(u16::from_be_bytes([inner[0], inner[1]]));
        offset += VLAN_TAG_LEN;
    }

    if ethertype == EtherTypes::Ipv4 || ethertype == EtherTypes::Ipv6 {
        frame.get(offset..)
    } else {
        None
    }
}

fn parse_ipv4(ip: &[u8]) -> Option<UdpDatagram<'_>> {
    let header = Ipv4Packet::new(ip)?;
    let header_len = header.get_header_length() as usize * 4;
    let total_len = header.get_total_length() as usize;

    if header.get_version() != 4 || header_len < 20 || total_len < header_len || total_len > ip.len() {
        return None;
    }
    if header.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
        return None;
    }
    // Fragments are not reassembled here
    if header.get_fragment_offset() != 0 || header.get_flags() & MORE_FRAGMENTS != 0 {
        return None;
    }

    parse_udp(
        &ip[header_len..total_len],
        IpAddr::V4(header.get_source()),
        IpAddr::V4(header.get_destination()),
    )
}

fn parse_ipv6(ip: &[u8]) -> Option<UdpDatagram<'_>> {
    let header = Ipv6Packet::new(ip)?;
    let end = IPV6_HEADER_LEN + header.get_payload_length() as usize;

    if header.get_version() != 6 || end > ip.len() {
        return None;
    }
    // Extension headers are not walked
    if header.get_next_header() != IpNextHeaderProtocols::Udp {
        return None;
    }

    parse_udp(
        &ip[IPV6_HEADER_LEN..end],
        IpAddr::V6(header.get_source()),
        IpAddr::V6(header.get_destination()),
    )
}

fn parse_udp(segment: &[u8], src_ip: IpAddr, dst_ip: IpAddr) -> Option<UdpDatagram<'_>> {
    let udp = UdpPacket::new(segment)?;
    let udp_len = udp.get_length() as usize;
    if udp_len < UDP_HEADER_LEN || udp_len > segment.len() {
        return None;
    }

    Some(UdpDatagram {
        source: SocketAddr::new(src_ip, udp.get_source()),
        destination: SocketAddr::new(dst_ip, udp.get_destination()),
        payload: &segment[UDP_HEADER_LEN..udp_len],
    })
}
