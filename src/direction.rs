use pcap::Linktype;
use std::net::SocketAddr;

use crate::packet::{UdpDatagram, parse_frame};

/// Which side of the server conversation a datagram belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    FromClient,
    FromServer,
    NotRelated,
}

/// Classifies by the server side only. Clients are arbitrary, so anything
/// sent to the server counts as client traffic.
pub fn classify(datagram: &UdpDatagram<'_>, server: SocketAddr) -> Direction {
    if datagram.source == server {
        Direction::FromServer
    } else if datagram.destination == server {
        Direction::FromClient
    } else {
        Direction::NotRelated
    }
}

/// Parses and classifies a raw frame in one go. Malformed frames are
/// `NotRelated` and come back without a datagram.
pub fn classify_frame(linktype: Linktype, frame: &[u8], server: SocketAddr) -> (Direction, Option<UdpDatagram<'_>>) {
    match parse_frame(linktype, frame) {
        Some(datagram) => (classify(&datagram, server), Some(datagram)),
        None => (Direction::NotRelated, None),
    }
}
