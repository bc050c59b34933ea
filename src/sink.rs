use crossbeam::channel::Sender;
use tracing::warn;

use crate::direction::Direction;
use crate::packet::RawPacket;

/// Downstream protocol handling. Both methods are called from the capture
/// loop, one packet at a time, in frame arrival order.
pub trait PacketSink: Send + 'static {
    fn on_client_packet(&mut self, packet: RawPacket);

    fn on_server_packet(&mut self, packet: RawPacket);
}

/// Hands packets to a consumer on another thread
pub struct ChannelSink {
    sender: Sender<(Direction, RawPacket)>,
    disconnected: bool,
}

impl ChannelSink {
    pub fn new(sender: Sender<(Direction, RawPacket)>) -> Self {
        Self {
            sender,
            disconnected: false,
        }
    }

    fn forward(&mut self, direction: Direction, packet: RawPacket) {
        if self.disconnected {
            return;
        }
        if self.sender.send((direction, packet)).is_err() {
            warn!("Packet consumer went away, discarding further packets");
            self.disconnected = true;
        }
    }
}

impl PacketSink for ChannelSink {
    fn on_client_packet(&mut self, packet: RawPacket) {
        self.forward(Direction::FromClient, packet);
    }

    fn on_server_packet(&mut self, packet: RawPacket) {
        self.forward(Direction::FromServer, packet);
    }
}
