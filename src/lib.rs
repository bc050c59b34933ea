//! Capture-and-classify front end for passively observing a UDP game server.
//!
//! A [`Listener`] reads frames from a [`CaptureSource`] restricted to one
//! server endpoint, splits them into client and server traffic and hands the
//! UDP payloads to a [`PacketSink`].

pub mod capture;
pub mod config;
pub mod datalink;
pub mod direction;
pub mod error;
pub mod filter;
pub mod listener;
pub mod outcome;
pub mod packet;
pub mod sink;
pub mod stats;

pub use capture::{CaptureFrame, CaptureSource, FrameRead, PcapSource};
pub use config::ListenerConfig;
pub use direction::{Direction, classify, classify_frame};
pub use error::{ListenerError, OutcomeError};
pub use filter::build_filter;
pub use listener::{Listener, ListenerState, StopHandle};
pub use outcome::Outcome;
pub use packet::{RawPacket, UdpDatagram, parse_frame};
pub use sink::{ChannelSink, PacketSink};
pub use stats::StatsSnapshot;
