use pcap::{Activated, Capture, Device, Error as PcapError, Linktype};
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;

use crate::config::ListenerConfig;
use crate::datalink::datalink_name;
use crate::error::ListenerError;
use crate::outcome::Outcome;

/// One frame as delivered by the capture source
#[derive(Debug, Clone, Copy)]
pub struct CaptureFrame<'a> {
    pub data: &'a [u8],
    pub timestamp: f64,
}

/// Result of a single blocking read
#[derive(Debug)]
pub enum FrameRead<'a> {
    Frame(CaptureFrame<'a>),
    /// Read timeout expired without a frame
    Timeout,
    /// Offline source reached its end
    Exhausted,
    Failed(String),
}

/// The packet-capture facility a listener reads from.
pub trait CaptureSource: Send + 'static {
    fn datalink(&self) -> Linktype;

    fn supported_datalinks(&self) -> Outcome<Vec<Linktype>>;

    fn set_datalink(&mut self, linktype: Linktype) -> Outcome<()>;

    fn apply_filter(&mut self, expression: &str) -> Outcome<()>;

    /// Blocks until a frame arrives or the read timeout expires.
    fn next_frame(&mut self) -> FrameRead<'_>;

    /// Frames the kernel dropped so far, when the source can tell.
    fn kernel_drops(&mut self) -> Option<u32> {
        None
    }
}

/// libpcap-backed capture source for live devices and saved files
pub struct PcapSource {
    capture: Capture<dyn Activated>,
    live: bool,
}

impl PcapSource {
    pub fn open_live(config: &ListenerConfig) -> Result<Self, ListenerError> {
        // libpcap reads with a zero timeout block until a frame arrives, which
        // would keep the loop from ever seeing a stop request
        if config.read_timeout_ms <= 0 {
            return Err(ListenerError::new("opening capture device", "read timeout must be positive"));
        }

        let device = match &config.device {
            Some(name) => Device::from(name.as_str()),
            None => Device::lookup()
                .map_err(|e| ListenerError::new("looking up default device", e.to_string()))?
                .ok_or_else(|| ListenerError::new("looking up default device", "no capture device available"))?,
        };
        let device_name = device.name.clone();

        let capture = Capture::from_device(device)
            .and_then(|inactive| {
                inactive
                    .promisc(config.promiscuous)
                    .snaplen(config.snaplen)
                    .timeout(config.read_timeout_ms)
                    .immediate_mode(config.immediate_mode)
                    .open()
            })
            .map_err(|e| ListenerError::new("opening capture device", format!("{}: {}", device_name, e)))?;

        debug!(
            "Opened capture device {} (datalink {})",
            device_name,
            datalink_name(capture.get_datalink())
        );

        Ok(Self {
            capture: capture.into(),
            live: true,
        })
    }

    pub fn open_file(path: &Path) -> Result<Self, ListenerError> {
        let capture = Capture::from_file(path).map_err(|e| {
            ListenerError::new("opening capture file", format!("{}: {}", path.display(), e))
        })?;

        debug!("Opened capture file {}", path.display());

        Ok(Self {
            capture: capture.into(),
            live: false,
        })
    }
}

impl CaptureSource for PcapSource {
    fn datalink(&self) -> Linktype {
        self.capture.get_datalink()
    }

    fn supported_datalinks(&self) -> Outcome<Vec<Linktype>> {
        match self.capture.list_datalinks() {
            Ok(datalinks) => Outcome::success(datalinks),
            Err(e) => Outcome::fail(e.to_string()),
        }
    }

    fn set_datalink(&mut self, linktype: Linktype) -> Outcome<()> {
        if let Err(e) = self.capture.set_datalink(linktype) {
            return Outcome::fail(e.to_string());
        }
        Outcome::success_on_predicate_lazy(
            self.capture.get_datalink(),
            |current| {
                format!(
                    "datalink is {} after requesting {}",
                    datalink_name(*current),
                    datalink_name(linktype)
                )
            },
            |current| *current == linktype,
        )
        .map(|_| ())
    }

    fn apply_filter(&mut self, expression: &str) -> Outcome<()> {
        match self.capture.filter(expression, true) {
            Ok(()) => Outcome::success(()),
            Err(e) => Outcome::fail(format!("{}: {}", expression, e)),
        }
    }

    fn next_frame(&mut self) -> FrameRead<'_> {
        match self.capture.next_packet() {
            Ok(packet) => {
                let timestamp = packet.header.ts.tv_sec as f64 + packet.header.ts.tv_usec as f64 / 1_000_000.0;
                FrameRead::Frame(CaptureFrame {
                    data: packet.data,
                    timestamp,
                })
            }
            Err(PcapError::TimeoutExpired) => FrameRead::Timeout,
            Err(PcapError::NoMorePackets) => FrameRead::Exhausted,
            Err(e) => FrameRead::Failed(e.to_string()),
        }
    }

    fn kernel_drops(&mut self) -> Option<u32> {
        if !self.live {
            return None;
        }
        self.capture.stats().ok().map(|stats| stats.dropped.saturating_add(stats.if_dropped))
    }
}

/// A capture device and the addresses bound to it
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub description: Option<String>,
    pub addresses: Vec<IpAddr>,
}

pub fn list_interfaces() -> Result<Vec<InterfaceInfo>, ListenerError> {
    let devices = Device::list().map_err(|e| ListenerError::new("listing capture devices", e.to_string()))?;

    Ok(devices
        .into_iter()
        .map(|device| InterfaceInfo {
            name: device.name,
            description: device.desc,
            addresses: device.addresses.iter().map(|a| a.addr).collect(),
        })
        .collect())
}
