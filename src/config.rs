use std::net::SocketAddr;

pub const DEFAULT_SNAPLEN: i32 = 65535;
pub const DEFAULT_READ_TIMEOUT_MS: i32 = 100;

/// Settings for a live capture session
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerConfig {
    /// Capture device name; `None` picks the system default device
    pub device: Option<String>,
    pub server: SocketAddr,
    pub snaplen: i32,
    pub promiscuous: bool,
    /// Upper bound on how long a blocking read waits before the loop
    /// re-checks for a stop request
    pub read_timeout_ms: i32,
    pub immediate_mode: bool,
}

impl ListenerConfig {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            device: None,
            server,
            snaplen: DEFAULT_SNAPLEN,
            promiscuous: true,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            immediate_mode: true,
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }
}
