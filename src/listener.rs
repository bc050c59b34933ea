use parking_lot::Mutex;
use pcap::Linktype;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::capture::{CaptureFrame, CaptureSource, FrameRead, PcapSource};
use crate::config::ListenerConfig;
use crate::datalink::{datalink_name, ensure_known_datalink};
use crate::direction::{Direction, classify};
use crate::error::ListenerError;
use crate::filter::build_filter;
use crate::outcome::Outcome;
use crate::packet::{RawPacket, parse_frame};
use crate::sink::PacketSink;
use crate::stats::{ListenerStats, StatsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ListenerState::Idle,
            1 => ListenerState::Running,
            2 => ListenerState::Stopping,
            _ => ListenerState::Stopped,
        }
    }
}

/// Requests the capture loop to stop. Cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct StopHandle {
    stop_requested: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
}

impl StopHandle {
    /// Returns immediately; the loop notices the request before its next
    /// frame or when the current read times out.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);

        // A listener that never ran goes straight to Stopped
        if self
            .state
            .compare_exchange(
                ListenerState::Idle as u8,
                ListenerState::Stopped as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            let _ = self.state.compare_exchange(
                ListenerState::Running as u8,
                ListenerState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

/// Passive listener for the traffic of one game server
pub struct Listener<C, S> {
    server: SocketAddr,
    linktype: Linktype,
    session: Mutex<Option<(C, S)>>,
    handle: StopHandle,
    stats: Arc<ListenerStats>,
}

impl<C, S> Listener<C, S>
where
    C: CaptureSource,
    S: PacketSink,
{
    /// Negotiates a known datalink on `source` and restricts it to the
    /// server's traffic.
    pub fn new(server: SocketAddr, mut source: C, sink: S) -> Result<Self, ListenerError> {
        // The filter is compiled for the current datalink, so negotiate first
        let linktype = ensure_known_datalink(&mut source)?;

        let filter = build_filter(server.ip(), server.port());
        source.apply_filter(&filter).into_result("installing capture filter")?;

        debug!("Installed capture filter: {}", filter);
        info!("Listening for {} (datalink {})", server, datalink_name(linktype));

        Ok(Self {
            server,
            linktype,
            session: Mutex::new(Some((source, sink))),
            handle: StopHandle {
                stop_requested: Arc::new(AtomicBool::new(false)),
                state: Arc::new(AtomicU8::new(ListenerState::Idle as u8)),
            },
            stats: Arc::new(ListenerStats::default()),
        })
    }

    /// Starts the capture loop on a blocking task. Can only succeed once.
    ///
    /// The task resolves to `true` when the loop ended cleanly (stop request
    /// or end of a capture file) and `false` when reading failed.
    pub fn start(&self) -> Result<JoinHandle<bool>, ListenerError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ListenerError::new("starting capture loop", e.to_string()))?;

        if let Err(current) = self.handle.state.compare_exchange(
            ListenerState::Idle as u8,
            ListenerState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            let message = match ListenerState::from_u8(current) {
                ListenerState::Stopped if self.session.lock().is_some() => "listener was stopped before starting",
                _ => "capture loop already started",
            };
            return Err(ListenerError::new("starting capture loop", message));
        }

        let Some((source, sink)) = self.session.lock().take() else {
            return Err(ListenerError::new("starting capture loop", "capture loop already started"));
        };

        let context = LoopContext {
            server: self.server,
            linktype: self.linktype,
            handle: self.handle.clone(),
            stats: self.stats.clone(),
        };

        info!("Starting capture loop for {}", self.server);
        Ok(runtime.spawn_blocking(move || run_capture_loop(source, sink, context)))
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.handle.state.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn datalink(&self) -> Linktype {
        self.linktype
    }
}

impl<S> Listener<PcapSource, S>
where
    S: PacketSink,
{
    /// Opens a live capture on the configured device.
    pub fn open(config: &ListenerConfig, sink: S) -> Result<Self, ListenerError> {
        let source = PcapSource::open_live(config)?;
        Self::new(config.server, source, sink)
    }

    /// Reads frames from a saved capture file instead of a device.
    pub fn open_file(path: &Path, server: SocketAddr, sink: S) -> Result<Self, ListenerError> {
        let source = PcapSource::open_file(path)?;
        Self::new(server, source, sink)
    }
}

struct LoopContext {
    server: SocketAddr,
    linktype: Linktype,
    handle: StopHandle,
    stats: Arc<ListenerStats>,
}

// Marks the listener Stopped however the blocking task ends, including
// cancellation before the loop ran.
impl Drop for LoopContext {
    fn drop(&mut self) {
        self.handle.state.store(ListenerState::Stopped as u8, Ordering::SeqCst);
    }
}

fn run_capture_loop<C, S>(mut source: C, mut sink: S, context: LoopContext) -> bool
where
    C: CaptureSource,
    S: PacketSink,
{
    let start_time = Instant::now();

    let clean = loop {
        if context.handle.is_stop_requested() {
            debug!("Stop requested, leaving capture loop");
            break true;
        }

        match source.next_frame() {
            FrameRead::Frame(frame) => {
                // Frames read after the stop request are not processed
                if context.handle.is_stop_requested() {
                    debug!("Stop requested, leaving capture loop");
                    break true;
                }
                dispatch_frame(&frame, &context, &mut sink);
            }
            FrameRead::Timeout => continue,
            FrameRead::Exhausted => {
                debug!("Capture source exhausted");
                break true;
            }
            FrameRead::Failed(message) => {
                warn!("Capture read failed: {}", message);
                break false;
            }
        }
    };

    if let Some(dropped) = source.kernel_drops() {
        let check = Outcome::success_on_zero_lazy(dropped, |d| format!("Kernel dropped {} frames during capture", d));
        if !check.is_success() {
            warn!("{}", check.error_message());
        }
    }

    log_summary(&context, start_time.elapsed().as_secs_f64());
    clean
}

fn dispatch_frame<S: PacketSink>(frame: &CaptureFrame<'_>, context: &LoopContext, sink: &mut S) {
    context.stats.record_frame();

    let Some(datagram) = parse_frame(context.linktype, frame.data) else {
        trace!("Dropping malformed frame ({} bytes)", frame.data.len());
        context.stats.record_malformed();
        return;
    };

    let direction = classify(&datagram, context.server);
    match direction {
        Direction::FromClient => {
            context.stats.record_forwarded(direction, datagram.payload.len());
            sink.on_client_packet(RawPacket::new(&datagram, frame.timestamp));
        }
        Direction::FromServer => {
            context.stats.record_forwarded(direction, datagram.payload.len());
            sink.on_server_packet(RawPacket::new(&datagram, frame.timestamp));
        }
        Direction::NotRelated => {
            trace!("Dropping unrelated datagram {} -> {}", datagram.source, datagram.destination);
            context.stats.record_unrelated();
        }
    }
}

fn log_summary(context: &LoopContext, elapsed: f64) {
    let stats = context.stats.snapshot();
    info!("======= CAPTURE SUMMARY =======");
    info!("Server: {}", context.server);
    info!("Capture time: {:.2} seconds", elapsed);
    info!("Frames seen: {}", stats.frames);
    info!("From clients: {} packets ({} bytes)", stats.client_packets, stats.client_bytes);
    info!("From server: {} packets ({} bytes)", stats.server_packets, stats.server_bytes);
    info!("Dropped: {} malformed, {} unrelated", stats.malformed, stats.unrelated);
    info!("===============================");
}
