use crossbeam::channel;
use jka_listener::{
    CaptureFrame, CaptureSource, ChannelSink, Direction, FrameRead, Listener, ListenerState, Outcome, PacketSink,
    RawPacket, StopHandle,
};
use parking_lot::Mutex;
use pcap::Linktype;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
const CLIENT_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
const SERVER_PORT: u16 = 29070;

fn server() -> SocketAddr {
    SocketAddr::new(SERVER_IP.into(), SERVER_PORT)
}

// Raw IPv4 frame (DLT_RAW), no link-layer header
fn raw_ipv4_udp(src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let udp_len = 8 + payload.len() as u16;
    let mut frame = vec![0x45, 0x00];
    frame.extend_from_slice(&(20 + udp_len).to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00]);
    frame.extend_from_slice(&src.octets());
    frame.extend_from_slice(&dst.octets());
    frame.extend_from_slice(&src_port.to_be_bytes());
    frame.extend_from_slice(&dst_port.to_be_bytes());
    frame.extend_from_slice(&udp_len.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x00]);
    frame.extend_from_slice(payload);
    frame
}

fn client_frame(payload: &[u8]) -> Vec<u8> {
    raw_ipv4_udp(CLIENT_IP, 61000, SERVER_IP, SERVER_PORT, payload)
}

fn server_frame(payload: &[u8]) -> Vec<u8> {
    raw_ipv4_udp(SERVER_IP, SERVER_PORT, CLIENT_IP, 61000, payload)
}

/// What the source does once its canned frames run out
#[derive(Clone, Copy)]
enum AfterFrames {
    Exhausted,
    Timeout,
    Fail,
    Repeat,
}

/// Starts on an unknown datalink and only offers raw IP as an alternative
struct ScriptedSource {
    linktype: Linktype,
    frames: Vec<Vec<u8>>,
    next: usize,
    after: AfterFrames,
    reads: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(frames: Vec<Vec<u8>>, after: AfterFrames) -> Self {
        Self {
            linktype: Linktype(105),
            frames,
            next: 0,
            after,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl CaptureSource for ScriptedSource {
    fn datalink(&self) -> Linktype {
        self.linktype
    }

    fn supported_datalinks(&self) -> Outcome<Vec<Linktype>> {
        Outcome::success(vec![Linktype(105), Linktype(12)])
    }

    fn set_datalink(&mut self, linktype: Linktype) -> Outcome<()> {
        self.linktype = linktype;
        Outcome::success(())
    }

    fn apply_filter(&mut self, _expression: &str) -> Outcome<()> {
        Outcome::success(())
    }

    fn next_frame(&mut self) -> FrameRead<'_> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        if self.next >= self.frames.len() {
            match self.after {
                AfterFrames::Exhausted => return FrameRead::Exhausted,
                AfterFrames::Fail => return FrameRead::Failed("The interface went down".to_string()),
                AfterFrames::Timeout => {
                    std::thread::sleep(Duration::from_millis(5));
                    return FrameRead::Timeout;
                }
                AfterFrames::Repeat => self.next = 0,
            }
        }

        let index = self.next;
        self.next += 1;
        FrameRead::Frame(CaptureFrame {
            data: &self.frames[index],
            timestamp: index as f64,
        })
    }
}

#[tokio::test]
async fn test_session_forwards_in_arrival_order() {
    let frames = vec![
        client_frame(b"\xff\xff\xff\xffgetchallenge"),
        server_frame(b"\xff\xff\xff\xffchallengeResponse 123"),
        raw_ipv4_udp(Ipv4Addr::new(8, 8, 8, 8), 53, CLIENT_IP, 40000, b"dns"),
        vec![0x45, 0x00, 0x00],
        client_frame(b"\xff\xff\xff\xffconnect"),
    ];

    let (tx, rx) = channel::unbounded();
    let listener = Listener::new(server(), ScriptedSource::new(frames, AfterFrames::Exhausted), ChannelSink::new(tx)).unwrap();
    assert_eq!(listener.datalink(), Linktype(12));

    let clean = listener.start().unwrap().await.unwrap();
    assert!(clean);

    let received: Vec<(Direction, Vec<u8>)> = rx.iter().map(|(d, p)| (d, p.payload)).collect();
    assert_eq!(
        received,
        vec![
            (Direction::FromClient, b"\xff\xff\xff\xffgetchallenge".to_vec()),
            (Direction::FromServer, b"\xff\xff\xff\xffchallengeResponse 123".to_vec()),
            (Direction::FromClient, b"\xff\xff\xff\xffconnect".to_vec()),
        ]
    );

    let stats = listener.stats();
    assert_eq!(stats.frames, 5);
    assert_eq!(stats.forwarded(), 3);
    assert_eq!(stats.dropped(), 2);
}

#[tokio::test]
async fn test_stop_interrupts_idle_loop() {
    let source = ScriptedSource::new(Vec::new(), AfterFrames::Timeout);
    let reads = source.reads.clone();
    let (tx, _rx) = channel::unbounded();
    let listener = Listener::new(server(), source, ChannelSink::new(tx)).unwrap();

    let task = listener.start().unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(listener.state(), ListenerState::Running);
    assert!(reads.load(Ordering::SeqCst) > 0);

    listener.stop();
    let clean = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop did not stop")
        .unwrap();
    assert!(clean);
    assert_eq!(listener.state(), ListenerState::Stopped);
}

/// Stops the listener from inside the sink after the first packet
struct StoppingSink {
    handle: Arc<Mutex<Option<StopHandle>>>,
    forwarded: Arc<AtomicUsize>,
}

impl StoppingSink {
    fn forward(&mut self) {
        self.forwarded.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().as_ref() {
            handle.stop();
        }
    }
}

impl PacketSink for StoppingSink {
    fn on_client_packet(&mut self, _packet: RawPacket) {
        self.forward();
    }

    fn on_server_packet(&mut self, _packet: RawPacket) {
        self.forward();
    }
}

#[tokio::test]
async fn test_no_frames_processed_after_stop() {
    let source = ScriptedSource::new(vec![client_frame(b"a"), server_frame(b"b")], AfterFrames::Repeat);
    let handle = Arc::new(Mutex::new(None));
    let forwarded = Arc::new(AtomicUsize::new(0));
    let sink = StoppingSink {
        handle: handle.clone(),
        forwarded: forwarded.clone(),
    };

    let listener = Listener::new(server(), source, sink).unwrap();
    *handle.lock() = Some(listener.stop_handle());

    let clean = tokio::time::timeout(Duration::from_secs(5), listener.start().unwrap())
        .await
        .expect("loop did not stop")
        .unwrap();
    assert!(clean);
    assert_eq!(forwarded.load(Ordering::SeqCst), 1);
    assert_eq!(listener.stats().frames, 1);
}

#[tokio::test]
async fn test_read_failure_ends_loop_uncleanly() {
    let (tx, rx) = channel::unbounded();
    let source = ScriptedSource::new(vec![server_frame(b"last words")], AfterFrames::Fail);
    let listener = Listener::new(server(), source, ChannelSink::new(tx)).unwrap();

    let clean = listener.start().unwrap().await.unwrap();
    assert!(!clean);
    assert_eq!(listener.state(), ListenerState::Stopped);
    assert_eq!(rx.iter().count(), 1);
}

#[test]
fn test_unknown_datalink_without_alternative_is_fatal() {
    struct WifiOnly;

    impl CaptureSource for WifiOnly {
        fn datalink(&self) -> Linktype {
            Linktype(105)
        }

        fn supported_datalinks(&self) -> Outcome<Vec<Linktype>> {
            Outcome::success(vec![Linktype(105), Linktype(127)])
        }

        fn set_datalink(&mut self, _linktype: Linktype) -> Outcome<()> {
            Outcome::fail("unexpected set")
        }

        fn apply_filter(&mut self, _expression: &str) -> Outcome<()> {
            Outcome::success(())
        }

        fn next_frame(&mut self) -> FrameRead<'_> {
            FrameRead::Exhausted
        }
    }

    let (tx, _rx) = channel::unbounded();
    let err = Listener::new(server(), WifiOnly, ChannelSink::new(tx)).err().unwrap();
    assert_eq!(err.step, "getting supported datalinks");
    assert_eq!(err.message, "no supported datalinks");
}
