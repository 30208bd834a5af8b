//! Line-delimited TCP transport between nodes and the gateway.
//!
//! The gateway listens; each node keeps one bidirectional connection.
//! Upstream lines carry JSON sensor reports, the reverse direction carries
//! broadcast inhibit commands. Partial lines are buffered by the reader,
//! malformed lines are skipped, and a dead connection only ever takes its
//! own node out of the broadcast set; collected metrics are untouched.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::inhibition::InhibitionState;
use crate::message::{self, InhibitCommand, UpstreamMessage};
use crate::node::SpikeSink;

/// Live downstream connections, keyed by node id.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<u32, TcpStream>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, node: u32, writer: TcpStream) {
        self.clients.lock().unwrap().insert(node, writer);
    }

    fn deregister(&self, node: u32) {
        self.clients.lock().unwrap().remove(&node);
    }

    /// Write one inhibit line to every connected node. Writers that fail
    /// are dropped from the set; metrics are unaffected.
    pub fn broadcast(&self, cmd: &InhibitCommand) {
        let line = match message::encode_line(cmd) {
            Ok(line) => line,
            Err(e) => {
                warn!("inhibit command failed to encode: {e}");
                return;
            }
        };
        let mut clients = self.clients.lock().unwrap();
        clients.retain(|node, stream| {
            match stream.write_all(line.as_bytes()).and_then(|_| stream.flush()) {
                Ok(()) => true,
                Err(e) => {
                    warn!("dropping node {node} from broadcast set: {e}");
                    false
                }
            }
        });
    }
}

/// Gateway-side listener for node connections.
pub struct NodeListener {
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
}

impl NodeListener {
    pub fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            registry: Arc::new(ClientRegistry::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept loop. Spawns one reader thread per connection; decoded
    /// messages flow into `tx`. Returns once `stop` flips.
    pub fn serve(&self, tx: SyncSender<UpstreamMessage>, stop: Arc<AtomicBool>) {
        const ACCEPT_PAUSE: Duration = Duration::from_millis(200);
        while !stop.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!("node connection from {peer}");
                    // The listener is non-blocking; the per-connection
                    // reader must not be.
                    if let Err(e) = stream.set_nonblocking(false) {
                        warn!("cannot configure socket for {peer}: {e}");
                        continue;
                    }
                    let tx = tx.clone();
                    let registry = Arc::clone(&self.registry);
                    let stop = Arc::clone(&stop);
                    thread::spawn(move || read_upstream(stream, peer, tx, registry, stop));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_PAUSE),
                Err(e) => {
                    warn!("accept failed: {e}");
                    thread::sleep(ACCEPT_PAUSE);
                }
            }
        }
    }
}

/// Per-connection reader. The connection is registered for broadcast under
/// the first node id seen on it and deregistered on its way out.
fn read_upstream(
    stream: TcpStream,
    peer: SocketAddr,
    tx: SyncSender<UpstreamMessage>,
    registry: Arc<ClientRegistry>,
    stop: Arc<AtomicBool>,
) {
    let reader = match stream.try_clone() {
        Ok(clone) => BufReader::new(clone),
        Err(e) => {
            warn!("cannot clone socket for {peer}: {e}");
            return;
        }
    };
    let mut writer = Some(stream);
    let mut registered: Option<u32> = None;

    for line in reader.lines() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                debug!("read error from {peer}: {e}");
                break;
            }
        };
        let Some(msg) = message::decode_line::<UpstreamMessage>(&line) else {
            continue;
        };
        if registered.is_none()
            && let Some(node) = msg.node
            && let Some(writer) = writer.take()
        {
            registry.register(node, writer);
            registered = Some(node);
        }
        if tx.send(msg).is_err() {
            break; // gateway gone
        }
    }

    if let Some(node) = registered {
        registry.deregister(node);
        info!("node {node} disconnected");
    }
}

/// Node-side connect with a retry window, for supervisors that start the
/// fleet before the gateway finishes binding.
pub fn connect_gateway(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    const RETRY_PAUSE: Duration = Duration::from_millis(200);
    let addr = format!("{host}:{port}");
    let deadline = Instant::now() + timeout;
    loop {
        match TcpStream::connect(&addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                if Instant::now() >= deadline {
                    return Err(e);
                }
                thread::sleep(RETRY_PAUSE);
            }
        }
    }
}

/// Node-side downstream reader: applies broadcast inhibit commands to the
/// node-local inhibition state. Ends when the socket closes.
pub fn spawn_inhibit_reader(
    stream: TcpStream,
    inhibition: Arc<InhibitionState>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let Ok(line) = line else { break };
            let Some(cmd) = message::decode_line::<InhibitCommand>(&line) else {
                continue;
            };
            if !cmd.is_inhibit() {
                continue;
            }
            debug!("inhibit received: beta={} t_inh={}", cmd.beta, cmd.t_inh);
            inhibition.activate(cmd.beta, cmd.t_inh);
        }
    })
}

/// Line-framed sink: one JSON object per `\n`-terminated line.
pub struct LineSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> SpikeSink for LineSink<W> {
    fn deliver(&mut self, msg: &UpstreamMessage) -> io::Result<()> {
        let line = message::encode_line(msg).map_err(io::Error::other)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()
    }
}
