use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use bytes::Bytes;
use choreo_stream::{encode_message, CuffScene, Hello, MessageKind, PlaySound, SceneMark};
use serde::Serialize;
use thiserror::Error;

use crate::host::SoundBroadcaster;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream worker disconnected")]
    Disconnected,
    #[error("message encode failed: {0}")]
    Encode(#[from] choreo_stream::ProtocolError),
    #[error("scene mark payload: {0}")]
    Payload(#[from] serde_json::Error),
}

const POLL_INTERVAL: Duration = Duration::from_millis(16);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(200);

enum Command {
    Send(Bytes),
    Shutdown,
}

/// Broadcasts ChoreoStream messages to a single connected subscriber.
pub struct StreamServer {
    sender: Sender<Command>,
    start: Instant,
    seq: AtomicU64,
}

impl StreamServer {
    pub fn bind<A: ToSocketAddrs>(addr: A, build: Option<String>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).context("binding stream socket")?;
        listener
            .set_nonblocking(true)
            .context("setting stream listener non-blocking")?;
        let (tx, rx) = mpsc::channel();
        let build_info = build.unwrap_or_else(|| "dev".to_string());
        thread::Builder::new()
            .name("choreo_stream".to_string())
            .spawn(move || worker_loop(listener, rx, build_info))
            .context("spawning stream worker thread")?;
        Ok(Self {
            sender: tx,
            start: Instant::now(),
            seq: AtomicU64::new(0),
        })
    }

    pub fn send_sound(&self, sound: PlaySound) -> Result<(), StreamError> {
        self.send(MessageKind::PlaySound, &sound)
    }

    /// Relays a cuff scene to the subject's client.
    pub fn send_cuff_scene(&self, scene: &CuffScene) -> Result<(), StreamError> {
        self.send(MessageKind::CuffScene, scene)
    }

    pub fn send_mark<T: Serialize>(&self, scene: &str, phase: &str, data: &T) -> Result<(), StreamError> {
        let mark = SceneMark {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            host_time_ns: self.start.elapsed().as_nanos() as u64,
            scene: scene.to_string(),
            phase: phase.to_string(),
            data: serde_json::to_value(data)?,
        };
        self.send(MessageKind::SceneMark, &mark)
    }

    fn send<T: Serialize>(&self, kind: MessageKind, payload: &T) -> Result<(), StreamError> {
        let bytes = encode_message(kind, payload)?;
        self.sender
            .send(Command::Send(bytes))
            .map_err(|_| StreamError::Disconnected)
    }
}

impl SoundBroadcaster for StreamServer {
    fn play_within_distance(&self, sound: &str, distance_threshold: f32, volume: f32) {
        let message = PlaySound {
            sound: sound.to_string(),
            distance_threshold,
            volume,
            origin: None,
        };
        if let Err(err) = self.send_sound(message) {
            log::warn!("sound broadcast dropped: {err}");
        }
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

/// The one connected observer, greeted with a `Hello` on accept.
struct Subscriber {
    conn: TcpStream,
    addr: SocketAddr,
}

impl Subscriber {
    fn accept(listener: &TcpListener, build_info: &str) -> Option<Self> {
        let (mut conn, addr) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return None,
            Err(err) => {
                log::warn!("stream accept error: {err}");
                thread::sleep(ACCEPT_BACKOFF);
                return None;
            }
        };
        if let Err(err) = conn.set_nodelay(true) {
            log::warn!("dropping stream subscriber {addr}: {err}");
            return None;
        }

        let hello = Hello::new("choreo_engine", Some(build_info.to_string()));
        let greeting = match encode_message(MessageKind::Hello, &hello) {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("encoding stream hello: {err}");
                return None;
            }
        };
        if let Err(err) = conn.write_all(&greeting) {
            log::warn!("stream handshake with {addr} failed: {err}");
            return None;
        }
        log::info!("stream subscriber connected from {addr}");
        Some(Self { conn, addr })
    }

    fn deliver(&mut self, frame: &[u8]) -> io::Result<()> {
        self.conn.write_all(frame)
    }
}

fn worker_loop(listener: TcpListener, rx: Receiver<Command>, build_info: String) {
    let mut subscriber: Option<Subscriber> = None;
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Command::Send(frame)) => {
                // Frames sent before anyone connects are dropped.
                if let Some(active) = subscriber.as_mut() {
                    if let Err(err) = active.deliver(&frame) {
                        log::warn!("stream subscriber {} lost: {err}", active.addr);
                        subscriber = None;
                    }
                }
            }
            Ok(Command::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        if subscriber.is_none() {
            subscriber = Subscriber::accept(&listener, &build_info);
        }
    }
}
