//! midir-backed system transport
//!
//! Uses midir for cross-platform MIDI I/O (ALSA on Linux, CoreMIDI on macOS,
//! WinMM on Windows). All midir objects live on one dedicated I/O thread;
//! requests cross a bounded channel with a submission deadline and every
//! reply is awaited with a timeout, so a wedged driver call cannot hang a
//! caller, even once the request queue has filled.

use std::time::Duration;

use flume::{Receiver, Sender};
use midir::{MidiOutput, MidiOutputConnection};

use crate::transport::{MidiOutputHandle, MidiTransport, TransportError};

/// How long a caller waits on the I/O thread before giving up
const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Client names midir registers with the OS MIDI service
const CLIENT_PROBE: &str = "patchbay-probe";
const CLIENT_LIST: &str = "patchbay-list";
const CLIENT_OUT: &str = "patchbay-out";

enum IoRequest {
    Enumerate {
        reply: Sender<Result<Vec<String>, TransportError>>,
    },
    Open {
        port_name: String,
        reply: Sender<Result<u64, TransportError>>,
    },
    Send {
        generation: u64,
        message: Vec<u8>,
        reply: Sender<Result<(), TransportError>>,
    },
    Close {
        generation: u64,
    },
}

/// MIDI transport backed by the host's MIDI service
///
/// `spawn` probes the service once; hosts without a usable MIDI backend get
/// an `Init` error and the caller falls back to mock mode. Dropping the
/// transport (and any handles) shuts the I/O thread down.
pub struct SystemTransport {
    request_tx: Sender<IoRequest>,
}

impl SystemTransport {
    /// Spawn the I/O thread and probe the MIDI service once
    pub fn spawn() -> Result<Self, TransportError> {
        let (request_tx, request_rx) = flume::bounded(16);
        let (probe_tx, probe_rx) = flume::bounded(1);

        std::thread::Builder::new()
            .name("midi-io".into())
            .spawn(move || run_io_thread(request_rx, probe_tx))
            .map_err(|e| TransportError::Init(e.to_string()))?;

        match probe_rx.recv_timeout(IO_TIMEOUT) {
            Ok(Ok(())) => Ok(Self { request_tx }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Timeout("probe")),
        }
    }
}

impl MidiTransport for SystemTransport {
    fn enumerate(&self) -> Result<Vec<String>, TransportError> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        submit(
            &self.request_tx,
            IoRequest::Enumerate { reply: reply_tx },
            "enumerate",
        )?;
        await_reply(&reply_rx, "enumerate")
    }

    fn open(&mut self, name: &str) -> Result<Box<dyn MidiOutputHandle>, TransportError> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        submit(
            &self.request_tx,
            IoRequest::Open {
                port_name: name.to_string(),
                reply: reply_tx,
            },
            "open",
        )?;
        let generation = await_reply(&reply_rx, "open")?;

        Ok(Box::new(SystemOutputHandle {
            request_tx: self.request_tx.clone(),
            generation,
        }))
    }
}

/// Handle to the I/O thread's currently open connection
struct SystemOutputHandle {
    request_tx: Sender<IoRequest>,
    /// Which open this handle belongs to; a reopened connection invalidates it
    generation: u64,
}

impl MidiOutputHandle for SystemOutputHandle {
    fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        submit(
            &self.request_tx,
            IoRequest::Send {
                generation: self.generation,
                message: message.to_vec(),
                reply: reply_tx,
            },
            "send",
        )?;
        await_reply(&reply_rx, "send")
    }
}

impl Drop for SystemOutputHandle {
    fn drop(&mut self) {
        // Best-effort: a full queue or a dead worker both mean this close
        // cannot matter anymore (a later open supersedes the generation)
        let _ = self.request_tx.try_send(IoRequest::Close {
            generation: self.generation,
        });
    }
}

/// Queue a request for the I/O thread, bounding the wait with `IO_TIMEOUT`.
///
/// A worker wedged inside a driver call stops draining the queue; once the
/// queue is full, callers must get `Timeout` instead of parking forever.
fn submit(
    request_tx: &Sender<IoRequest>,
    request: IoRequest,
    op: &'static str,
) -> Result<(), TransportError> {
    match request_tx.send_timeout(request, IO_TIMEOUT) {
        Ok(()) => Ok(()),
        Err(flume::SendTimeoutError::Timeout(_)) => Err(TransportError::Timeout(op)),
        Err(flume::SendTimeoutError::Disconnected(_)) => Err(TransportError::WorkerGone),
    }
}

/// Wait for the I/O thread's reply, bounding the wait with `IO_TIMEOUT`
fn await_reply<T>(
    reply_rx: &Receiver<Result<T, TransportError>>,
    op: &'static str,
) -> Result<T, TransportError> {
    match reply_rx.recv_timeout(IO_TIMEOUT) {
        Ok(result) => result,
        Err(flume::RecvTimeoutError::Timeout) => Err(TransportError::Timeout(op)),
        Err(flume::RecvTimeoutError::Disconnected) => Err(TransportError::WorkerGone),
    }
}

/// State owned by the I/O thread: at most one open connection, tagged with a
/// generation so a stale handle cannot talk to a replacement connection
struct IoState {
    connection: Option<(u64, MidiOutputConnection)>,
    next_generation: u64,
}

fn run_io_thread(request_rx: Receiver<IoRequest>, probe_tx: Sender<Result<(), TransportError>>) {
    // Probe once so the spawner learns whether a MIDI backend exists at all
    match MidiOutput::new(CLIENT_PROBE) {
        Ok(_) => {
            let _ = probe_tx.send(Ok(()));
        }
        Err(e) => {
            let _ = probe_tx.send(Err(TransportError::Init(e.to_string())));
            return;
        }
    }

    let mut state = IoState {
        connection: None,
        next_generation: 1,
    };

    log::debug!("MIDI: I/O thread started");

    while let Ok(request) = request_rx.recv() {
        match request {
            IoRequest::Enumerate { reply } => {
                let _ = reply.send(enumerate_outputs());
            }
            IoRequest::Open { port_name, reply } => {
                let _ = reply.send(open_output(&mut state, &port_name));
            }
            IoRequest::Send {
                generation,
                message,
                reply,
            } => {
                let _ = reply.send(send_message(&mut state, generation, &message));
            }
            IoRequest::Close { generation } => {
                let is_current = matches!(&state.connection, Some((g, _)) if *g == generation);
                if is_current {
                    state.connection = None;
                    log::debug!("MIDI: Output port closed");
                }
            }
        }
    }

    log::debug!("MIDI: I/O thread shutting down");
}

fn enumerate_outputs() -> Result<Vec<String>, TransportError> {
    let midi_out =
        MidiOutput::new(CLIENT_LIST).map_err(|e| TransportError::Enumerate(e.to_string()))?;

    let ports: Vec<String> = midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect();

    Ok(ports)
}

fn open_output(state: &mut IoState, port_name: &str) -> Result<u64, TransportError> {
    let midi_out = MidiOutput::new(CLIENT_OUT).map_err(|e| TransportError::Init(e.to_string()))?;

    let ports = midi_out.ports();
    let port = ports
        .iter()
        .find(|port| {
            midi_out
                .port_name(port)
                .map(|name| name == port_name)
                .unwrap_or(false)
        })
        .ok_or_else(|| TransportError::Open(port_name.to_string(), "no such port".to_string()))?;

    let connection = midi_out
        .connect(port, CLIENT_OUT)
        .map_err(|e| TransportError::Open(port_name.to_string(), e.to_string()))?;

    let generation = state.next_generation;
    state.next_generation += 1;
    // Replacing an existing connection drops (closes) it
    state.connection = Some((generation, connection));

    log::debug!("MIDI: Opened output port '{}'", port_name);
    Ok(generation)
}

fn send_message(
    state: &mut IoState,
    generation: u64,
    message: &[u8],
) -> Result<(), TransportError> {
    match &mut state.connection {
        Some((current, connection)) if *current == generation => connection
            .send(message)
            .map_err(|e| TransportError::Send(e.to_string())),
        _ => Err(TransportError::Stale),
    }
}
