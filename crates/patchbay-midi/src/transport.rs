//! MIDI transport boundary
//!
//! The channel talks to the outside world through these traits so that
//! transport failures are visible `Result` branches instead of swallowed
//! exceptions, and so tests can script a transport without real hardware.

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to initialize MIDI output: {0}")]
    Init(String),

    #[error("Failed to enumerate MIDI outputs: {0}")]
    Enumerate(String),

    #[error("Failed to open MIDI output '{0}': {1}")]
    Open(String, String),

    #[error("Failed to send MIDI message: {0}")]
    Send(String),

    #[error("MIDI I/O request timed out: {0}")]
    Timeout(&'static str),

    #[error("MIDI I/O worker is gone")]
    WorkerGone,

    #[error("MIDI output handle is stale (connection was replaced)")]
    Stale,
}

/// Access to the host's MIDI outputs.
///
/// `enumerate` must return ports in a stable order within one process so
/// "first output" auto-selection is deterministic.
pub trait MidiTransport: Send {
    /// Names of the currently available output ports
    fn enumerate(&self) -> Result<Vec<String>, TransportError>;

    /// Open the output port with exactly the given name
    fn open(&mut self, name: &str) -> Result<Box<dyn MidiOutputHandle>, TransportError>;
}

/// An open MIDI output. Closing is `Drop`; close failures are the
/// implementation's problem and never surface to the channel.
pub trait MidiOutputHandle: Send {
    /// Send one raw MIDI message
    fn send(&mut self, message: &[u8]) -> Result<(), TransportError>;
}
