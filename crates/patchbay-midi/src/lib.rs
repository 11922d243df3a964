//! MIDI bank control for the patchbay controller
//!
//! This crate provides:
//! - The bank control channel: device selection, connection state, and the
//!   bank-recall to Program Change translation (banks 1-32 -> programs 0-31)
//! - A transport trait boundary so tests can script MIDI without hardware
//! - A midir-backed system transport running on a dedicated I/O thread
//! - The persisted configuration document (`midi` section plus passthrough)
//!
//! # Architecture
//!
//! ```text
//! host / CLI → BankChannel → MidiTransport → midi-io thread → midir → device
//! ```
//!
//! Every request to the I/O thread is awaited with a timeout, so a wedged
//! MIDI driver turns into an error instead of a hang. A host without any
//! MIDI backend constructs the channel with no transport and gets mock mode:
//! sends are logged and reported as successful, everything else degrades to
//! empty/disconnected.

mod channel;
mod config;
mod connection;
mod transport;

pub use channel::{BankChannel, ChannelError, ChannelStatus, BANK_COUNT, PROGRAM_MAX};
pub use config::{
    default_config_path, load_config, save_config, AppConfig, MidiSettings, CHANNEL_MAX,
    CHANNEL_MIN,
};
pub use connection::SystemTransport;
pub use transport::{MidiOutputHandle, MidiTransport, TransportError};
