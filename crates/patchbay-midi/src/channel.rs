//! Bank control channel
//!
//! Owns the logical connection to the patchbay's MIDI input and translates
//! bank-recall requests into Program Change messages: banks 1-32 map to
//! programs 0-31, the one protocol fact the device cares about.
//!
//! The channel degrades gracefully. Constructed without a transport it runs
//! in mock mode: sends are logged and reported as successful so the rest of
//! the application stays usable on machines with no MIDI backend at all.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::{load_config, save_config, AppConfig, CHANNEL_MAX, CHANNEL_MIN};
use crate::transport::{MidiOutputHandle, MidiTransport, TransportError};

/// Number of banks the device stores; recalling bank b sends program b-1
pub const BANK_COUNT: u8 = 32;

/// Highest program number a Program Change message can carry
pub const PROGRAM_MAX: u8 = 127;

/// Program Change status byte, before the channel bits are OR'd in
const PROGRAM_CHANGE: u8 = 0xC0;

/// Error type for bank channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("MIDI channel {0} out of range (1-16)")]
    InvalidChannel(u8),

    #[error("Bank number {0} out of range (1-32)")]
    InvalidBank(u8),

    #[error("Program number {0} out of range (0-127)")]
    InvalidProgram(u8),

    #[error("Unknown MIDI output device: '{0}'")]
    UnknownDevice(String),

    #[error("No MIDI outputs available")]
    NoOutputs,

    #[error("MIDI transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to save config: {0}")]
    Config(#[from] anyhow::Error),
}

/// Read-only snapshot of the channel state
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    /// True when an output connection is open
    pub connected: bool,
    /// Currently selected output device, if any
    pub device: Option<String>,
    /// MIDI channel as presented to users (1-16)
    pub channel: u8,
    /// Output devices available right now
    pub available_devices: Vec<String>,
    /// False when running in mock mode (no MIDI backend)
    pub transport_available: bool,
}

/// Control channel to the patchbay device
///
/// Constructed explicitly by the composition root with whatever transport it
/// wants (the system transport, a test double, or `None` for mock mode).
/// Mutating operations take `&mut self`, so a concurrent host wraps the
/// channel in a single mutex.
pub struct BankChannel {
    /// MIDI transport; `None` when the host has no usable MIDI backend
    transport: Option<Box<dyn MidiTransport>>,
    /// Open output handle; `Some` = connected
    output: Option<Box<dyn MidiOutputHandle>>,
    /// Selected output device name
    device: Option<String>,
    /// MIDI channel, 0-based for message construction (presented 1-based)
    channel_index: u8,
    /// Loaded configuration document (midi section plus passthrough)
    config: AppConfig,
    /// Where the configuration document lives
    config_path: PathBuf,
}

impl BankChannel {
    /// Build a channel over the given transport, reading initial settings
    /// from the config document at `config_path`.
    ///
    /// A persisted out-of-range channel is corrected to 1 with a warning; a
    /// persisted device name is taken as the initial selection and validated
    /// when `connect` actually opens it.
    pub fn new(transport: Option<Box<dyn MidiTransport>>, config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        let config = load_config(&config_path);

        let channel = config.midi.channel;
        let channel_index = if (CHANNEL_MIN..=CHANNEL_MAX).contains(&channel) {
            channel - 1
        } else {
            log::warn!(
                "MIDI: Configured channel {} out of range (1-16), using channel 1",
                channel
            );
            0
        };

        Self {
            device: config.midi.device.clone(),
            channel_index,
            transport,
            output: None,
            config,
            config_path,
        }
    }

    /// Names of the currently available MIDI outputs.
    ///
    /// Empty when the transport capability is unavailable or enumeration
    /// fails; enumeration problems are logged rather than returned.
    pub fn list_outputs(&self) -> Vec<String> {
        let Some(transport) = self.transport.as_ref() else {
            return Vec::new();
        };
        match transport.enumerate() {
            Ok(outputs) => outputs,
            Err(e) => {
                log::warn!("MIDI: Failed to enumerate outputs: {}", e);
                Vec::new()
            }
        }
    }

    /// Select the MIDI output device by name and persist the choice.
    ///
    /// Only names returned by `list_outputs` are accepted. If currently
    /// connected, reconnects to the new device and returns that outcome.
    pub fn select_device(&mut self, name: &str) -> Result<(), ChannelError> {
        if !self.list_outputs().iter().any(|n| n == name) {
            return Err(ChannelError::UnknownDevice(name.to_string()));
        }

        self.device = Some(name.to_string());
        self.config.midi.device = Some(name.to_string());
        save_config(&self.config, &self.config_path)?;

        // Reconnect if already connected
        if self.output.is_some() {
            self.disconnect();
            return self.connect();
        }
        Ok(())
    }

    /// Set the MIDI channel (1-16) and persist the choice.
    pub fn select_channel(&mut self, channel: u8) -> Result<(), ChannelError> {
        if !(CHANNEL_MIN..=CHANNEL_MAX).contains(&channel) {
            return Err(ChannelError::InvalidChannel(channel));
        }

        self.channel_index = channel - 1; // messages carry the 0-based channel
        self.config.midi.channel = channel;
        save_config(&self.config, &self.config_path)?;
        Ok(())
    }

    /// Open the selected output device.
    ///
    /// With no device selected, auto-selects the first available output
    /// (without persisting the choice). Connecting while already connected
    /// is a no-op; call `disconnect` first to force a fresh open.
    pub fn connect(&mut self) -> Result<(), ChannelError> {
        if self.output.is_some() {
            return Ok(());
        }

        let name = match &self.device {
            Some(name) => name.clone(),
            None => match self.list_outputs().into_iter().next() {
                Some(first) => {
                    log::info!("MIDI: Auto-selected output '{}'", first);
                    self.device = Some(first.clone());
                    first
                }
                None => {
                    log::warn!("MIDI: No MIDI outputs available");
                    return Err(ChannelError::NoOutputs);
                }
            },
        };

        let Some(transport) = self.transport.as_mut() else {
            log::warn!("MIDI: No transport available, cannot connect to '{}'", name);
            return Err(ChannelError::NoOutputs);
        };

        match transport.open(&name) {
            Ok(handle) => {
                self.output = Some(handle);
                log::info!("MIDI: Connected to output '{}'", name);
                Ok(())
            }
            Err(e) => {
                log::warn!("MIDI: Failed to open output '{}': {}", name, e);
                Err(ChannelError::Transport(e))
            }
        }
    }

    /// Drop the output connection, if any.
    ///
    /// Close problems stay inside the transport; the channel always ends up
    /// disconnected.
    pub fn disconnect(&mut self) {
        if self.output.take().is_some() {
            log::info!("MIDI: Disconnected from output");
        }
    }

    /// True when an output connection is open
    pub fn is_connected(&self) -> bool {
        self.output.is_some()
    }

    /// Send a Program Change for `program` (0-127) on the selected channel.
    ///
    /// Connects first when not already connected. Without a transport this
    /// logs the message it would have sent and reports success, so hosts
    /// with no MIDI backend still exercise the full control flow.
    pub fn send_program_change(&mut self, program: u8) -> Result<(), ChannelError> {
        if program > PROGRAM_MAX {
            return Err(ChannelError::InvalidProgram(program));
        }

        if self.transport.is_none() {
            log::info!(
                "MIDI: No output backend, would send Program Change {} on channel {}",
                program,
                self.channel_index + 1
            );
            return Ok(());
        }

        if self.output.is_none() {
            self.connect()?;
        }

        let Some(output) = self.output.as_mut() else {
            return Err(ChannelError::NoOutputs);
        };

        let message = [PROGRAM_CHANGE | self.channel_index, program];
        match output.send(&message) {
            Ok(()) => {
                log::info!(
                    "MIDI: Sent Program Change {} on channel {}",
                    program,
                    self.channel_index + 1
                );
                log::debug!("MIDI: [out] {:02X?}", message);
                Ok(())
            }
            Err(e) => {
                log::warn!("MIDI: Failed to send Program Change: {}", e);
                Err(ChannelError::Transport(e))
            }
        }
    }

    /// Recall a device bank (1-32).
    ///
    /// Bank b is sent as Program Change b-1; nothing is sent for an
    /// out-of-range bank.
    pub fn recall_bank(&mut self, bank: u8) -> Result<(), ChannelError> {
        if !(1..=BANK_COUNT).contains(&bank) {
            return Err(ChannelError::InvalidBank(bank));
        }
        self.send_program_change(bank - 1)
    }

    /// Snapshot of the channel state.
    ///
    /// Enumerates outputs fresh on every call so newly plugged devices show
    /// up without a reconnect.
    pub fn status(&self) -> ChannelStatus {
        ChannelStatus {
            connected: self.output.is_some(),
            device: self.device.clone(),
            channel: self.channel_index + 1,
            available_devices: self.list_outputs(),
            transport_available: self.transport.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Scriptable transport: a settable port list, switchable failure modes,
    /// and a shared record of every open and every byte sent.
    #[derive(Default)]
    struct MockState {
        ports: Vec<String>,
        fail_open: bool,
        fail_send: bool,
        opened: Vec<String>,
        sent: Vec<Vec<u8>>,
    }

    #[derive(Clone)]
    struct MockTransport {
        state: Arc<Mutex<MockState>>,
    }

    impl MockTransport {
        fn new(ports: &[&str]) -> Self {
            let state = MockState {
                ports: ports.iter().map(|s| s.to_string()).collect(),
                ..MockState::default()
            };
            Self {
                state: Arc::new(Mutex::new(state)),
            }
        }

        fn set_ports(&self, ports: &[&str]) {
            self.state.lock().unwrap().ports = ports.iter().map(|s| s.to_string()).collect();
        }

        fn set_fail_open(&self, fail: bool) {
            self.state.lock().unwrap().fail_open = fail;
        }

        fn set_fail_send(&self, fail: bool) {
            self.state.lock().unwrap().fail_send = fail;
        }

        fn opened(&self) -> Vec<String> {
            self.state.lock().unwrap().opened.clone()
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.state.lock().unwrap().sent.clone()
        }
    }

    impl MidiTransport for MockTransport {
        fn enumerate(&self) -> Result<Vec<String>, TransportError> {
            Ok(self.state.lock().unwrap().ports.clone())
        }

        fn open(&mut self, name: &str) -> Result<Box<dyn MidiOutputHandle>, TransportError> {
            {
                let mut state = self.state.lock().unwrap();
                if state.fail_open {
                    return Err(TransportError::Open(
                        name.to_string(),
                        "scripted failure".to_string(),
                    ));
                }
                if !state.ports.iter().any(|p| p == name) {
                    return Err(TransportError::Open(
                        name.to_string(),
                        "no such port".to_string(),
                    ));
                }
                state.opened.push(name.to_string());
            }
            Ok(Box::new(MockHandle {
                state: Arc::clone(&self.state),
            }))
        }
    }

    struct MockHandle {
        state: Arc<Mutex<MockState>>,
    }

    impl MidiOutputHandle for MockHandle {
        fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_send {
                return Err(TransportError::Send("scripted failure".to_string()));
            }
            state.sent.push(message.to_vec());
            Ok(())
        }
    }

    fn mock_channel(ports: &[&str]) -> (BankChannel, MockTransport, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new(ports);
        let channel = BankChannel::new(
            Some(Box::new(transport.clone())),
            dir.path().join("config.yaml"),
        );
        (channel, transport, dir)
    }

    #[test]
    fn test_recall_bank_maps_to_program() {
        let (mut channel, transport, _dir) = mock_channel(&["MB-76 Port"]);

        for bank in 1..=BANK_COUNT {
            channel.recall_bank(bank).unwrap();
        }

        let sent = transport.sent();
        assert_eq!(sent.len(), 32);
        for (i, message) in sent.iter().enumerate() {
            // Default channel 1 -> status byte 0xC0; bank b -> program b-1
            assert_eq!(message.as_slice(), &[0xC0, i as u8]);
        }
    }

    #[test]
    fn test_recall_bank_rejects_out_of_range() {
        let (mut channel, transport, _dir) = mock_channel(&["MB-76 Port"]);

        for bank in [0u8, 33, 255] {
            match channel.recall_bank(bank) {
                Err(ChannelError::InvalidBank(b)) => assert_eq!(b, bank),
                other => panic!("expected InvalidBank, got {:?}", other),
            }
        }
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_invalid_program_rejected() {
        let (mut channel, transport, _dir) = mock_channel(&["MB-76 Port"]);

        assert!(matches!(
            channel.send_program_change(128),
            Err(ChannelError::InvalidProgram(128))
        ));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_select_device_unknown_is_rejected() {
        let (mut channel, _transport, _dir) = mock_channel(&["MB-76 Port"]);

        channel.select_device("MB-76 Port").unwrap();
        assert!(matches!(
            channel.select_device("nonexistent"),
            Err(ChannelError::UnknownDevice(_))
        ));
        assert_eq!(channel.status().device.as_deref(), Some("MB-76 Port"));
    }

    #[test]
    fn test_select_channel_bounds() {
        let (mut channel, transport, _dir) = mock_channel(&["MB-76 Port"]);

        for n in [0u8, 17, 99] {
            assert!(matches!(
                channel.select_channel(n),
                Err(ChannelError::InvalidChannel(_))
            ));
            assert_eq!(channel.status().channel, 1);
        }

        channel.select_channel(16).unwrap();
        assert_eq!(channel.status().channel, 16);

        // Channel 16 is index 15 on the wire
        channel.recall_bank(1).unwrap();
        assert_eq!(transport.sent().last().unwrap().as_slice(), &[0xCF, 0x00]);
    }

    #[test]
    fn test_connect_auto_selects_first_output() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let transport = MockTransport::new(&["Port A", "Port B"]);
        let mut channel = BankChannel::new(Some(Box::new(transport.clone())), &config_path);

        channel.connect().unwrap();
        assert!(channel.is_connected());
        assert_eq!(channel.status().device.as_deref(), Some("Port A"));
        assert_eq!(transport.opened(), vec!["Port A".to_string()]);

        // Auto-selection is in-memory only, never persisted
        assert!(load_config(&config_path).midi.device.is_none());
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (mut channel, transport, _dir) = mock_channel(&["Port A"]);

        channel.connect().unwrap();
        channel.connect().unwrap();
        assert_eq!(transport.opened().len(), 1);
    }

    #[test]
    fn test_connect_with_no_outputs() {
        let (mut channel, _transport, _dir) = mock_channel(&[]);

        assert!(matches!(channel.connect(), Err(ChannelError::NoOutputs)));
        assert!(!channel.is_connected());
    }

    #[test]
    fn test_connect_open_failure_stays_disconnected() {
        let (mut channel, transport, _dir) = mock_channel(&["Port A"]);
        transport.set_fail_open(true);

        assert!(matches!(
            channel.connect(),
            Err(ChannelError::Transport(TransportError::Open(_, _)))
        ));
        assert!(!channel.is_connected());

        // The auto-connect inside a send propagates the same failure
        assert!(channel.recall_bank(1).is_err());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_send_failure_surfaces_but_keeps_connection() {
        let (mut channel, transport, _dir) = mock_channel(&["Port A"]);

        channel.connect().unwrap();
        transport.set_fail_send(true);

        assert!(matches!(
            channel.recall_bank(3),
            Err(ChannelError::Transport(TransportError::Send(_)))
        ));
        assert!(channel.is_connected());
    }

    #[test]
    fn test_select_device_while_connected_reconnects() {
        let (mut channel, transport, _dir) = mock_channel(&["Port A", "Port B"]);

        channel.connect().unwrap();
        channel.select_device("Port B").unwrap();

        assert!(channel.is_connected());
        assert_eq!(channel.status().device.as_deref(), Some("Port B"));
        assert_eq!(
            transport.opened(),
            vec!["Port A".to_string(), "Port B".to_string()]
        );
    }

    #[test]
    fn test_select_device_reconnect_failure_surfaces() {
        let (mut channel, transport, _dir) = mock_channel(&["Port A", "Port B"]);

        channel.connect().unwrap();
        transport.set_fail_open(true);

        assert!(matches!(
            channel.select_device("Port B"),
            Err(ChannelError::Transport(_))
        ));
        // Selection took effect; the reconnect is what failed
        assert_eq!(channel.status().device.as_deref(), Some("Port B"));
        assert!(!channel.is_connected());
    }

    #[test]
    fn test_disconnect_always_lands_disconnected() {
        let (mut channel, _transport, _dir) = mock_channel(&["Port A"]);

        channel.disconnect(); // not connected: still fine
        channel.connect().unwrap();
        channel.disconnect();
        assert!(!channel.is_connected());
        channel.disconnect();
        assert!(!channel.is_connected());
    }

    #[test]
    fn test_mock_mode_without_transport() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = BankChannel::new(None, dir.path().join("config.yaml"));

        let status = channel.status();
        assert!(!status.transport_available);
        assert!(!status.connected);
        assert!(status.available_devices.is_empty());
        assert!(channel.list_outputs().is_empty());

        // Sends report success without a device to send to
        channel.send_program_change(5).unwrap();
        channel.recall_bank(32).unwrap();

        // Validation still applies in mock mode
        assert!(matches!(
            channel.recall_bank(0),
            Err(ChannelError::InvalidBank(0))
        ));
        assert!(matches!(
            channel.send_program_change(200),
            Err(ChannelError::InvalidProgram(200))
        ));

        // Connecting has nothing to connect to
        assert!(matches!(channel.connect(), Err(ChannelError::NoOutputs)));
    }

    #[test]
    fn test_status_enumerates_fresh() {
        let (channel, transport, _dir) = mock_channel(&["Port A"]);

        assert_eq!(channel.status().available_devices, vec!["Port A"]);

        transport.set_ports(&["Port A", "Port B"]);
        assert_eq!(
            channel.status().available_devices,
            vec!["Port A", "Port B"]
        );
    }

    #[test]
    fn test_settings_persist_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");

        {
            let transport = MockTransport::new(&["Port A", "Port B"]);
            let mut channel = BankChannel::new(Some(Box::new(transport)), &config_path);
            channel.select_channel(7).unwrap();
            channel.select_device("Port B").unwrap();
        }

        // Restart-equivalent: a fresh channel over the same config document
        let transport = MockTransport::new(&["Port A", "Port B"]);
        let mut channel = BankChannel::new(Some(Box::new(transport.clone())), &config_path);

        let status = channel.status();
        assert_eq!(status.channel, 7);
        assert_eq!(status.device.as_deref(), Some("Port B"));

        // Channel 7 is index 6 on the wire, and the persisted device is used
        channel.recall_bank(1).unwrap();
        assert_eq!(transport.sent().last().unwrap().as_slice(), &[0xC6, 0x00]);
        assert_eq!(transport.opened(), vec!["Port B".to_string()]);
    }

    #[test]
    fn test_out_of_range_persisted_channel_corrected() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "midi:\n  channel: 99\n").unwrap();

        let transport = MockTransport::new(&["Port A"]);
        let mut channel = BankChannel::new(Some(Box::new(transport.clone())), &config_path);

        assert_eq!(channel.status().channel, 1);
        channel.recall_bank(1).unwrap();
        assert_eq!(transport.sent().last().unwrap().as_slice(), &[0xC0, 0x00]);
    }

    #[test]
    fn test_persisted_device_validated_at_connect() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "midi:\n  channel: 1\n  device: \"Ghost Port\"\n")
            .unwrap();

        let transport = MockTransport::new(&["Port A"]);
        let mut channel = BankChannel::new(Some(Box::new(transport)), &config_path);

        // The stale selection is kept until connect proves it wrong
        assert_eq!(channel.status().device.as_deref(), Some("Ghost Port"));
        assert!(matches!(
            channel.connect(),
            Err(ChannelError::Transport(TransportError::Open(_, _)))
        ));
    }
}
