use crate::error::TransportError;
use async_trait::async_trait;
use tracing::info;

/// Audio characteristic the device streams notifications on and accepts
/// capture commands through.
pub const AUDIO_CHARACTERISTIC_UUID: &str = "12345678-1234-5678-1234-56789abcdef7";

/// Advertised name fragment of compatible capture devices.
pub const DEVICE_NAME_FRAGMENT: &str = "Amua";

pub fn is_capture_device(advertised_name: &str) -> bool {
    advertised_name.contains(DEVICE_NAME_FRAGMENT)
}

/// Decides which advertisements to connect to: the name must mark a capture
/// device and, when an allowlist is configured, the address must be on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    addresses: Vec<String>,
}

impl DeviceFilter {
    pub fn new<I, A>(addresses: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        let addresses = addresses
            .into_iter()
            .map(|a| a.as_ref().trim().to_ascii_uppercase())
            .filter(|a| !a.is_empty())
            .collect();
        Self { addresses }
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn matches(&self, name: Option<&str>, address: &str) -> bool {
        let Some(name) = name else {
            return false;
        };
        if !is_capture_device(name) {
            return false;
        }
        self.addresses.is_empty()
            || self
                .addresses
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(address.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    Start,
    Stop,
}

impl CaptureCommand {
    /// Payload written to the audio characteristic.
    pub fn payload(&self) -> [u8; 1] {
        match self {
            CaptureCommand::Start => [0x01],
            CaptureCommand::Stop => [0x00],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureCommand::Start => "start",
            CaptureCommand::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Outbound half of the BLE link. Implementations write
/// [`CaptureCommand::payload`] to the audio characteristic and resolve once
/// the device acknowledges.
#[async_trait]
pub trait CaptureTransport: Send {
    async fn start_capture(&mut self) -> Result<(), TransportError>;
    async fn stop_capture(&mut self) -> Result<(), TransportError>;
}

/// Transport for replaying captured packet logs: every command succeeds.
#[derive(Debug, Default)]
pub struct ReplayTransport {
    pub commands: Vec<CaptureCommand>,
}

#[async_trait]
impl CaptureTransport for ReplayTransport {
    async fn start_capture(&mut self) -> Result<(), TransportError> {
        info!("Replay transport: start capture");
        self.commands.push(CaptureCommand::Start);
        Ok(())
    }

    async fn stop_capture(&mut self) -> Result<(), TransportError> {
        info!("Replay transport: stop capture");
        self.commands.push(CaptureCommand::Stop);
        Ok(())
    }
}
