pub mod accumulator;
pub mod controller;
pub mod hexdump;
pub mod packet;
pub mod transport;

pub use accumulator::{SampleAccumulator, SampleSink, StreamState};
pub use controller::{
    CaptureMode, ControllerConfig, FinishedRecording, RecordingController, StreamPhase,
    StreamStats, DISCARD_WINDOW,
};
pub use packet::{DecodedPacket, PacketDecoder, MAX_SAMPLES_PER_PACKET};
pub use transport::{
    CaptureCommand, CaptureTransport, ConnectionState, DeviceFilter, ReplayTransport,
};
