pub mod wav;
pub mod writer;

pub use wav::{save_wav, FinalizedFile, StreamingWavWriter, WavHeader, WriterState, HEADER_LEN};
pub use writer::{WriterHandle, WriterOutcome, WriterTask};
