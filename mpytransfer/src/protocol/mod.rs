//! Protocol implementations.

pub mod chunked;
pub mod frame;
pub mod receiver;

// Re-export common types
pub use chunked::{ChunkedTransfer, TransferConfig};
pub use frame::{Ack, Frame};
pub use receiver::FrameReceiver;
