pub mod channel;
pub mod interface;
#[cfg(test)]
pub mod mock;
pub mod registry;

pub use channel::{ChannelSink, Outbound};
pub use interface::{Sink, SinkId};
pub use registry::{ConnectionPolicy, ConnectionRegistry};
