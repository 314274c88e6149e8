//! Replica-to-replica transport.
//!
//! Messages are encoded exactly as they would be for a socket, keyed by
//! their type id, and delivered to the receiver's bounded event channel.

mod channel;
mod codec;

pub use channel::{ChannelNetwork, ChannelTransport};
pub use codec::{decode_message, encode_message, CodecError};
