//! Domain layer public interface.
//!
//! This module defines driver-level abstractions that are independent of
//! brokers, client libraries, and dispatch.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod access;
mod channel;
mod driver;
mod flag;
mod message;
mod stream;

pub use access::BlockingAccess;
pub use channel::{MessageReader, MessageWriter};
pub use driver::{
    //
    BlockingDriverPtr,
    BlockingPubSubDriver,
    ConcurrentDriverPtr,
    ConcurrentPubSubDriver,
    Driver,
    DriverBase,
    PubSubDriver,
};
pub use flag::Flag;
pub use message::Message;
pub use stream::{StreamPhase, StreamState};
