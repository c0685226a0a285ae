//! Enhanced ATT (EATT) channel-multiplexing engine
//!
//! This module manages the pool of credit-based ATT bearers to each peer
//! device and is responsible for:
//! - Channel lifecycle (pending, opened, reconfiguring) driven by
//!   transport events
//! - Per-channel outstanding-command bookkeeping (one request in flight
//!   per direction)
//! - Timer-driven indication reliability (confirmation deadlines,
//!   application-ack windows)
//! - Picking the best channel for a client request, an indication, or a
//!   queued send

pub mod alarm;
pub mod channel;
pub mod constants;
pub mod device;
pub mod extension;
pub mod pdu;
pub mod transport;
pub mod types;

// Re-export the public API
pub use self::alarm::{AlarmHandle, AlarmScheduler, ThreadAlarms, TimerEvent, TimerKind};
pub use self::channel::EattChannel;
pub use self::device::EattDevice;
pub use self::extension::EattExtension;
pub use self::transport::CreditBasedTransport;
pub use self::types::{
    ChannelId, ClientCommand, EattChannelState, EattConfig, EattError, EattResult, PeerFeatures,
    ServerCommand,
};
