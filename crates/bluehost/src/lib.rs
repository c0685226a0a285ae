//! BlueHost - host-side Bluetooth protocol stack components
//!
//! This library provides the Enhanced Attribute Protocol (EATT) channel
//! engine of a Bluetooth host stack: management of a bounded pool of
//! concurrent credit-based ATT bearers per peer device, with per-channel
//! flow control, outstanding-command bookkeeping, indication reliability
//! timers and a deterministic channel-selection policy. The underlying
//! credit-based transport, the timer primitives and the GATT dispatch
//! layer are collaborators supplied through capability traits.

pub mod eatt;
pub mod gap;

// Re-export common types for convenience
pub use eatt::{
    AlarmScheduler, ChannelId, ClientCommand, CreditBasedTransport, EattChannel, EattChannelState,
    EattConfig, EattError, EattExtension, EattResult, PeerFeatures, ThreadAlarms, TimerEvent,
    TimerKind,
};
pub use gap::BdAddr;
