//! Type definitions for the Enhanced ATT channel engine
//!
//! This module contains the core data structures shared across the EATT
//! channel records, the per-device set and the extension facade.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bitflags::bitflags;
use thiserror::Error;

use super::constants::*;
use crate::gap::BdAddr;

/// Channel identifier, unique per peer while the channel is open
pub type ChannelId = u16;

/// Error types specific to EATT operations
#[derive(Debug, Error)]
pub enum EattError {
    #[error("Module not started")]
    NotStarted,

    #[error("Device {0} not known")]
    DeviceNotFound(BdAddr),

    #[error("Channel 0x{0:04x} not found")]
    ChannelNotFound(ChannelId),

    #[error("EATT not supported by peer {0}")]
    NotSupported(BdAddr),

    #[error("No free channel slot")]
    NoChannelAvailable,

    #[error("Channel 0x{0:04x} already has an operation in flight")]
    ChannelBusy(ChannelId),

    #[error("Send queue full on channel 0x{0:04x}")]
    QueueFull(ChannelId),

    #[error("No transmit credits left on channel 0x{0:04x}")]
    NoCredits(ChannelId),

    #[error("Invalid state for operation: {0}")]
    InvalidState(EattChannelState),

    #[error("Malformed PDU")]
    InvalidPdu,

    #[error("Transport failure: {0}")]
    Transport(String),
}

/// Result type for EATT operations
pub type EattResult<T> = std::result::Result<T, EattError>;

/// Lifecycle state of a single enhanced bearer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EattChannelState {
    /// Requested; transport handshake still in progress
    Pending,
    /// Usable for traffic
    Opened,
    /// MTU change in flight; traffic already accepted under the old MTU
    /// continues undisturbed
    Reconfiguring,
}

impl fmt::Display for EattChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Opened => write!(f, "Opened"),
            Self::Reconfiguring => write!(f, "Reconfiguring"),
        }
    }
}

bitflags! {
    /// Cached peer capability bits learned from service discovery or
    /// restored from bond storage
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PeerFeatures: u8 {
        /// Peer advertises EATT support in its server supported features
        const EATT_SUPPORTED = 0x01;
    }
}

/// A client-originated request queued on a channel until the transport has
/// credits to carry it
#[derive(Debug, Clone)]
pub struct ClientCommand {
    /// ATT opcode of the queued request
    pub op_code: u8,
    /// Attribute handle the request targets
    pub attr_handle: u16,
    /// Serialized request, sent verbatim once dequeued
    pub payload: Vec<u8>,
}

/// The one server-side transaction a channel may have in flight
#[derive(Debug, Clone)]
pub struct ServerCommand {
    /// GATT transaction id assigned by the dispatch layer
    pub trans_id: u32,
    /// ATT opcode of the request being served
    pub op_code: u8,
    /// Staged partial responses for multi-part replies
    pub multi_rsp_q: VecDeque<Vec<u8>>,
}

impl ServerCommand {
    pub fn new(trans_id: u32, op_code: u8) -> Self {
        Self {
            trans_id,
            op_code,
            multi_rsp_q: VecDeque::new(),
        }
    }
}

/// Runtime knobs for the extension facade
#[derive(Debug, Clone)]
pub struct EattConfig {
    /// How many enhanced bearers to open per peer
    pub channels_per_device: usize,
    /// MTU requested at channel open
    pub default_mtu: u16,
    /// Credit budget assumed per channel until the transport reports one
    pub initial_credits: u16,
    /// Window the peer has to confirm an outgoing indication
    pub ind_confirmation_timeout: Duration,
    /// Window the local application has to acknowledge an incoming
    /// indication
    pub app_ack_timeout: Duration,
}

impl Default for EattConfig {
    fn default() -> Self {
        Self {
            channels_per_device: EATT_CHANNELS_PER_DEVICE,
            default_mtu: EATT_DEFAULT_MTU,
            initial_credits: EATT_DEFAULT_CREDITS,
            ind_confirmation_timeout: Duration::from_millis(EATT_IND_CONFIRMATION_TIMEOUT_MS),
            app_ack_timeout: Duration::from_millis(EATT_APP_IND_ACK_TIMEOUT_MS),
        }
    }
}
