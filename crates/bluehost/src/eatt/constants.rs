//! Constants for the Enhanced ATT channel engine

/// Smallest MTU/MPS a credit-based ATT bearer may negotiate
pub const EATT_MIN_MTU_MPS: u16 = 64;

/// MTU requested when opening channels unless configured otherwise
pub const EATT_DEFAULT_MTU: u16 = 256;

/// Largest transmit MTU this implementation will use
pub const EATT_MAX_TX_MTU: u16 = 1024;

/// Enhanced bearers opened per peer device (the unenhanced ATT bearer is
/// separate and not managed here)
pub const EATT_CHANNELS_PER_DEVICE: usize = 5;

/// ATT transaction timeout; a peer that has not confirmed an indication
/// within this window has violated the protocol
pub const EATT_IND_CONFIRMATION_TIMEOUT_MS: u64 = 30_000;

/// How long the local application gets to acknowledge an incoming
/// indication before the stack confirms on its behalf
pub const EATT_APP_IND_ACK_TIMEOUT_MS: u64 = 5_000;

/// Default transport credit grant assumed until the collaborator reports
/// the real budget
pub const EATT_DEFAULT_CREDITS: u16 = 10;

// ATT opcodes the engine itself frames or recognizes. Everything else is
// opaque payload routed to the GATT dispatch collaborator.
pub const ATT_OP_READ_REQ: u8 = 0x0A;
pub const ATT_OP_WRITE_REQ: u8 = 0x12;
pub const ATT_OP_HANDLE_VALUE_NTF: u8 = 0x1B;
pub const ATT_OP_HANDLE_VALUE_IND: u8 = 0x1D;
pub const ATT_OP_HANDLE_VALUE_CONF: u8 = 0x1E;
