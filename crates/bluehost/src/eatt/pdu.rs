//! Minimal ATT PDU framing
//!
//! The channel engine only frames the traffic it originates itself
//! (handle-value indications and the confirmation sent on the
//! application's behalf) and peeks at inbound opcodes to drive the
//! indication timers. Everything else is opaque payload owned by the GATT
//! dispatch collaborator.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::constants::*;
use super::types::{EattError, EattResult};

/// Opcode of a received PDU, if the payload is non-empty
pub fn opcode(payload: &[u8]) -> Option<u8> {
    payload.first().copied()
}

/// Frame a Handle Value Indication
pub fn encode_handle_value_indication(handle: u16, value: &[u8]) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(3 + value.len());
    pdu.push(ATT_OP_HANDLE_VALUE_IND);
    // Infallible on a Vec
    let _ = pdu.write_u16::<LittleEndian>(handle);
    pdu.extend_from_slice(value);
    pdu
}

/// Frame a Handle Value Confirmation
pub fn encode_handle_value_confirmation() -> Vec<u8> {
    vec![ATT_OP_HANDLE_VALUE_CONF]
}

/// Parse a received Handle Value Indication into (handle, value)
pub fn decode_handle_value_indication(payload: &[u8]) -> EattResult<(u16, Vec<u8>)> {
    if payload.len() < 3 || payload[0] != ATT_OP_HANDLE_VALUE_IND {
        return Err(EattError::InvalidPdu);
    }

    let mut cursor = Cursor::new(&payload[1..]);
    let handle = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| EattError::InvalidPdu)?;
    Ok((handle, payload[3..].to_vec()))
}
