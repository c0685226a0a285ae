//! Credit-based transport collaborator
//!
//! The engine never touches L2CAP signaling itself; channel establishment,
//! teardown, reconfiguration and raw payload exchange are delegated to an
//! implementation of [`CreditBasedTransport`]. Outcomes arrive
//! asynchronously through the `on_*` entry points of
//! [`EattExtension`](super::extension::EattExtension).

use super::types::{ChannelId, EattResult};
use crate::gap::BdAddr;

/// Capability interface for the channel-oriented transport
///
/// Production wires this to the L2CAP enhanced credit-based flow-control
/// machinery; tests substitute a recording double.
pub trait CreditBasedTransport {
    /// Request `count` credit-based channels to `peer`, each asking for
    /// `mtu`. Returns the locally allocated cids; each channel completes
    /// (or fails) asynchronously via `on_channel_opened`/`on_open_failed`.
    fn open_channels(
        &mut self,
        peer: BdAddr,
        count: usize,
        mtu: u16,
    ) -> EattResult<Vec<ChannelId>>;

    /// Request a new local receive MTU on the given channels. Completion
    /// is reported via `on_reconfigure_completed`.
    fn reconfigure(&mut self, peer: BdAddr, cids: &[ChannelId], mtu: u16) -> EattResult<()>;

    /// Hand one payload to the channel. The caller has already accounted
    /// for a transmit credit.
    fn send(&mut self, peer: BdAddr, cid: ChannelId, payload: &[u8]) -> EattResult<()>;

    /// Tear the channel down. Also cancels an in-flight open attempt for a
    /// channel that never completed.
    fn close_channel(&mut self, peer: BdAddr, cid: ChannelId);
}
