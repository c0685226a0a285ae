//! Enhanced bearer channel record
//!
//! Pure per-channel state: identity, negotiated MTUs, lifecycle state,
//! the one outstanding server transaction, the pending-indication slot,
//! the queued client commands and the two alarm handles. Policy (which
//! channel to pick, when to tear down) lives in the per-device set and
//! the extension facade.

use std::collections::VecDeque;

use super::alarm::{AlarmHandle, AlarmScheduler};
use super::constants::*;
use super::types::{ChannelId, ClientCommand, EattChannelState, EattError, EattResult, ServerCommand};
use crate::gap::BdAddr;

/// State of a single enhanced ATT bearer to one peer
#[derive(Debug)]
pub struct EattChannel {
    /// Peer this bearer belongs to
    bda: BdAddr,
    /// Local channel id, unique per peer while open
    cid: ChannelId,
    /// Transmit MTU, always within [EATT_MIN_MTU_MPS, EATT_MAX_TX_MTU]
    tx_mtu: u16,
    /// Receive MTU offered to the peer
    rx_mtu: u16,
    state: EattChannelState,
    /// The one server-side request/response in flight
    server_outstanding_cmd: Option<ServerCommand>,
    /// Handle of the indication awaiting peer confirmation
    indicate_handle: Option<u16>,
    /// Local application acknowledgement timer
    ind_ack_timer: Option<AlarmHandle>,
    /// Peer confirmation timer
    ind_confirmation_timer: Option<AlarmHandle>,
    /// Client commands not yet handed to the transport, FIFO
    cl_cmd_q: VecDeque<ClientCommand>,
    /// Transmit credits currently granted by the transport
    tx_credits: u16,
}

impl EattChannel {
    pub fn new(bda: BdAddr, cid: ChannelId, tx_mtu: u16, rx_mtu: u16) -> Self {
        let mut channel = Self {
            bda,
            cid,
            tx_mtu: 0,
            rx_mtu,
            state: EattChannelState::Pending,
            server_outstanding_cmd: None,
            indicate_handle: None,
            ind_ack_timer: None,
            ind_confirmation_timer: None,
            cl_cmd_q: VecDeque::new(),
            tx_credits: 0,
        };
        channel.set_tx_mtu(tx_mtu);
        channel
    }

    pub fn peer(&self) -> BdAddr {
        self.bda
    }

    pub fn cid(&self) -> ChannelId {
        self.cid
    }

    pub fn tx_mtu(&self) -> u16 {
        self.tx_mtu
    }

    pub fn rx_mtu(&self) -> u16 {
        self.rx_mtu
    }

    pub fn state(&self) -> EattChannelState {
        self.state
    }

    /// Apply a lifecycle transition
    ///
    /// The first transition out of `Pending` into `Opened` lazily creates
    /// the channel's two alarms (named after peer and cid for diagnostics)
    /// and resets the server transaction slot. No edge is rejected here;
    /// callers drive only legal transitions.
    pub fn set_state(&mut self, state: EattChannelState, alarms: &mut dyn AlarmScheduler) {
        if self.state == EattChannelState::Pending && state == EattChannelState::Opened {
            self.server_outstanding_cmd = None;

            let name = format!("eatt_ind_ack_timer_{}_cid_0x{:04x}", self.bda, self.cid);
            self.ind_ack_timer = Some(alarms.create(&name));

            let name = format!("eatt_ind_conf_timer_{}_cid_0x{:04x}", self.bda, self.cid);
            self.ind_confirmation_timer = Some(alarms.create(&name));
        }
        self.state = state;
    }

    /// Set the transmit MTU, clamped into the legal range
    ///
    /// The upper bound is applied before the lower so that a request below
    /// the minimum lands on the minimum rather than escaping the range.
    pub fn set_tx_mtu(&mut self, tx_mtu: u16) {
        self.tx_mtu = tx_mtu.min(EATT_MAX_TX_MTU).max(EATT_MIN_MTU_MPS);
    }

    pub fn set_rx_mtu(&mut self, rx_mtu: u16) {
        self.rx_mtu = rx_mtu;
    }

    // Indication tracking

    pub fn pending_indication(&self) -> Option<u16> {
        self.indicate_handle
    }

    pub fn set_pending_indication(&mut self, handle: u16) {
        self.indicate_handle = Some(handle);
    }

    pub fn confirm_indication(&mut self) -> Option<u16> {
        self.indicate_handle.take()
    }

    // Server transaction slot

    pub fn server_transaction(&self) -> Option<&ServerCommand> {
        self.server_outstanding_cmd.as_ref()
    }

    pub fn server_transaction_mut(&mut self) -> Option<&mut ServerCommand> {
        self.server_outstanding_cmd.as_mut()
    }

    /// Claim the server slot for a new transaction
    pub fn begin_server_transaction(&mut self, trans_id: u32, op_code: u8) -> EattResult<()> {
        if self.server_outstanding_cmd.is_some() {
            return Err(EattError::ChannelBusy(self.cid));
        }
        self.server_outstanding_cmd = Some(ServerCommand::new(trans_id, op_code));
        Ok(())
    }

    pub fn complete_server_transaction(&mut self) -> Option<ServerCommand> {
        self.server_outstanding_cmd.take()
    }

    /// Drop GATT staging state (partial responses, queued requests)
    /// without disturbing the channel itself
    pub fn release_gatt_staging(&mut self) {
        if let Some(cmd) = self.server_outstanding_cmd.as_mut() {
            cmd.multi_rsp_q.clear();
        }
        self.cl_cmd_q.clear();
    }

    // Client command queue

    /// Queue a client request. The queue may never outgrow the transport's
    /// current credit budget.
    pub fn queue_client_command(&mut self, cmd: ClientCommand) -> EattResult<()> {
        if self.cl_cmd_q.len() >= self.tx_credits as usize {
            return Err(EattError::QueueFull(self.cid));
        }
        self.cl_cmd_q.push_back(cmd);
        Ok(())
    }

    pub fn pop_client_command(&mut self) -> Option<ClientCommand> {
        self.cl_cmd_q.pop_front()
    }

    pub fn has_queued_data(&self) -> bool {
        !self.cl_cmd_q.is_empty()
    }

    pub fn queue_depth(&self) -> usize {
        self.cl_cmd_q.len()
    }

    // Credits

    pub fn credits(&self) -> u16 {
        self.tx_credits
    }

    pub fn add_credits(&mut self, credits: u16) {
        self.tx_credits = self.tx_credits.saturating_add(credits);
    }

    pub fn consume_credit(&mut self) -> bool {
        if self.tx_credits == 0 {
            return false;
        }
        self.tx_credits -= 1;
        true
    }

    // Readiness predicates used by the selection policy

    fn is_usable(&self) -> bool {
        matches!(
            self.state,
            EattChannelState::Opened | EattChannelState::Reconfiguring
        )
    }

    /// Usable and no unconfirmed indication on this bearer
    pub fn is_available_for_indication(&self) -> bool {
        self.is_usable() && self.indicate_handle.is_none()
    }

    /// Usable and both the server slot and the client queue can accept one
    /// more request
    pub fn is_available_for_client_request(&self) -> bool {
        self.is_usable() && self.server_outstanding_cmd.is_none() && self.cl_cmd_q.is_empty()
    }

    // Timers

    pub fn ack_timer(&self) -> Option<AlarmHandle> {
        self.ind_ack_timer
    }

    pub fn confirmation_timer(&self) -> Option<AlarmHandle> {
        self.ind_confirmation_timer
    }

    /// Release both alarms back to the scheduler
    ///
    /// Safe on a channel that never reached `Opened` (no alarms were
    /// allocated) and safe to call more than once. Every destruction path
    /// must come through here; a `Drop` impl cannot reach the scheduler.
    pub fn release_timers(&mut self, alarms: &mut dyn AlarmScheduler) {
        if let Some(handle) = self.ind_ack_timer.take() {
            alarms.destroy(handle);
        }
        if let Some(handle) = self.ind_confirmation_timer.take() {
            alarms.destroy(handle);
        }
    }
}
