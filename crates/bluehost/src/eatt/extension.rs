//! EATT extension facade
//!
//! The single entry point the rest of the stack uses for enhanced ATT
//! bearers: connect/disconnect/reconfigure a peer's channels, look
//! channels up, pick the best channel for an operation class, and run the
//! per-channel indication timers. Owns all per-device state exclusively;
//! every operation executes on the stack's single processing context and
//! nothing here blocks. Channel establishment and MTU negotiation are
//! asynchronous; outcomes arrive through the `on_*` transport entry
//! points.

use std::collections::HashMap;
use std::fmt;

use log::{debug, error, info, warn};

use super::alarm::{AlarmScheduler, TimerEvent, TimerKind};
use super::channel::EattChannel;
use super::constants::*;
use super::device::EattDevice;
use super::pdu;
use super::transport::CreditBasedTransport;
use super::types::{
    ChannelId, ClientCommand, EattChannelState, EattConfig, EattError, EattResult, PeerFeatures,
};
use crate::gap::BdAddr;

/// The EATT channel-multiplexing engine
///
/// Explicitly constructed and owned by its caller; collaborators are
/// supplied as capability traits so tests can substitute doubles.
pub struct EattExtension {
    config: EattConfig,
    devices: HashMap<BdAddr, EattDevice>,
    transport: Box<dyn CreditBasedTransport>,
    alarms: Box<dyn AlarmScheduler>,
    running: bool,
}

impl EattExtension {
    pub fn new(
        transport: Box<dyn CreditBasedTransport>,
        alarms: Box<dyn AlarmScheduler>,
    ) -> Self {
        Self::with_config(EattConfig::default(), transport, alarms)
    }

    pub fn with_config(
        config: EattConfig,
        transport: Box<dyn CreditBasedTransport>,
        alarms: Box<dyn AlarmScheduler>,
    ) -> Self {
        Self {
            config,
            devices: HashMap::new(),
            transport,
            alarms,
            running: false,
        }
    }

    // Module lifecycle

    /// No-op when already running
    pub fn start(&mut self) {
        if self.running {
            debug!("EATT module already started");
            return;
        }
        self.running = true;
        info!("EATT module started");
    }

    /// Tears down all per-device state. Safe to call mid-negotiation;
    /// close is best-effort and nothing is waited on.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        for device in self.devices.values_mut() {
            let cids = device.cids();
            device.remove_all_channels(self.alarms.as_mut());
            for cid in cids {
                self.transport.close_channel(device.address(), cid);
            }
        }
        self.devices.clear();
        self.running = false;
        info!("EATT module stopped");
    }

    // Peer capability tracking

    /// Pure query against cached peer capability data
    pub fn is_eatt_supported_by_peer(&self, addr: BdAddr) -> bool {
        self.devices
            .get(&addr)
            .map(|device| device.is_eatt_supported())
            .unwrap_or(false)
    }

    /// Seed a bonded device's capability bits at boot, without opening
    /// channels
    pub fn add_from_storage(&mut self, addr: BdAddr) {
        let device = self
            .devices
            .entry(addr)
            .or_insert_with(|| EattDevice::new(addr));
        device.set_eatt_supported(true);
        debug!("Restored EATT support for bonded device {}", addr);
    }

    /// Record capability bits learned from live service discovery
    pub fn on_peer_supported_features(&mut self, addr: BdAddr, features: PeerFeatures) {
        let device = self
            .devices
            .entry(addr)
            .or_insert_with(|| EattDevice::new(addr));
        device.set_eatt_supported(features.contains(PeerFeatures::EATT_SUPPORTED));
    }

    // Channel lifecycle

    /// Request establishment of the full complement of enhanced bearers
    ///
    /// Idempotent: a device that already has channels (pending or open)
    /// is left untouched. The transport negotiates asynchronously; each
    /// channel completes via `on_channel_opened` or `on_open_failed`.
    pub fn connect(&mut self, addr: BdAddr) -> EattResult<()> {
        if !self.running {
            return Err(EattError::NotStarted);
        }

        let Some(device) = self.devices.get_mut(&addr) else {
            return Err(EattError::NotSupported(addr));
        };
        if !device.is_eatt_supported() {
            warn!("EATT connect refused, {} does not support EATT", addr);
            return Err(EattError::NotSupported(addr));
        }
        if device.channel_count() > 0 {
            debug!("EATT channels already set up for {}", addr);
            return Ok(());
        }

        let count = self.config.channels_per_device;
        let mtu = self.config.default_mtu;
        let cids = self.transport.open_channels(addr, count, mtu)?;

        for cid in cids {
            device.add_channel(EattChannel::new(addr, cid, mtu, mtu))?;
        }
        info!(
            "Requested {} EATT channel(s) to {}",
            device.channel_count(),
            addr
        );
        Ok(())
    }

    /// Tear down one channel, or all of the device's channels when `cid`
    /// is `None`. No-op for an unknown device or channel. A `Pending`
    /// channel's open attempt is cancelled at the transport.
    pub fn disconnect(&mut self, addr: BdAddr, cid: Option<ChannelId>) {
        let Some(device) = self.devices.get_mut(&addr) else {
            return;
        };

        match cid {
            Some(cid) => {
                if device.remove_channel(cid, self.alarms.as_mut()).is_some() {
                    self.transport.close_channel(addr, cid);
                    info!("Disconnected EATT channel 0x{:04x} to {}", cid, addr);
                }
            }
            None => {
                let cids = device.cids();
                device.remove_all_channels(self.alarms.as_mut());
                for cid in &cids {
                    self.transport.close_channel(addr, *cid);
                }
                if !cids.is_empty() {
                    info!("Disconnected all {} EATT channel(s) to {}", cids.len(), addr);
                }
            }
        }
    }

    /// Request a new local receive MTU for one channel
    ///
    /// The channel moves to `Reconfiguring`; traffic accepted under the
    /// old MTU is not aborted.
    pub fn reconfigure(&mut self, addr: BdAddr, cid: ChannelId, mtu: u16) -> EattResult<()> {
        if !self.running {
            return Err(EattError::NotStarted);
        }
        let Some(device) = self.devices.get_mut(&addr) else {
            return Err(EattError::DeviceNotFound(addr));
        };
        let Some(channel) = device.find_channel_mut(cid) else {
            return Err(EattError::ChannelNotFound(cid));
        };
        if channel.state() != EattChannelState::Opened {
            return Err(EattError::InvalidState(channel.state()));
        }

        channel.set_state(EattChannelState::Reconfiguring, self.alarms.as_mut());
        if let Err(e) = self.transport.reconfigure(addr, &[cid], mtu) {
            channel.set_state(EattChannelState::Opened, self.alarms.as_mut());
            return Err(e);
        }
        Ok(())
    }

    /// Request a new local receive MTU for every opened channel of the
    /// device
    pub fn reconfigure_all(&mut self, addr: BdAddr, mtu: u16) -> EattResult<()> {
        if !self.running {
            return Err(EattError::NotStarted);
        }
        let Some(device) = self.devices.get_mut(&addr) else {
            return Err(EattError::DeviceNotFound(addr));
        };

        let cids: Vec<ChannelId> = device
            .channels()
            .filter(|channel| channel.state() == EattChannelState::Opened)
            .map(|channel| channel.cid())
            .collect();
        if cids.is_empty() {
            return Err(EattError::NoChannelAvailable);
        }

        for cid in &cids {
            if let Some(channel) = device.find_channel_mut(*cid) {
                channel.set_state(EattChannelState::Reconfiguring, self.alarms.as_mut());
            }
        }
        if let Err(e) = self.transport.reconfigure(addr, &cids, mtu) {
            for cid in &cids {
                if let Some(channel) = device.find_channel_mut(*cid) {
                    channel.set_state(EattChannelState::Opened, self.alarms.as_mut());
                }
            }
            return Err(e);
        }
        Ok(())
    }

    // Transport event handling; these drive the channel state machine

    /// A credit-based channel finished its handshake
    pub fn on_channel_opened(&mut self, addr: BdAddr, cid: ChannelId, peer_mtu: u16) {
        let initial_credits = self.config.initial_credits;
        let Some(channel) = self
            .devices
            .get_mut(&addr)
            .and_then(|device| device.find_channel_mut(cid))
        else {
            warn!("Open event for unknown EATT channel 0x{:04x} ({})", cid, addr);
            return;
        };
        channel.set_tx_mtu(peer_mtu);
        channel.set_state(EattChannelState::Opened, self.alarms.as_mut());
        if channel.credits() == 0 {
            channel.add_credits(initial_credits);
        }
        info!(
            "EATT channel 0x{:04x} to {} opened, tx_mtu {}",
            cid,
            addr,
            channel.tx_mtu()
        );
    }

    /// The transport could not establish a requested channel
    pub fn on_open_failed(&mut self, addr: BdAddr, cid: ChannelId) {
        if let Some(device) = self.devices.get_mut(&addr) {
            if device.remove_channel(cid, self.alarms.as_mut()).is_some() {
                warn!("EATT channel 0x{:04x} to {} failed to open", cid, addr);
            }
        }
    }

    /// The peer or the controller closed an established channel
    pub fn on_channel_closed(&mut self, addr: BdAddr, cid: ChannelId) {
        if let Some(device) = self.devices.get_mut(&addr) {
            if device.remove_channel(cid, self.alarms.as_mut()).is_some() {
                info!("EATT channel 0x{:04x} to {} closed", cid, addr);
            }
        }
    }

    /// An MTU renegotiation finished. `is_local` distinguishes the
    /// completion of our own request from a peer-initiated change.
    pub fn on_reconfigure_completed(
        &mut self,
        addr: BdAddr,
        cid: ChannelId,
        is_local: bool,
        success: bool,
        new_mtu: u16,
    ) {
        let Some(channel) = self
            .devices
            .get_mut(&addr)
            .and_then(|device| device.find_channel_mut(cid))
        else {
            warn!(
                "Reconfigure event for unknown EATT channel 0x{:04x} ({})",
                cid, addr
            );
            return;
        };

        if is_local {
            if success {
                channel.set_rx_mtu(new_mtu);
                info!(
                    "EATT channel 0x{:04x} to {} reconfigured, rx_mtu {}",
                    cid, addr, new_mtu
                );
            } else {
                warn!("EATT reconfiguration of 0x{:04x} to {} rejected", cid, addr);
            }
            channel.set_state(EattChannelState::Opened, self.alarms.as_mut());
        } else if success {
            channel.set_tx_mtu(new_mtu);
            info!(
                "Peer {} changed EATT channel 0x{:04x} tx_mtu to {}",
                addr,
                cid,
                channel.tx_mtu()
            );
        }
    }

    /// The transport replenished a channel's credit budget
    pub fn on_credits_received(&mut self, addr: BdAddr, cid: ChannelId, credits: u16) {
        if let Some(channel) = self.find_channel_by_cid_mut(addr, cid) {
            channel.add_credits(credits);
        }
    }

    /// Inbound payload on a channel
    ///
    /// The engine recognizes only the PDUs that drive its indication
    /// timers; everything else is the GATT dispatch collaborator's to
    /// route.
    pub fn on_data_received(
        &mut self,
        addr: BdAddr,
        cid: ChannelId,
        payload: &[u8],
    ) -> EattResult<()> {
        let app_ack_timeout = self.config.app_ack_timeout;
        let Some(channel) = self.find_channel_by_cid_mut(addr, cid) else {
            return Err(EattError::ChannelNotFound(cid));
        };

        match pdu::opcode(payload) {
            Some(ATT_OP_HANDLE_VALUE_CONF) => {
                let timer = channel.confirmation_timer();
                match channel.confirm_indication() {
                    Some(handle) => {
                        if let Some(timer) = timer {
                            self.alarms.cancel(timer);
                        }
                        debug!(
                            "Indication 0x{:04x} on channel 0x{:04x} confirmed by {}",
                            handle, cid, addr
                        );
                    }
                    None => {
                        warn!(
                            "Unexpected confirmation on channel 0x{:04x} from {}",
                            cid, addr
                        );
                    }
                }
                Ok(())
            }
            Some(ATT_OP_HANDLE_VALUE_IND) => {
                let (handle, _value) = pdu::decode_handle_value_indication(payload)?;
                // Value routed to GATT dispatch; here we only open the
                // window for the application's acknowledgement
                if let Some(timer) = channel.ack_timer() {
                    self.alarms.arm(
                        timer,
                        app_ack_timeout,
                        TimerEvent {
                            addr,
                            cid,
                            kind: TimerKind::AppAck,
                        },
                    );
                }
                debug!(
                    "Indication 0x{:04x} received on channel 0x{:04x} from {}",
                    handle, cid, addr
                );
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(EattError::InvalidPdu),
        }
    }

    // Lookup

    /// `None` when the device or channel is unknown; never a dangling
    /// reference
    pub fn find_channel_by_cid(&self, addr: BdAddr, cid: ChannelId) -> Option<&EattChannel> {
        self.devices.get(&addr)?.find_channel(cid)
    }

    pub fn find_channel_by_cid_mut(
        &mut self,
        addr: BdAddr,
        cid: ChannelId,
    ) -> Option<&mut EattChannel> {
        self.devices.get_mut(&addr)?.find_channel_mut(cid)
    }

    /// Channel whose server slot carries the given GATT transaction
    pub fn find_channel_by_trans_id(&self, addr: BdAddr, trans_id: u32) -> Option<&EattChannel> {
        self.devices.get(&addr)?.find_channel_by_trans_id(trans_id)
    }

    /// True iff some channel of the device is awaiting confirmation for
    /// this handle
    pub fn is_indication_pending(&self, addr: BdAddr, handle: u16) -> bool {
        self.devices
            .get(&addr)
            .map(|device| device.is_indication_pending(handle))
            .unwrap_or(false)
    }

    // Channel selection; fixed ascending-cid scan, first eligible wins

    pub fn get_channel_available_for_indication(&self, addr: BdAddr) -> Option<&EattChannel> {
        self.devices.get(&addr)?.channel_available_for_indication()
    }

    pub fn get_channel_with_queued_data_to_send(&self, addr: BdAddr) -> Option<&EattChannel> {
        self.devices.get(&addr)?.channel_with_queued_data()
    }

    pub fn get_channel_available_for_client_request(&self, addr: BdAddr) -> Option<&EattChannel> {
        self.devices
            .get(&addr)?
            .channel_available_for_client_request()
    }

    /// True iff any channel of the device has commands waiting to be sent
    pub fn is_outstanding_msg_in_send_queue(&self, addr: BdAddr) -> bool {
        self.devices
            .get(&addr)
            .map(|device| device.has_outstanding_queued_msg())
            .unwrap_or(false)
    }

    // Outbound traffic

    /// Queue a client request on a specific channel, bounded by the
    /// transport's credit budget
    pub fn queue_client_command(
        &mut self,
        addr: BdAddr,
        cid: ChannelId,
        cmd: ClientCommand,
    ) -> EattResult<()> {
        let Some(channel) = self.find_channel_by_cid_mut(addr, cid) else {
            return Err(EattError::ChannelNotFound(cid));
        };
        channel.queue_client_command(cmd)
    }

    /// Send a handle-value indication and arm the confirmation window
    ///
    /// The channel must have no indication outstanding; the selection
    /// policy is the intended way to find one.
    pub fn send_indication(
        &mut self,
        addr: BdAddr,
        cid: ChannelId,
        handle: u16,
        value: &[u8],
    ) -> EattResult<()> {
        if !self.running {
            return Err(EattError::NotStarted);
        }
        let timeout = self.config.ind_confirmation_timeout;
        let Some(channel) = self.find_channel_by_cid_mut(addr, cid) else {
            return Err(EattError::ChannelNotFound(cid));
        };
        if !channel.is_available_for_indication() {
            return Err(EattError::ChannelBusy(cid));
        }
        let Some(timer) = channel.confirmation_timer() else {
            return Err(EattError::InvalidState(channel.state()));
        };
        if !channel.consume_credit() {
            return Err(EattError::NoCredits(cid));
        }
        channel.set_pending_indication(handle);

        let payload = pdu::encode_handle_value_indication(handle, value);
        if let Err(e) = self.transport.send(addr, cid, &payload) {
            // Undo the claim so the channel stays selectable
            if let Some(channel) = self.find_channel_by_cid_mut(addr, cid) {
                channel.confirm_indication();
                channel.add_credits(1);
            }
            return Err(e);
        }

        self.alarms.arm(
            timer,
            timeout,
            TimerEvent {
                addr,
                cid,
                kind: TimerKind::IndicationConfirmation,
            },
        );
        debug!(
            "Indication 0x{:04x} sent on channel 0x{:04x} to {}",
            handle, cid, addr
        );
        Ok(())
    }

    // Indication timers

    /// Arm the peer-confirmation timer; arming while armed restarts it
    pub fn start_indication_confirmation_timer(
        &mut self,
        addr: BdAddr,
        cid: ChannelId,
    ) -> EattResult<()> {
        let timeout = self.config.ind_confirmation_timeout;
        let Some(channel) = self.find_channel_by_cid(addr, cid) else {
            return Err(EattError::ChannelNotFound(cid));
        };
        let Some(timer) = channel.confirmation_timer() else {
            return Err(EattError::InvalidState(channel.state()));
        };
        self.alarms.arm(
            timer,
            timeout,
            TimerEvent {
                addr,
                cid,
                kind: TimerKind::IndicationConfirmation,
            },
        );
        Ok(())
    }

    /// No-op when the timer is not armed
    pub fn stop_indication_confirmation_timer(&mut self, addr: BdAddr, cid: ChannelId) {
        if let Some(timer) = self
            .find_channel_by_cid(addr, cid)
            .and_then(|channel| channel.confirmation_timer())
        {
            self.alarms.cancel(timer);
        }
    }

    /// Arm the application-acknowledgement timer for an incoming
    /// indication
    pub fn start_app_indication_timer(&mut self, addr: BdAddr, cid: ChannelId) -> EattResult<()> {
        let timeout = self.config.app_ack_timeout;
        let Some(channel) = self.find_channel_by_cid(addr, cid) else {
            return Err(EattError::ChannelNotFound(cid));
        };
        let Some(timer) = channel.ack_timer() else {
            return Err(EattError::InvalidState(channel.state()));
        };
        self.alarms.arm(
            timer,
            timeout,
            TimerEvent {
                addr,
                cid,
                kind: TimerKind::AppAck,
            },
        );
        Ok(())
    }

    pub fn stop_app_indication_timer(&mut self, addr: BdAddr, cid: ChannelId) {
        if let Some(timer) = self
            .find_channel_by_cid(addr, cid)
            .and_then(|channel| channel.ack_timer())
        {
            self.alarms.cancel(timer);
        }
    }

    /// Timer expiry, delivered from the owner's event queue
    pub fn handle_timer_expired(&mut self, event: TimerEvent) {
        match event.kind {
            TimerKind::IndicationConfirmation => {
                self.on_confirmation_timeout(event.addr, event.cid)
            }
            TimerKind::AppAck => self.on_app_ack_timeout(event.addr, event.cid),
        }
    }

    /// The peer failed to confirm within the window. Fatal to the
    /// channel and never retried; a second expiry for the same channel
    /// finds no record and does nothing.
    fn on_confirmation_timeout(&mut self, addr: BdAddr, cid: ChannelId) {
        let pending = self
            .find_channel_by_cid(addr, cid)
            .and_then(|channel| channel.pending_indication());
        let Some(handle) = pending else {
            return;
        };

        error!(
            "Peer {} did not confirm indication 0x{:04x} on channel 0x{:04x}, tearing channel down",
            addr, handle, cid
        );
        if let Some(device) = self.devices.get_mut(&addr) {
            device.remove_channel(cid, self.alarms.as_mut());
        }
        self.transport.close_channel(addr, cid);
    }

    /// The local application sat on an incoming indication. Confirm on
    /// its behalf so the peer's transaction timer does not kill the link.
    fn on_app_ack_timeout(&mut self, addr: BdAddr, cid: ChannelId) {
        let Some(channel) = self.find_channel_by_cid_mut(addr, cid) else {
            return;
        };
        channel.consume_credit();
        warn!(
            "Application did not acknowledge indication on channel 0x{:04x} ({}), confirming on its behalf",
            cid, addr
        );
        let payload = pdu::encode_handle_value_confirmation();
        if let Err(e) = self.transport.send(addr, cid, &payload) {
            warn!("Failed to send confirmation on 0x{:04x}: {}", cid, e);
        }
    }

    // Resource management

    /// Drop per-device GATT staging caches (partial responses, queued
    /// requests). Channel records stay.
    pub fn free_gatt_resources(&mut self, addr: BdAddr) {
        if let Some(device) = self.devices.get_mut(&addr) {
            for channel in device.channels_mut() {
                channel.release_gatt_staging();
            }
        }
    }

    // Diagnostics

    /// Render per-device channel state for operational introspection
    pub fn dump<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        writeln!(w, "EATT state, {} device(s)", self.devices.len())?;
        for device in self.devices.values() {
            writeln!(
                w,
                "  Device {}, eatt supported: {}, {} channel(s)",
                device.address(),
                device.is_eatt_supported(),
                device.channel_count()
            )?;
            for channel in device.channels() {
                let conf_armed = channel
                    .confirmation_timer()
                    .map(|timer| self.alarms.is_armed(timer))
                    .unwrap_or(false);
                writeln!(
                    w,
                    "    cid 0x{:04x}: state {}, tx_mtu {}, rx_mtu {}, queued {}, credits {}, conf timer armed: {}",
                    channel.cid(),
                    channel.state(),
                    channel.tx_mtu(),
                    channel.rx_mtu(),
                    channel.queue_depth(),
                    channel.credits(),
                    conf_armed
                )?;
            }
        }
        Ok(())
    }
}
