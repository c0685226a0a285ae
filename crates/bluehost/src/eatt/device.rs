//! Per-device channel set
//!
//! Owns every enhanced bearer record for one peer and answers the lookup
//! and selection queries over them. Channels are keyed by cid in an
//! ordered map so every scan walks ascending cids; the selection policy
//! leans on that order for its deterministic tie-break.

use std::collections::BTreeMap;

use super::alarm::AlarmScheduler;
use super::channel::EattChannel;
use super::constants::EATT_CHANNELS_PER_DEVICE;
use super::types::{ChannelId, EattError, EattResult, PeerFeatures};
use crate::gap::BdAddr;

/// All EATT state for one peer device
#[derive(Debug)]
pub struct EattDevice {
    bda: BdAddr,
    /// Capability bits from service discovery or bond storage
    features: PeerFeatures,
    /// Bearers keyed by cid; iteration order is ascending cid
    channels: BTreeMap<ChannelId, EattChannel>,
}

impl EattDevice {
    pub fn new(bda: BdAddr) -> Self {
        Self {
            bda,
            features: PeerFeatures::empty(),
            channels: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> BdAddr {
        self.bda
    }

    pub fn is_eatt_supported(&self) -> bool {
        self.features.contains(PeerFeatures::EATT_SUPPORTED)
    }

    pub fn set_eatt_supported(&mut self, supported: bool) {
        self.features.set(PeerFeatures::EATT_SUPPORTED, supported);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Insert a new bearer record
    ///
    /// Rejects a duplicate cid and refuses to grow past the per-device
    /// bearer limit.
    pub fn add_channel(&mut self, channel: EattChannel) -> EattResult<()> {
        if self.channels.len() >= EATT_CHANNELS_PER_DEVICE {
            return Err(EattError::NoChannelAvailable);
        }
        if self.channels.contains_key(&channel.cid()) {
            return Err(EattError::ChannelBusy(channel.cid()));
        }
        self.channels.insert(channel.cid(), channel);
        Ok(())
    }

    /// Remove one bearer, releasing its alarms
    pub fn remove_channel(
        &mut self,
        cid: ChannelId,
        alarms: &mut dyn AlarmScheduler,
    ) -> Option<EattChannel> {
        let mut channel = self.channels.remove(&cid)?;
        channel.release_timers(alarms);
        Some(channel)
    }

    /// Remove every bearer, releasing all alarms
    pub fn remove_all_channels(&mut self, alarms: &mut dyn AlarmScheduler) {
        for (_, mut channel) in std::mem::take(&mut self.channels) {
            channel.release_timers(alarms);
        }
    }

    pub fn find_channel(&self, cid: ChannelId) -> Option<&EattChannel> {
        self.channels.get(&cid)
    }

    pub fn find_channel_mut(&mut self, cid: ChannelId) -> Option<&mut EattChannel> {
        self.channels.get_mut(&cid)
    }

    /// Channel whose server slot carries the given GATT transaction
    pub fn find_channel_by_trans_id(&self, trans_id: u32) -> Option<&EattChannel> {
        self.channels
            .values()
            .find(|channel| {
                channel
                    .server_transaction()
                    .map(|cmd| cmd.trans_id == trans_id)
                    .unwrap_or(false)
            })
    }

    /// Ascending-cid iteration over all bearers
    pub fn channels(&self) -> impl Iterator<Item = &EattChannel> {
        self.channels.values()
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut EattChannel> {
        self.channels.values_mut()
    }

    pub fn cids(&self) -> Vec<ChannelId> {
        self.channels.keys().copied().collect()
    }

    // Selection policy scans: fixed ascending-cid order, first eligible
    // channel wins, None when nothing qualifies.

    pub fn channel_available_for_indication(&self) -> Option<&EattChannel> {
        self.channels
            .values()
            .find(|channel| channel.is_available_for_indication())
    }

    pub fn channel_available_for_client_request(&self) -> Option<&EattChannel> {
        self.channels
            .values()
            .find(|channel| channel.is_available_for_client_request())
    }

    pub fn channel_with_queued_data(&self) -> Option<&EattChannel> {
        self.channels.values().find(|channel| channel.has_queued_data())
    }

    /// True iff some bearer is awaiting confirmation for this handle
    pub fn is_indication_pending(&self, handle: u16) -> bool {
        self.channels
            .values()
            .any(|channel| channel.pending_indication() == Some(handle))
    }

    pub fn has_outstanding_queued_msg(&self) -> bool {
        self.channels.values().any(|channel| channel.has_queued_data())
    }
}
