//! The process-wide change feed connection, multiplexing logical channels.

use crate::error::{Result, SyncError};
use crate::types::AccessToken;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::types::{ChangeRecord, ChannelConfig, ChannelHandle, ChannelId, CloseReason, FeedEvent};

/// Feed configuration.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Max logical channels multiplexed over the connection.
    /// Default: 256
    pub max_channels: usize,

    /// Credential applied at connect time.
    pub auth_token: Option<AccessToken>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_channels: 256,
            auth_token: None,
        }
    }
}

/// Internal channel state.
struct Channel {
    config: ChannelConfig,
    sender: Sender<FeedEvent>,
    /// Whether the channel has joined the live connection.
    joined: bool,
}

impl Channel {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (the channel will be dropped).
    fn try_send(&self, event: FeedEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

/// One change-feed connection per process.
///
/// Views never open their own connection: they `subscribe` a logical
/// channel, and the feed fans matching changes out to every joined channel.
/// `connect` joins pending channels (each gets `FeedEvent::Subscribed`),
/// `disconnect` parks them until the next `connect`, and `shutdown` closes
/// them for good.
pub struct ChangeFeed {
    config: FeedConfig,
    /// Active channels by ID.
    channels: RwLock<HashMap<ChannelId, Channel>>,
    /// Counter for generating channel IDs.
    next_id: AtomicU64,
    connected: AtomicBool,
    auth: RwLock<Option<AccessToken>>,
    auth_updates: AtomicU64,
}

impl ChangeFeed {
    /// Create a disconnected feed.
    pub fn new(config: FeedConfig) -> Self {
        let auth = config.auth_token.clone();
        Self {
            config,
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
            auth: RwLock::new(auth),
            auth_updates: AtomicU64::new(0),
        }
    }

    /// Bring the connection up and join every pending channel.
    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        info!(channels = self.channel_count(), "change feed connected");

        let mut to_remove = Vec::new();
        {
            let mut channels = self.channels.write();
            for (id, channel) in channels.iter_mut() {
                if channel.joined {
                    continue;
                }
                if channel.try_send(FeedEvent::Subscribed) {
                    channel.joined = true;
                } else {
                    to_remove.push(*id);
                }
            }
            for id in to_remove {
                channels.remove(&id);
            }
        }
    }

    /// Drop the connection. Channels stay registered and rejoin on the
    /// next `connect`.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        for channel in self.channels.write().values_mut() {
            channel.joined = false;
        }
        info!("change feed disconnected");
    }

    /// Tear the feed down, closing every channel.
    pub fn shutdown(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let mut channels = self.channels.write();
        for (_, channel) in channels.drain() {
            let _ = channel.sender.try_send(FeedEvent::Closed {
                reason: CloseReason::Shutdown,
            });
        }
        info!("change feed shut down");
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Open a logical channel.
    ///
    /// If the feed is connected the channel joins immediately and its first
    /// event is `FeedEvent::Subscribed`.
    pub fn subscribe(&self, config: ChannelConfig) -> Result<ChannelHandle> {
        if config.buffer_size == 0 {
            return Err(SyncError::Stream("channel buffer size must be non-zero".into()));
        }

        let mut channels = self.channels.write();
        if channels.len() >= self.config.max_channels {
            return Err(SyncError::Stream(format!(
                "channel limit reached ({})",
                self.config.max_channels
            )));
        }

        let id = ChannelId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size);

        let mut channel = Channel {
            config,
            sender,
            joined: false,
        };
        if self.is_connected() {
            channel.joined = channel.try_send(FeedEvent::Subscribed);
        }

        debug!(
            channel = id.0,
            table = %channel.config.table,
            filter = ?channel.config.filter.as_ref().map(|f| f.to_string()),
            "channel opened"
        );
        channels.insert(id, channel);

        Ok(ChannelHandle { id, receiver })
    }

    /// Close a channel and clean up.
    pub fn remove_channel(&self, id: ChannelId) {
        let mut channels = self.channels.write();
        if let Some(channel) = channels.remove(&id) {
            // Best effort; the receiver may already be gone.
            let _ = channel.sender.try_send(FeedEvent::Closed {
                reason: CloseReason::Unsubscribed,
            });
            debug!(channel = id.0, "channel removed");
        }
    }

    /// Get channel count.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Re-apply a credential to the transport.
    pub fn set_auth(&self, token: AccessToken) {
        *self.auth.write() = Some(token);
        self.auth_updates.fetch_add(1, Ordering::SeqCst);
        debug!("change feed credential updated");
    }

    /// The credential currently applied to the transport.
    pub fn auth_token(&self) -> Option<AccessToken> {
        self.auth.read().clone()
    }

    /// How many times `set_auth` has been called.
    pub fn auth_updates(&self) -> u64 {
        self.auth_updates.load(Ordering::SeqCst)
    }

    // --- Ingress ---

    /// Deliver a change to every joined channel that matches it.
    ///
    /// Returns the number of channels that received it. Channels that cannot
    /// keep up are dropped.
    pub fn publish(&self, record: &ChangeRecord) -> usize {
        if !self.is_connected() {
            return 0;
        }

        let mut delivered = 0;
        let mut to_remove = Vec::new();

        {
            let channels = self.channels.read();
            for (id, channel) in channels.iter() {
                if !channel.joined || !channel.config.matches(record) {
                    continue;
                }
                let event = FeedEvent::Change {
                    record: record.clone(),
                };
                if channel.try_send(event) {
                    delivered += 1;
                } else {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut channels = self.channels.write();
            for id in to_remove {
                if let Some(channel) = channels.remove(&id) {
                    warn!(channel = id.0, "dropping slow channel");
                    // Might fail if the buffer is still full, that's ok.
                    let _ = channel.sender.try_send(FeedEvent::Closed {
                        reason: CloseReason::BufferOverflow,
                    });
                }
            }
        }

        delivered
    }

    /// Decode a JSON change message from the transport and publish it.
    pub fn publish_json(&self, message: &str) -> Result<usize> {
        let record = ChangeRecord::from_json(message)?;
        Ok(self.publish(&record))
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(FeedConfig::default())
    }
}
