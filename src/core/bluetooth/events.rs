//! Event sink
//! The single publish point the UI observes. Publishing never blocks: state,
//! message log and scan results sit in `watch` channels so late subscribers
//! see the latest value, transient notices go through a `broadcast` channel.

use std::collections::HashSet;
use std::fmt;

use futures_util::stream::{self, BoxStream, StreamExt};
use log::{debug, info, warn};
use serde::{Serialize, Serializer};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

use crate::core::bluetooth::constants::{NOTICE_CHANNEL_CAPACITY, SCAN_CHANNEL_CAPACITY};
use crate::core::bluetooth::errors::LinkError;
use crate::core::bluetooth::types::{ConnectionState, MessageRecord, PeerIdentity, Role};

/// Transient, toast-style notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Notice {
    Advertising,
    AdvertisingStopped,
    ScanStarted,
    ScanStopped,
    Connecting(PeerIdentity),
    Connected { peer: PeerIdentity, role: Role },
    Disconnected,
    MessageSent,
    RadioAvailable,
    Error {
        #[serde(serialize_with = "serialize_display")]
        error: LinkError,
    },
}

impl Notice {
    pub fn error(error: LinkError) -> Self {
        Self::Error { error }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advertising => f.write_str("Advertising Chippy service..."),
            Self::AdvertisingStopped => f.write_str("Advertising stopped"),
            Self::ScanStarted => f.write_str("Scanning for devices..."),
            Self::ScanStopped => f.write_str("Scan stopped"),
            Self::Connecting(peer) => write!(f, "Connecting to {}", peer.display_name()),
            Self::Connected { peer, .. } => write!(f, "Connected to {}", peer.display_name()),
            Self::Disconnected => f.write_str("Disconnected"),
            Self::MessageSent => f.write_str("Message sent"),
            Self::RadioAvailable => f.write_str("Bluetooth is available"),
            Self::Error { error } => write!(f, "{}", error),
        }
    }
}

fn serialize_display<S: Serializer>(error: &LinkError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

#[derive(Debug, Clone)]
enum ScanUpdate {
    Found(PeerIdentity),
    Finished,
}

pub struct EventSink {
    state: watch::Sender<ConnectionState>,
    messages: watch::Sender<Vec<MessageRecord>>,
    peers: watch::Sender<Vec<PeerIdentity>>,
    scanning: watch::Sender<bool>,
    scan_updates: broadcast::Sender<ScanUpdate>,
    notices: broadcast::Sender<Notice>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        Self {
            state: watch::channel(ConnectionState::Idle).0,
            messages: watch::channel(Vec::new()).0,
            peers: watch::channel(Vec::new()).0,
            scanning: watch::channel(false).0,
            scan_updates: broadcast::channel(SCAN_CHANNEL_CAPACITY).0,
            notices: broadcast::channel(NOTICE_CHANNEL_CAPACITY).0,
        }
    }

    pub fn publish_state(&self, state: &ConnectionState) {
        self.state.send_if_modified(|current| {
            if current == state {
                return false;
            }
            *current = state.clone();
            true
        });
    }

    pub fn publish_message(&self, record: MessageRecord) {
        debug!("Publishing message #{}", record.index);
        self.messages.send_modify(|log| log.push(record));
    }

    /// A new scan begins with an empty peer list
    pub fn scan_started(&self) {
        self.peers.send_replace(Vec::new());
        self.scanning.send_replace(true);
    }

    pub fn peer_found(&self, peer: PeerIdentity) {
        let added = self.peers.send_if_modified(|peers| {
            if peers.contains(&peer) {
                return false;
            }
            peers.push(peer.clone());
            true
        });
        if added {
            info!("Found device: {}", peer);
            // No live subscriber is fine; the list above keeps the peer.
            let _ = self.scan_updates.send(ScanUpdate::Found(peer));
        }
    }

    pub fn scan_stopped(&self) {
        if self.scanning.send_replace(false) {
            let _ = self.scan_updates.send(ScanUpdate::Finished);
        }
    }

    pub fn notify(&self, notice: Notice) {
        match &notice {
            Notice::Error { error } => warn!("{}", error),
            other => info!("{}", other),
        }
        let _ = self.notices.send(notice);
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn messages(&self) -> watch::Receiver<Vec<MessageRecord>> {
        self.messages.subscribe()
    }

    pub fn peers(&self) -> watch::Receiver<Vec<PeerIdentity>> {
        self.peers.subscribe()
    }

    pub fn scanning(&self) -> watch::Receiver<bool> {
        self.scanning.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Peers of the scan in progress, starting with those already found.
    ///
    /// The stream ends without error when the scan stops, and is empty when
    /// no scan is running.
    pub fn discovered_peers(&self) -> BoxStream<'static, PeerIdentity> {
        let updates = self.scan_updates.subscribe();
        if !*self.scanning.borrow() {
            return stream::empty().boxed();
        }
        let known = self.peers.borrow().clone();
        let seen: HashSet<PeerIdentity> = known.iter().cloned().collect();

        let live = stream::unfold((updates, seen), |(mut updates, mut seen)| async move {
            loop {
                match updates.recv().await {
                    Ok(ScanUpdate::Found(peer)) => {
                        if seen.insert(peer.clone()) {
                            return Some((peer, (updates, seen)));
                        }
                    }
                    Ok(ScanUpdate::Finished) | Err(RecvError::Closed) => return None,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Discovery stream lagged, {} updates skipped", skipped);
                    }
                }
            }
        });
        stream::iter(known).chain(live).boxed()
    }
}
