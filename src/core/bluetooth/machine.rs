//! Connection state machine
//! Pure transition logic: every command, radio event and timer expiry is
//! turned into a new [`ConnectionState`] plus a list of [`Effect`]s for the
//! link manager to carry out. Nothing here touches the radio or the clock.

use std::time::Duration;

use log::{debug, info, warn};

use crate::core::bluetooth::commands::RadioCommand;
use crate::core::bluetooth::errors::LinkError;
use crate::core::bluetooth::events::Notice;
use crate::core::bluetooth::radio::{Discovery, LinkStatus, RadioEvent};
use crate::core::bluetooth::types::{ConnectionState, PeerIdentity, Role, ServiceDescriptor};

/// Upper bounds for the states that wait on the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTimeouts {
    pub connect: Duration,
    pub discovery: Duration,
    pub disconnect: Duration,
}

/// Commands the application can issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartAdvertise,
    StopAdvertise,
    StartScan,
    StopScan,
    Connect(PeerIdentity),
    Disconnect,
}

impl Command {
    fn describe(&self) -> &'static str {
        match self {
            Self::StartAdvertise => "start advertising",
            Self::StopAdvertise => "stop advertising",
            Self::StartScan => "start scanning",
            Self::StopScan => "stop scanning",
            Self::Connect(_) => "connect",
            Self::Disconnect => "disconnect",
        }
    }
}

/// Work the link manager performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Radio(RadioCommand),
    Notify(Notice),
    /// Deliver `Input::Timeout(epoch)` after `after`
    ArmTimer { epoch: u64, after: Duration },
    ScanStarted,
    PeerFound(PeerIdentity),
    ScanStopped,
    /// Inbound characteristic value from the connected peer
    Deliver { peer: PeerIdentity, value: Vec<u8> },
}

pub struct LinkMachine {
    state: ConnectionState,
    role: Option<Role>,
    descriptor: ServiceDescriptor,
    timeouts: LinkTimeouts,
    service_published: bool,
    /// Reason the adapter went away, if it is currently unavailable
    unavailable: Option<String>,
    scan_generation: u64,
    /// Bumped on every transition; a timer only fires for the epoch that armed it
    epoch: u64,
}

impl LinkMachine {
    pub fn new(descriptor: ServiceDescriptor, timeouts: LinkTimeouts) -> Self {
        Self {
            state: ConnectionState::Idle,
            role: None,
            descriptor,
            timeouts,
            service_published: false,
            unavailable: None,
            scan_generation: 0,
            epoch: 0,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Active role; `None` exactly when the state is `Idle`
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Applies an application command. Rejected commands leave the state untouched.
    pub fn handle_command(&mut self, command: Command) -> Result<Vec<Effect>, LinkError> {
        let mut effects = Vec::new();
        match (self.state.clone(), command) {
            (ConnectionState::Advertising, Command::StartAdvertise)
            | (ConnectionState::Scanning, Command::StartScan) => {}

            (ConnectionState::Idle, Command::StartAdvertise) => {
                self.ensure_radio()?;
                self.role = Some(Role::Server);
                if !self.service_published {
                    effects.push(Effect::Radio(RadioCommand::PublishService(self.descriptor)));
                    self.service_published = true;
                }
                effects.push(Effect::Radio(RadioCommand::Advertise));
                effects.push(Effect::Notify(Notice::Advertising));
                self.enter(ConnectionState::Advertising);
            }

            (ConnectionState::Idle, Command::StartScan) => {
                self.ensure_radio()?;
                self.role = Some(Role::Client);
                self.scan_generation += 1;
                effects.push(Effect::Radio(RadioCommand::Scan {
                    generation: self.scan_generation,
                }));
                effects.push(Effect::ScanStarted);
                effects.push(Effect::Notify(Notice::ScanStarted));
                self.enter(ConnectionState::Scanning);
            }

            (ConnectionState::Scanning, Command::Connect(peer)) => {
                effects.push(Effect::Radio(RadioCommand::StopScan));
                effects.push(Effect::ScanStopped);
                effects.push(Effect::Radio(RadioCommand::Connect(peer.clone())));
                effects.push(Effect::Notify(Notice::Connecting(peer.clone())));
                self.enter(ConnectionState::Connecting(peer));
                effects.push(self.arm(self.timeouts.connect));
            }

            (ConnectionState::Advertising, Command::StopAdvertise | Command::Disconnect) => {
                effects.push(Effect::Radio(RadioCommand::StopAdvertise));
                effects.push(Effect::Notify(Notice::AdvertisingStopped));
                self.enter(ConnectionState::Idle);
            }

            (ConnectionState::Scanning, Command::StopScan | Command::Disconnect) => {
                effects.push(Effect::Radio(RadioCommand::StopScan));
                effects.push(Effect::ScanStopped);
                effects.push(Effect::Notify(Notice::ScanStopped));
                self.enter(ConnectionState::Idle);
            }

            (
                ConnectionState::Connecting(peer)
                | ConnectionState::DiscoveringServices(peer)
                | ConnectionState::Connected(peer, _),
                Command::Disconnect,
            ) => self.teardown(Some(peer), &mut effects),

            // Stopping something that is not running is a no-op.
            (_, Command::StopAdvertise | Command::StopScan | Command::Disconnect) => {}

            (state, command) => {
                let state = state.name();
                debug!("Rejecting '{}' while {}", command.describe(), state);
                return Err(LinkError::InvalidCommand {
                    command: command.describe(),
                    state,
                });
            }
        }
        Ok(effects)
    }

    /// Applies an event from the radio stack
    pub fn handle_event(&mut self, event: RadioEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            RadioEvent::ConnectionStateChanged {
                peer,
                status: LinkStatus::Connected,
            } => self.on_linked(peer, &mut effects),

            RadioEvent::ConnectionStateChanged {
                peer,
                status: LinkStatus::Disconnected,
            } => self.on_unlinked(peer, &mut effects),

            RadioEvent::ConnectFailed { peer, reason } => {
                if matches!(&self.state, ConnectionState::Connecting(p) if *p == peer) {
                    effects.push(Effect::Notify(Notice::error(LinkError::ConnectFailed {
                        peer,
                        reason,
                    })));
                    self.enter(ConnectionState::Idle);
                } else {
                    debug!("Ignoring connect failure for superseded peer {}", peer);
                }
            }

            RadioEvent::ServicesDiscovered { peer, result } => {
                if !matches!(&self.state, ConnectionState::DiscoveringServices(p) if *p == peer) {
                    debug!("Ignoring service discovery result for {}", peer);
                    return effects;
                }
                match result {
                    Discovery::Found(found) if self.is_required_service(&found) => {
                        info!("Found Chippy service on {}", peer);
                        effects.push(Effect::Radio(RadioCommand::Subscribe(self.descriptor)));
                        effects.push(Effect::Notify(Notice::Connected {
                            peer: peer.clone(),
                            role: Role::Client,
                        }));
                        self.enter(ConnectionState::Connected(peer, Role::Client));
                    }
                    _ => {
                        warn!("{} does not expose service {}", peer, self.descriptor.service);
                        effects.push(Effect::Notify(Notice::error(LinkError::IncompatiblePeer {
                            peer: peer.clone(),
                        })));
                        self.teardown(Some(peer), &mut effects);
                    }
                }
            }

            RadioEvent::DiscoveryFailed { peer, reason } => {
                if matches!(&self.state, ConnectionState::DiscoveringServices(p) if *p == peer) {
                    effects.push(Effect::Notify(Notice::error(LinkError::ConnectFailed {
                        peer: peer.clone(),
                        reason,
                    })));
                    self.teardown(Some(peer), &mut effects);
                }
            }

            RadioEvent::SubscribeFailed { reason } => {
                if let ConnectionState::Connected(peer, Role::Client) = &self.state {
                    let peer = peer.clone();
                    effects.push(Effect::Notify(Notice::error(LinkError::ConnectFailed {
                        peer: peer.clone(),
                        reason,
                    })));
                    self.teardown(Some(peer), &mut effects);
                }
            }

            RadioEvent::WriteRequest { peer, value } => {
                if matches!(&self.state, ConnectionState::Connected(p, Role::Server) if *p == peer) {
                    effects.push(Effect::Deliver { peer, value });
                } else {
                    warn!("Ignoring write request from {} while {}", peer, self.state.name());
                }
            }

            RadioEvent::CharacteristicChanged { peer, value } => {
                if matches!(&self.state, ConnectionState::Connected(p, Role::Client) if *p == peer) {
                    effects.push(Effect::Deliver { peer, value });
                } else {
                    warn!("Ignoring notification from {} while {}", peer, self.state.name());
                }
            }

            RadioEvent::PeerDiscovered { generation, peer } => {
                if self.is_current_scan(generation) {
                    effects.push(Effect::PeerFound(peer));
                }
            }

            RadioEvent::ScanEnded { generation } => {
                if self.is_current_scan(generation) {
                    effects.push(Effect::ScanStopped);
                    effects.push(Effect::Notify(Notice::ScanStopped));
                    self.enter(ConnectionState::Idle);
                }
            }

            RadioEvent::ScanFailed { generation, reason } => {
                if self.is_current_scan(generation) {
                    effects.push(Effect::ScanStopped);
                    effects.push(Effect::Notify(Notice::error(LinkError::ScanFailed(reason))));
                    self.enter(ConnectionState::Idle);
                }
            }

            RadioEvent::WriteFailed { reason } => {
                effects.push(Effect::Notify(Notice::error(LinkError::WriteFailed(reason))));
            }

            RadioEvent::AdvertiseFailed { reason } => {
                // Register again on the next attempt; the failure may have been the publish.
                self.service_published = false;
                if matches!(self.state, ConnectionState::Advertising) {
                    effects.push(Effect::Notify(Notice::error(LinkError::AdvertiseFailed(reason))));
                    self.enter(ConnectionState::Idle);
                }
            }

            RadioEvent::AdapterUnavailable { reason } => {
                warn!("Bluetooth adapter unavailable: {}", reason);
                self.unavailable = Some(reason.clone());
                match &self.state {
                    ConnectionState::Idle => {}
                    ConnectionState::Advertising => {
                        effects.push(Effect::Radio(RadioCommand::StopAdvertise));
                    }
                    ConnectionState::Scanning => {
                        effects.push(Effect::Radio(RadioCommand::StopScan));
                        effects.push(Effect::ScanStopped);
                    }
                    // Release whatever link the binding still holds.
                    _ => effects.push(Effect::Radio(RadioCommand::Disconnect { peer: None })),
                }
                effects.push(Effect::Notify(Notice::error(LinkError::RadioUnavailable(reason))));
                self.enter(ConnectionState::Idle);
            }

            RadioEvent::AdapterAvailable => {
                if self.unavailable.take().is_some() {
                    info!("Bluetooth adapter is available again");
                    effects.push(Effect::Notify(Notice::RadioAvailable));
                }
            }
        }
        effects
    }

    /// Handles a timer armed for `epoch`; stale timers are ignored
    pub fn handle_timeout(&mut self, epoch: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if epoch != self.epoch {
            return effects;
        }
        match &self.state {
            ConnectionState::Connecting(peer) => {
                warn!("Connection to {} timed out", peer);
                effects.push(Effect::Notify(Notice::error(LinkError::ConnectFailed {
                    peer: peer.clone(),
                    reason: "connection timed out".to_string(),
                })));
                effects.push(Effect::Radio(RadioCommand::Disconnect { peer: None }));
                self.enter(ConnectionState::Idle);
            }
            ConnectionState::DiscoveringServices(peer) => {
                warn!("Service discovery on {} timed out", peer);
                effects.push(Effect::Notify(Notice::error(LinkError::IncompatiblePeer {
                    peer: peer.clone(),
                })));
                effects.push(Effect::Radio(RadioCommand::Disconnect { peer: None }));
                self.enter(ConnectionState::Idle);
            }
            ConnectionState::Disconnecting => {
                warn!("Radio did not confirm disconnect, forcing Idle");
                effects.push(Effect::Notify(Notice::Disconnected));
                self.enter(ConnectionState::Idle);
            }
            _ => {}
        }
        effects
    }

    fn on_linked(&mut self, peer: PeerIdentity, effects: &mut Vec<Effect>) {
        match &self.state {
            ConnectionState::Advertising => {
                info!("{} connected to our service", peer);
                effects.push(Effect::Radio(RadioCommand::StopAdvertise));
                effects.push(Effect::Notify(Notice::Connected {
                    peer: peer.clone(),
                    role: Role::Server,
                }));
                self.enter(ConnectionState::Connected(peer, Role::Server));
            }
            ConnectionState::Connecting(p) if *p == peer => {
                info!("Connection successful, discovering services...");
                effects.push(Effect::Radio(RadioCommand::DiscoverServices(peer.clone())));
                self.enter(ConnectionState::DiscoveringServices(peer));
                effects.push(self.arm(self.timeouts.discovery));
            }
            ConnectionState::Idle | ConnectionState::Disconnecting => {
                // A connect that completed after it was cancelled or timed out.
                warn!("Late link to {} while {}, tearing it down", peer, self.state.name());
                effects.push(Effect::Radio(RadioCommand::Disconnect { peer: None }));
            }
            state => {
                warn!("Ignoring link from {} while {}", peer, state.name());
            }
        }
    }

    fn on_unlinked(&mut self, peer: PeerIdentity, effects: &mut Vec<Effect>) {
        match &self.state {
            ConnectionState::Connecting(p) if *p == peer => {
                effects.push(Effect::Notify(Notice::error(LinkError::ConnectFailed {
                    peer,
                    reason: "link closed while connecting".to_string(),
                })));
                self.enter(ConnectionState::Idle);
            }
            ConnectionState::DiscoveringServices(p) if *p == peer => {
                effects.push(Effect::Notify(Notice::error(LinkError::ConnectFailed {
                    peer,
                    reason: "link closed during service discovery".to_string(),
                })));
                self.enter(ConnectionState::Idle);
            }
            ConnectionState::Connected(p, _) if *p == peer => {
                warn!("Link to {} dropped", peer);
                effects.push(Effect::Notify(Notice::error(LinkError::LinkDropped { peer })));
                self.enter(ConnectionState::Idle);
            }
            ConnectionState::Disconnecting => {
                effects.push(Effect::Notify(Notice::Disconnected));
                self.enter(ConnectionState::Idle);
            }
            _ => debug!("Ignoring disconnect of {} while {}", peer, self.state.name()),
        }
    }

    fn teardown(&mut self, peer: Option<PeerIdentity>, effects: &mut Vec<Effect>) {
        effects.push(Effect::Radio(RadioCommand::Disconnect { peer }));
        self.enter(ConnectionState::Disconnecting);
        effects.push(self.arm(self.timeouts.disconnect));
    }

    fn enter(&mut self, next: ConnectionState) {
        info!("Link state: {} -> {}", self.state.name(), next.name());
        if next.is_idle() {
            self.role = None;
        }
        self.state = next;
        self.epoch += 1;
    }

    fn arm(&self, after: Duration) -> Effect {
        Effect::ArmTimer {
            epoch: self.epoch,
            after,
        }
    }

    fn ensure_radio(&self) -> Result<(), LinkError> {
        match &self.unavailable {
            Some(reason) => Err(LinkError::RadioUnavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn is_current_scan(&self, generation: u64) -> bool {
        matches!(self.state, ConnectionState::Scanning) && generation == self.scan_generation
    }

    fn is_required_service(&self, found: &ServiceDescriptor) -> bool {
        found.service == self.descriptor.service
            && found.characteristic == self.descriptor.characteristic
    }
}
