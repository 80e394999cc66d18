//! Link manager for the Chippy messenger
//! This module provides the main interface for bluetooth operations. All
//! state lives on one task that handles application commands, radio events
//! and timer expiries strictly one at a time.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::BoxStream;
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::link_config::LinkConfig;
use crate::core::bluetooth::channel::MessageChannel;
use crate::core::bluetooth::commands::{CommandExecutor, RadioCommand};
use crate::core::bluetooth::errors::LinkError;
use crate::core::bluetooth::events::{EventSink, Notice};
use crate::core::bluetooth::machine::{Command, Effect, LinkMachine};
use crate::core::bluetooth::radio::{Radio, RadioEvent, RadioEventSender};
use crate::core::bluetooth::types::{
    ConnectionState, MessageRecord, PeerIdentity, ServiceDescriptor,
};

/// Everything the link manager reacts to, in arrival order
pub(crate) enum Input {
    Command {
        command: Command,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Send {
        text: String,
        reply: oneshot::Sender<Result<MessageRecord, LinkError>>,
    },
    Radio(RadioEvent),
    Timeout(u64),
    Shutdown(oneshot::Sender<()>),
}

/// Owns the connection state, the message log and the radio executor
pub struct LinkManager {
    machine: LinkMachine,
    channel: MessageChannel,
    sink: Arc<EventSink>,
    radio: mpsc::UnboundedSender<RadioCommand>,
    inputs: mpsc::UnboundedSender<Input>,
}

impl LinkManager {
    /// Starts the link manager on the current tokio runtime.
    ///
    /// `build` receives the sender the radio binding uses for its events.
    pub fn spawn<R, F>(config: &LinkConfig, build: F) -> ChatHandle
    where
        R: Radio + 'static,
        F: FnOnce(RadioEventSender) -> R,
    {
        let (inputs, rx) = mpsc::unbounded_channel();
        let radio: Arc<dyn Radio> = Arc::new(build(RadioEventSender::new(inputs.clone())));
        let (radio_tx, executor) =
            CommandExecutor::new(radio, RadioEventSender::new(inputs.clone())).spawn();

        let descriptor = ServiceDescriptor::CHIPPY;
        let sink = Arc::new(EventSink::new());
        let manager = LinkManager {
            machine: LinkMachine::new(descriptor, config.timeouts()),
            channel: MessageChannel::new(descriptor),
            sink: Arc::clone(&sink),
            radio: radio_tx,
            inputs: inputs.clone(),
        };
        tokio::spawn(manager.run(rx, executor));

        ChatHandle { inputs, sink }
    }

    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>, executor: JoinHandle<()>) {
        info!("Link manager started");
        while let Some(input) = inputs.recv().await {
            match input {
                Input::Command { command, reply } => {
                    let result = self
                        .machine
                        .handle_command(command)
                        .map(|effects| self.apply(effects));
                    let _ = reply.send(result);
                }
                Input::Send { text, reply } => {
                    let _ = reply.send(self.send(&text));
                }
                Input::Radio(event) => {
                    let effects = self.machine.handle_event(event);
                    self.apply(effects);
                }
                Input::Timeout(epoch) => {
                    let effects = self.machine.handle_timeout(epoch);
                    self.apply(effects);
                }
                Input::Shutdown(done) => {
                    self.shutdown(executor).await;
                    let _ = done.send(());
                    return;
                }
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        self.sink.publish_state(self.machine.state());
        for effect in effects {
            match effect {
                Effect::Radio(command) => self.issue(command),
                Effect::Notify(notice) => self.sink.notify(notice),
                Effect::ArmTimer { epoch, after } => self.arm_timer(epoch, after),
                Effect::ScanStarted => self.sink.scan_started(),
                Effect::PeerFound(peer) => self.sink.peer_found(peer),
                Effect::ScanStopped => self.sink.scan_stopped(),
                Effect::Deliver { peer, value } => self.deliver(peer, &value),
            }
        }
    }

    fn send(&mut self, text: &str) -> Result<MessageRecord, LinkError> {
        let outbound = self.channel.send(self.machine.state(), text).inspect_err(|_| {
            debug!("Refusing to send while {}", self.machine.state().name());
        })?;
        self.issue(outbound.command);
        self.sink.publish_message(outbound.record.clone());
        self.sink.notify(Notice::MessageSent);
        Ok(outbound.record)
    }

    fn deliver(&mut self, peer: PeerIdentity, value: &[u8]) {
        let inbound = self.channel.receive(value);
        if inbound.lossy {
            warn!("Message from {} was not valid UTF-8", peer);
            self.sink.notify(Notice::error(LinkError::DecodeLossy { peer }));
        }
        self.sink.publish_message(inbound.record);
    }

    fn issue(&self, command: RadioCommand) {
        if self.radio.send(command).is_err() {
            error!("Radio command executor has stopped");
        }
    }

    fn arm_timer(&self, epoch: u64, after: Duration) {
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = inputs.send(Input::Timeout(epoch));
        });
    }

    async fn shutdown(self, executor: JoinHandle<()>) {
        info!("Shutting down link manager");
        self.issue(RadioCommand::Close);
        self.sink.scan_stopped();
        self.sink.publish_state(&ConnectionState::Idle);
        drop(self.radio);
        if let Err(e) = executor.await {
            error!("Radio command executor finished with an error: {:?}", e);
        }
    }
}

/// Application-facing handle to a running link manager
#[derive(Clone)]
pub struct ChatHandle {
    inputs: mpsc::UnboundedSender<Input>,
    sink: Arc<EventSink>,
}

impl ChatHandle {
    pub async fn start_advertise(&self) -> Result<(), LinkError> {
        self.command(Command::StartAdvertise).await
    }

    pub async fn stop_advertise(&self) -> Result<(), LinkError> {
        self.command(Command::StopAdvertise).await
    }

    pub async fn start_scan(&self) -> Result<(), LinkError> {
        self.command(Command::StartScan).await
    }

    pub async fn stop_scan(&self) -> Result<(), LinkError> {
        self.command(Command::StopScan).await
    }

    pub async fn connect(&self, peer: PeerIdentity) -> Result<(), LinkError> {
        self.command(Command::Connect(peer)).await
    }

    pub async fn disconnect(&self) -> Result<(), LinkError> {
        self.command(Command::Disconnect).await
    }

    /// Sends a message to the connected peer. Fails immediately when not connected.
    pub async fn send(&self, text: impl Into<String>) -> Result<MessageRecord, LinkError> {
        let (reply, rx) = oneshot::channel();
        self.inputs
            .send(Input::Send {
                text: text.into(),
                reply,
            })
            .map_err(|_| LinkError::Closed)?;
        rx.await.map_err(|_| LinkError::Closed)?
    }

    /// Closes the radio and stops the link manager
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.inputs.send(Input::Shutdown(done)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.sink.connection_state()
    }

    /// The full message log, both directions, in order
    pub fn messages(&self) -> watch::Receiver<Vec<MessageRecord>> {
        self.sink.messages()
    }

    /// Peers found by the current or last scan
    pub fn peers(&self) -> watch::Receiver<Vec<PeerIdentity>> {
        self.sink.peers()
    }

    pub fn scanning(&self) -> watch::Receiver<bool> {
        self.sink.scanning()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.sink.notices()
    }

    pub fn discovered_peers(&self) -> BoxStream<'static, PeerIdentity> {
        self.sink.discovered_peers()
    }

    async fn command(&self, command: Command) -> Result<(), LinkError> {
        let (reply, rx) = oneshot::channel();
        self.inputs
            .send(Input::Command { command, reply })
            .map_err(|_| LinkError::Closed)?;
        rx.await.map_err(|_| LinkError::Closed)?
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use tokio::time::timeout;

    use super::*;
    use crate::core::bluetooth::errors::RadioError;
    use crate::core::bluetooth::mock::{CallLog, MockRadio, RadioCall};
    use crate::core::bluetooth::radio::{Discovery, LinkStatus};
    use crate::core::bluetooth::types::{Direction, Role};

    fn peer(n: u8) -> PeerIdentity {
        PeerIdentity::new(format!("AA:BB:CC:DD:EE:{:02X}", n), Some(format!("chippy-{}", n)))
    }

    fn start(setup: impl FnOnce(MockRadio) -> MockRadio) -> (ChatHandle, RadioEventSender, CallLog) {
        let calls = CallLog::default();
        let mut injector = None;
        let handle = LinkManager::spawn(&LinkConfig::default(), |events| {
            injector = Some(events);
            setup(MockRadio::new(calls.clone()))
        });
        (handle, injector.expect("radio was built"), calls)
    }

    async fn wait_for_state(
        handle: &ChatHandle,
        wanted: impl Fn(&ConnectionState) -> bool,
    ) -> ConnectionState {
        let mut rx = handle.connection_state();
        timeout(Duration::from_secs(60), rx.wait_for(|s| wanted(s)))
            .await
            .expect("state not reached in time")
            .expect("link manager stopped")
            .clone()
    }

    /// Lets the executor and spawned radio tasks run until they go idle
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn connected_client(handle: &ChatHandle, p: &PeerIdentity) {
        handle.start_scan().await.unwrap();
        handle.connect(p.clone()).await.unwrap();
        wait_for_state(handle, |s| matches!(s, ConnectionState::Connected(..))).await;
        settle().await;
    }

    fn drain(rx: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn server_receives_written_message() {
        let (handle, radio, calls) = start(|r| r);
        let p = peer(1);

        handle.start_advertise().await.unwrap();
        radio.send(RadioEvent::ConnectionStateChanged {
            peer: p.clone(),
            status: LinkStatus::Connected,
        });
        let state = wait_for_state(&handle, |s| s.is_connected()).await;
        assert_eq!(state, ConnectionState::Connected(p.clone(), Role::Server));

        radio.send(RadioEvent::WriteRequest {
            peer: p.clone(),
            value: b"hi".to_vec(),
        });
        let mut messages = handle.messages();
        let log = messages.wait_for(|log| !log.is_empty()).await.unwrap().clone();
        assert_eq!(
            log,
            vec![MessageRecord {
                direction: Direction::Received,
                text: "hi".into(),
                index: 0,
            }]
        );

        settle().await;
        assert_eq!(
            calls.take(),
            vec![
                RadioCall::PublishService,
                RadioCall::Advertise,
                RadioCall::StopAdvertise
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn client_scans_connects_and_subscribes() {
        let (p1, p2) = (peer(1), peer(2));
        let (handle, _radio, calls) = start(|r| r.with_scan_results(vec![peer(1), peer(2)]));

        handle.start_scan().await.unwrap();
        let found: Vec<_> = handle.discovered_peers().take(2).collect().await;
        assert_eq!(found, vec![p1.clone(), p2]);

        let mut notices = handle.notices();
        handle.connect(p1.clone()).await.unwrap();
        let state = wait_for_state(&handle, |s| s.is_connected()).await;
        assert_eq!(state, ConnectionState::Connected(p1.clone(), Role::Client));
        settle().await;

        assert_eq!(
            drain(&mut notices),
            vec![
                Notice::Connecting(p1.clone()),
                Notice::Connected {
                    peer: p1.clone(),
                    role: Role::Client
                }
            ]
        );

        let calls = calls.take();
        let connect = calls.iter().position(|c| *c == RadioCall::Connect(p1.clone()));
        let discover = calls.iter().position(|c| *c == RadioCall::DiscoverServices);
        let subscribe = calls.iter().position(|c| *c == RadioCall::Subscribe);
        assert!(connect < discover && discover < subscribe, "calls: {:?}", calls);
        assert!(!*handle.scanning().borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn client_send_writes_characteristic() {
        let p = peer(1);
        let (handle, _radio, calls) = start(|r| r.with_scan_results(vec![peer(1)]));
        connected_client(&handle, &p).await;
        calls.take();

        let record = handle.send("ping").await.unwrap();
        assert_eq!(record.direction, Direction::Sent);
        assert_eq!(handle.messages().borrow().last(), Some(&record));

        settle().await;
        assert_eq!(calls.take(), vec![RadioCall::Write(b"ping".to_vec())]);
    }

    #[tokio::test(start_paused = true)]
    async fn server_send_notifies() {
        let p = peer(1);
        let (handle, radio, calls) = start(|r| r);
        handle.start_advertise().await.unwrap();
        radio.send(RadioEvent::ConnectionStateChanged {
            peer: p,
            status: LinkStatus::Connected,
        });
        wait_for_state(&handle, |s| s.is_connected()).await;
        settle().await;
        calls.take();

        handle.send("pong").await.unwrap();
        settle().await;
        assert_eq!(calls.take(), vec![RadioCall::Notify(b"pong".to_vec())]);
    }

    #[tokio::test(start_paused = true)]
    async fn send_while_disconnected_fails_without_radio_io() {
        let (handle, _radio, calls) = start(|r| r);

        assert_eq!(handle.send("hello").await, Err(LinkError::SendWhileDisconnected));
        handle.start_advertise().await.unwrap();
        assert_eq!(handle.send("hello").await, Err(LinkError::SendWhileDisconnected));

        settle().await;
        assert!(calls
            .take()
            .iter()
            .all(|c| !matches!(c, RadioCall::Write(_) | RadioCall::Notify(_))));
        assert!(handle.messages().borrow().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn incompatible_peer_returns_to_idle() {
        let p = peer(1);
        let (handle, _radio, _calls) = start(|r| {
            r.with_scan_results(vec![peer(1)])
                .with_discovery(Discovery::NotFound)
        });
        let mut notices = handle.notices();

        handle.start_scan().await.unwrap();
        handle.connect(p.clone()).await.unwrap();
        wait_for_state(&handle, |s| s.is_idle()).await;

        let notices = drain(&mut notices);
        assert!(notices.contains(&Notice::error(LinkError::IncompatiblePeer { peer: p })));
        // Only the Disconnecting -> Idle edge reports a plain disconnect.
        assert_eq!(notices.last(), Some(&Notice::Disconnected));
        assert!(handle.connection_state().borrow().peer().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn link_drop_is_reported_once() {
        let p = peer(1);
        let (handle, radio, _calls) = start(|r| r.with_scan_results(vec![peer(1)]));
        connected_client(&handle, &p).await;
        let mut notices = handle.notices();

        for _ in 0..2 {
            radio.send(RadioEvent::ConnectionStateChanged {
                peer: p.clone(),
                status: LinkStatus::Disconnected,
            });
        }
        wait_for_state(&handle, |s| s.is_idle()).await;
        settle().await;

        let dropped = drain(&mut notices)
            .into_iter()
            .filter(|n| matches!(n, Notice::Error { error: LinkError::LinkDropped { .. } }))
            .count();
        assert_eq!(dropped, 1);
        assert_eq!(handle.send("late").await, Err(LinkError::SendWhileDisconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_notification_is_delivered_to_client() {
        let p = peer(1);
        let (handle, radio, _calls) = start(|r| r.with_scan_results(vec![peer(1)]));
        connected_client(&handle, &p).await;
        let mut notices = handle.notices();

        radio.send(RadioEvent::CharacteristicChanged {
            peer: p.clone(),
            value: vec![b'o', 0xff],
        });
        let mut messages = handle.messages();
        let log = messages.wait_for(|log| !log.is_empty()).await.unwrap().clone();
        assert_eq!(log[0].text, "o\u{fffd}");
        assert_eq!(
            drain(&mut notices),
            vec![Notice::error(LinkError::DecodeLossy { peer: p })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_connect_times_out() {
        let p = peer(1);
        let (handle, _radio, _calls) =
            start(|r| r.with_scan_results(vec![peer(1)]).hanging_connect());
        let mut notices = handle.notices();

        handle.start_scan().await.unwrap();
        handle.connect(p.clone()).await.unwrap();
        wait_for_state(&handle, |s| s.is_idle()).await;

        assert!(drain(&mut notices).iter().any(|n| matches!(
            n,
            Notice::Error { error: LinkError::ConnectFailed { peer, .. } } if *peer == p
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_disconnect_goes_through_disconnecting() {
        let p = peer(1);
        let (handle, _radio, calls) = start(|r| r.with_scan_results(vec![peer(1)]));
        connected_client(&handle, &p).await;

        let mut notices = handle.notices();
        handle.disconnect().await.unwrap();
        wait_for_state(&handle, |s| s.is_idle()).await;
        settle().await;

        assert!(calls.take().contains(&RadioCall::Disconnect));
        assert_eq!(drain(&mut notices), vec![Notice::Disconnected]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stop_and_disconnect_are_noops() {
        let (handle, _radio, calls) = start(|r| r);
        handle.stop_scan().await.unwrap();
        handle.disconnect().await.unwrap();
        settle().await;
        assert!(calls.take().is_empty());
        assert!(handle.connection_state().borrow().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn advertise_failure_reports_and_returns_to_idle() {
        let (handle, _radio, _calls) = start(|r| r.without_server_role());
        let mut notices = handle.notices();

        handle.start_advertise().await.unwrap();
        wait_for_state(&handle, |s| s.is_idle()).await;
        settle().await;
        assert!(drain(&mut notices)
            .iter()
            .any(|n| matches!(n, Notice::Error { error: LinkError::AdvertiseFailed(_) })));
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_keeps_sent_record() {
        let p = peer(1);
        let (handle, _radio, calls) =
            start(|r| r.with_scan_results(vec![peer(1)]).failing_writes());
        connected_client(&handle, &p).await;
        calls.take();
        let mut notices = handle.notices();

        let record = handle.send("lost").await.unwrap();
        settle().await;

        assert_eq!(calls.take(), vec![RadioCall::Write(b"lost".to_vec())]);
        assert_eq!(
            drain(&mut notices),
            vec![
                Notice::MessageSent,
                Notice::error(LinkError::WriteFailed(
                    RadioError::Platform("write not acknowledged".into()).to_string()
                )),
            ]
        );
        assert_eq!(*handle.messages().borrow(), vec![record]);
        assert!(handle.connection_state().borrow().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_connect() {
        let p = peer(1);
        let (handle, _radio, calls) =
            start(|r| r.with_scan_results(vec![peer(1)]).hanging_connect());
        handle.start_scan().await.unwrap();
        handle.connect(p.clone()).await.unwrap();
        settle().await;
        assert!(matches!(
            *handle.connection_state().borrow(),
            ConnectionState::Connecting(_)
        ));

        let mut notices = handle.notices();
        handle.disconnect().await.unwrap();
        wait_for_state(&handle, |s| s.is_idle()).await;
        settle().await;

        assert!(calls.take().contains(&RadioCall::Disconnect));
        assert_eq!(drain(&mut notices), vec![Notice::Disconnected]);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_discovery_goes_through_disconnecting() {
        let p = peer(1);
        let (handle, _radio, calls) =
            start(|r| r.with_scan_results(vec![peer(1)]).hanging_discovery());
        handle.start_scan().await.unwrap();
        handle.connect(p.clone()).await.unwrap();
        wait_for_state(&handle, |s| {
            matches!(s, ConnectionState::DiscoveringServices(_))
        })
        .await;

        let mut notices = handle.notices();
        handle.disconnect().await.unwrap();
        wait_for_state(&handle, |s| s.is_idle()).await;
        settle().await;

        assert!(calls.take().contains(&RadioCall::Disconnect));
        assert_eq!(drain(&mut notices), vec![Notice::Disconnected]);
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_timeout_reports_incompatible_peer() {
        let p = peer(1);
        let (handle, _radio, calls) =
            start(|r| r.with_scan_results(vec![peer(1)]).hanging_discovery());
        let mut notices = handle.notices();

        handle.start_scan().await.unwrap();
        handle.connect(p.clone()).await.unwrap();
        wait_for_state(&handle, |s| {
            matches!(s, ConnectionState::DiscoveringServices(_))
        })
        .await;
        wait_for_state(&handle, |s| s.is_idle()).await;
        settle().await;

        assert!(drain(&mut notices)
            .contains(&Notice::error(LinkError::IncompatiblePeer { peer: p })));
        assert!(calls.take().contains(&RadioCall::Disconnect));
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_failure_tears_link_down() {
        let p = peer(1);
        let (handle, _radio, calls) =
            start(|r| r.with_scan_results(vec![peer(1)]).failing_subscribe());
        let mut notices = handle.notices();

        handle.start_scan().await.unwrap();
        handle.connect(p.clone()).await.unwrap();
        wait_for_state(&handle, |s| s.is_idle()).await;
        settle().await;

        let notices = drain(&mut notices);
        assert!(notices.contains(&Notice::Connected {
            peer: p.clone(),
            role: Role::Client
        }));
        assert!(notices.iter().any(|n| matches!(
            n,
            Notice::Error { error: LinkError::ConnectFailed { peer, .. } } if *peer == p
        )));
        assert_eq!(notices.last(), Some(&Notice::Disconnected));
        let calls = calls.take();
        let subscribe = calls.iter().position(|c| *c == RadioCall::Subscribe);
        let disconnect = calls.iter().position(|c| *c == RadioCall::Disconnect);
        assert!(subscribe.is_some() && subscribe < disconnect, "calls: {:?}", calls);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_scan_returns_to_idle() {
        let (handle, _radio, _calls) = start(|r| r.with_scan_results(vec![peer(1)]).finite_scan());
        let mut notices = handle.notices();

        handle.start_scan().await.unwrap();
        let found: Vec<_> = timeout(Duration::from_secs(60), handle.discovered_peers().collect())
            .await
            .expect("discovery stream did not end");
        assert_eq!(found, vec![peer(1)]);

        wait_for_state(&handle, |s| s.is_idle()).await;
        assert!(!*handle.scanning().borrow());
        assert_eq!(*handle.peers().borrow(), vec![peer(1)]);
        assert!(drain(&mut notices).contains(&Notice::ScanStopped));
        assert!(handle.discovered_peers().next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_scan_reports_error() {
        let (handle, _radio, _calls) = start(|r| r.failing_scan());
        let mut notices = handle.notices();

        handle.start_scan().await.unwrap();
        let mut found = handle.discovered_peers();
        let ended = timeout(Duration::from_secs(60), found.next())
            .await
            .expect("discovery stream did not end");
        assert!(ended.is_none());

        wait_for_state(&handle, |s| s.is_idle()).await;
        assert!(drain(&mut notices)
            .iter()
            .any(|n| matches!(n, Notice::Error { error: LinkError::ScanFailed(_) })));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_radio_and_rejects_commands() {
        let (handle, _radio, calls) = start(|r| r);
        handle.shutdown().await;

        assert_eq!(calls.take(), vec![RadioCall::Close]);
        assert_eq!(handle.start_scan().await, Err(LinkError::Closed));
    }
}
