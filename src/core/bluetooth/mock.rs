//! In-memory radio used by the link manager tests

use std::sync::{Arc, Mutex};

use futures_util::stream::{self, BoxStream, StreamExt};

use crate::core::bluetooth::errors::RadioError;
use crate::core::bluetooth::radio::{Discovery, Radio};
use crate::core::bluetooth::types::{PeerIdentity, ServiceDescriptor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    PublishService,
    Advertise,
    StopAdvertise,
    Scan,
    Connect(PeerIdentity),
    DiscoverServices,
    Subscribe,
    Write(Vec<u8>),
    Notify(Vec<u8>),
    Disconnect,
    Close,
}

/// Shared record of every call the link manager made on the radio
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<RadioCall>>>);

impl CallLog {
    fn push(&self, call: RadioCall) {
        self.0.lock().unwrap().push(call);
    }

    /// Returns the calls made so far and clears the log
    pub fn take(&self) -> Vec<RadioCall> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

pub struct MockRadio {
    calls: CallLog,
    scan_results: Vec<PeerIdentity>,
    discovery: Discovery,
    hang_on_connect: bool,
    hang_on_discovery: bool,
    server_role: bool,
    scan: ScanBehaviour,
    fail_subscribe: bool,
    fail_writes: bool,
}

/// How `scan` behaves once it reported its results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanBehaviour {
    StayOpen,
    End,
    Refuse,
}

impl MockRadio {
    pub fn new(calls: CallLog) -> Self {
        Self {
            calls,
            scan_results: Vec::new(),
            discovery: Discovery::Found(ServiceDescriptor::CHIPPY),
            hang_on_connect: false,
            hang_on_discovery: false,
            server_role: true,
            scan: ScanBehaviour::StayOpen,
            fail_subscribe: false,
            fail_writes: false,
        }
    }

    /// Peers reported by every scan; the scan then stays open
    pub fn with_scan_results(mut self, peers: Vec<PeerIdentity>) -> Self {
        self.scan_results = peers;
        self
    }

    pub fn with_discovery(mut self, discovery: Discovery) -> Self {
        self.discovery = discovery;
        self
    }

    /// `connect` never completes
    pub fn hanging_connect(mut self) -> Self {
        self.hang_on_connect = true;
        self
    }

    /// `discover_services` never completes
    pub fn hanging_discovery(mut self) -> Self {
        self.hang_on_discovery = true;
        self
    }

    /// The scan stream ends after the configured results
    pub fn finite_scan(mut self) -> Self {
        self.scan = ScanBehaviour::End;
        self
    }

    /// `scan` is refused by the platform
    pub fn failing_scan(mut self) -> Self {
        self.scan = ScanBehaviour::Refuse;
        self
    }

    pub fn failing_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }

    /// Writes and notifies are rejected after being recorded
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    fn written(&self) -> Result<(), RadioError> {
        if self.fail_writes {
            Err(RadioError::Platform("write not acknowledged".into()))
        } else {
            Ok(())
        }
    }

    /// Publishing and advertising fail as on a central-only adapter
    pub fn without_server_role(mut self) -> Self {
        self.server_role = false;
        self
    }

    fn server(&self) -> Result<(), RadioError> {
        if self.server_role {
            Ok(())
        } else {
            Err(RadioError::Unsupported("server role"))
        }
    }
}

#[async_trait::async_trait]
impl Radio for MockRadio {
    async fn publish_service(&self, _descriptor: &ServiceDescriptor) -> Result<(), RadioError> {
        self.calls.push(RadioCall::PublishService);
        self.server()
    }

    async fn advertise(&self) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Advertise);
        self.server()
    }

    async fn stop_advertise(&self) -> Result<(), RadioError> {
        self.calls.push(RadioCall::StopAdvertise);
        Ok(())
    }

    async fn scan<'a>(&'a self) -> Result<BoxStream<'a, PeerIdentity>, RadioError> {
        self.calls.push(RadioCall::Scan);
        let found = stream::iter(self.scan_results.clone());
        match self.scan {
            ScanBehaviour::StayOpen => Ok(found.chain(stream::pending()).boxed()),
            ScanBehaviour::End => Ok(found.boxed()),
            ScanBehaviour::Refuse => Err(RadioError::Platform("scan refused".into())),
        }
    }

    async fn connect(&self, peer: &PeerIdentity) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Connect(peer.clone()));
        if self.hang_on_connect {
            futures_util::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn discover_services(&self) -> Result<Discovery, RadioError> {
        self.calls.push(RadioCall::DiscoverServices);
        if self.hang_on_discovery {
            futures_util::future::pending::<()>().await;
        }
        Ok(self.discovery.clone())
    }

    async fn subscribe(&self, _descriptor: &ServiceDescriptor) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Subscribe);
        if self.fail_subscribe {
            return Err(RadioError::Platform("CCCD write rejected".into()));
        }
        Ok(())
    }

    async fn write_characteristic(
        &self,
        _descriptor: &ServiceDescriptor,
        value: &[u8],
    ) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Write(value.to_vec()));
        self.written()
    }

    async fn update_and_notify(
        &self,
        _descriptor: &ServiceDescriptor,
        value: &[u8],
    ) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Notify(value.to_vec()));
        self.written()
    }

    async fn disconnect(&self) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Disconnect);
        Ok(())
    }

    async fn close(&self) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Close);
        Ok(())
    }
}
