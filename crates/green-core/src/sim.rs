//! Simulated collaborators.
//!
//! Scripted stand-ins for the radio, MQTT client, SNTP clock and OTA
//! updater. They record every call so tests (and `green-tool simulate`) can
//! check exactly what the node did, and [`RecordingDelay`] never sleeps.
//!
//! Collaborators can share a [`Timeline`] to capture the interleaving of
//! polls, connects and delays in one ordered log.

use crate::link::{FirmwareUpdater, LinkStatus, MessagingClient, NetworkTransport, SntpClock};
use crate::retry::Delay;
use crate::update::{UpdateError, UpdateOutcome, UpdateRequest};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// One observable action of a simulated collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    WifiBegin { ssid: String },
    StatusPoll(LinkStatus),
    ClientBegin { host: String, port: u16 },
    CleanSession(bool),
    Connect { client_id: String, accepted: bool },
    Delay(u32),
}

/// Shared, ordered log of [`SimEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct Timeline(Rc<RefCell<Vec<SimEvent>>>);

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: SimEvent) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.0.borrow().clone()
    }
}

/// Delay that records the requested pauses instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingDelay {
    calls: Vec<u32>,
    timeline: Timeline,
}

impl RecordingDelay {
    pub fn on(timeline: &Timeline) -> Self {
        Self {
            calls: Vec::new(),
            timeline: timeline.clone(),
        }
    }

    pub fn calls(&self) -> &[u32] {
        &self.calls
    }

    /// Total simulated waiting time.
    pub fn total_ms(&self) -> u64 {
        self.calls.iter().map(|&ms| u64::from(ms)).sum()
    }
}

impl Delay for RecordingDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.calls.push(ms);
        self.timeline.push(SimEvent::Delay(ms));
    }
}

/// Network transport that reports "connecting" for a scripted number of
/// polls, then "connected".
#[derive(Debug, Clone)]
pub struct SimTransport {
    not_connected_polls: Option<u32>,
    polls: u32,
    begun_with: Option<(String, String)>,
    timeline: Timeline,
}

impl SimTransport {
    /// Connected on poll `failures + 1`.
    pub fn connected_after(failures: u32) -> Self {
        Self {
            not_connected_polls: Some(failures),
            polls: 0,
            begun_with: None,
            timeline: Timeline::new(),
        }
    }

    /// Never connects (bad credentials, unreachable access point).
    pub fn never_connected() -> Self {
        Self {
            not_connected_polls: None,
            ..Self::connected_after(0)
        }
    }

    pub fn on(mut self, timeline: &Timeline) -> Self {
        self.timeline = timeline.clone();
        self
    }

    pub fn status_polls(&self) -> u32 {
        self.polls
    }

    /// SSID and password passed to [`NetworkTransport::begin`].
    pub fn begun_with(&self) -> Option<(String, String)> {
        self.begun_with.clone()
    }
}

impl NetworkTransport for SimTransport {
    fn begin(&mut self, ssid: &str, password: &str) {
        self.begun_with = Some((ssid.to_string(), password.to_string()));
        self.timeline.push(SimEvent::WifiBegin {
            ssid: ssid.to_string(),
        });
    }

    fn status(&mut self) -> LinkStatus {
        self.polls += 1;
        let status = match (self.begun_with.is_some(), self.not_connected_polls) {
            (false, _) => LinkStatus::Idle,
            (true, Some(failures)) if self.polls > failures => LinkStatus::Connected,
            (true, _) => LinkStatus::Connecting,
        };
        self.timeline.push(SimEvent::StatusPoll(status));
        status
    }
}

/// Error returned by [`SimClient`] for a rejected connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("connection refused by simulated broker (attempt {attempt})")]
pub struct SimRefused {
    pub attempt: u32,
}

/// Messaging client that rejects a scripted number of connects.
#[derive(Debug, Clone)]
pub struct SimClient {
    rejections: Option<u32>,
    broker: Option<(String, u16)>,
    clean_session: Option<bool>,
    attempts: Vec<(String, String, String)>,
    transport_connected_at_begin: Option<bool>,
    timeline: Timeline,
}

impl SimClient {
    /// Accepts connect attempt `rejections + 1`.
    pub fn accepting_after(rejections: u32) -> Self {
        Self {
            rejections: Some(rejections),
            broker: None,
            clean_session: None,
            attempts: Vec::new(),
            transport_connected_at_begin: None,
            timeline: Timeline::new(),
        }
    }

    /// Rejects every attempt.
    pub fn rejecting() -> Self {
        Self {
            rejections: None,
            ..Self::accepting_after(0)
        }
    }

    pub fn on(mut self, timeline: &Timeline) -> Self {
        self.timeline = timeline.clone();
        self
    }

    pub fn connect_attempts(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Client ids seen by each connect attempt, in order.
    pub fn client_ids(&self) -> Vec<String> {
        self.attempts.iter().map(|(id, _, _)| id.clone()).collect()
    }

    /// Username and password of the last attempt.
    pub fn last_credentials(&self) -> Option<(String, String)> {
        self.attempts
            .last()
            .map(|(_, user, pass)| (user.clone(), pass.clone()))
    }

    pub fn broker(&self) -> Option<(String, u16)> {
        self.broker.clone()
    }

    pub fn clean_session(&self) -> Option<bool> {
        self.clean_session
    }

    /// Link status observed when the client was bound to the transport.
    pub fn transport_connected_at_begin(&self) -> Option<bool> {
        self.transport_connected_at_begin
    }
}

impl MessagingClient<SimTransport> for SimClient {
    type Error = SimRefused;

    fn begin(&mut self, host: &str, port: u16, transport: &mut SimTransport) {
        self.broker = Some((host.to_string(), port));
        self.transport_connected_at_begin = Some(
            transport.begun_with.is_some()
                && matches!(transport.not_connected_polls, Some(f) if transport.polls > f),
        );
        self.timeline.push(SimEvent::ClientBegin {
            host: host.to_string(),
            port,
        });
    }

    fn set_clean_session(&mut self, clean_session: bool) {
        self.clean_session = Some(clean_session);
        self.timeline.push(SimEvent::CleanSession(clean_session));
    }

    fn connect(&mut self, client_id: &str, username: &str, password: &str) -> Result<(), SimRefused> {
        self.attempts.push((
            client_id.to_string(),
            username.to_string(),
            password.to_string(),
        ));
        let attempt = self.connect_attempts();
        let accepted = matches!(self.rejections, Some(r) if attempt > r);
        self.timeline.push(SimEvent::Connect {
            client_id: client_id.to_string(),
            accepted,
        });

        if accepted {
            Ok(())
        } else {
            Err(SimRefused { attempt })
        }
    }
}

/// SNTP clock that reads the Unix epoch until a scripted number of reads,
/// then a fixed synchronised time.
#[derive(Debug, Clone)]
pub struct SimClock {
    unsynced_reads: u32,
    synced: DateTime<Utc>,
    reads: u32,
    servers: Option<Vec<String>>,
}

impl SimClock {
    pub fn synced_after(unsynced_reads: u32, synced: DateTime<Utc>) -> Self {
        Self {
            unsynced_reads,
            synced,
            reads: 0,
            servers: None,
        }
    }

    pub fn reads(&self) -> u32 {
        self.reads
    }

    /// Servers passed to [`SntpClock::start_sync`].
    pub fn servers(&self) -> Option<&[String]> {
        self.servers.as_deref()
    }
}

impl SntpClock for SimClock {
    fn start_sync(&mut self, servers: &[String]) {
        self.servers = Some(servers.to_vec());
    }

    fn now(&mut self) -> DateTime<Utc> {
        self.reads += 1;
        if self.servers.is_some() && self.reads > self.unsynced_reads {
            self.synced
        } else {
            DateTime::<Utc>::UNIX_EPOCH
        }
    }
}

/// Updater returning a scripted result and recording requests.
#[derive(Debug, Clone)]
pub struct SimUpdater {
    result: Result<UpdateOutcome, UpdateError>,
    requests: Vec<UpdateRequest>,
}

impl SimUpdater {
    pub fn returning(result: Result<UpdateOutcome, UpdateError>) -> Self {
        Self {
            result,
            requests: Vec::new(),
        }
    }

    pub fn requests(&self) -> &[UpdateRequest] {
        &self.requests
    }
}

impl FirmwareUpdater for SimUpdater {
    fn update(&mut self, request: &UpdateRequest) -> Result<UpdateOutcome, UpdateError> {
        self.requests.push(request.clone());
        self.result.clone()
    }
}
