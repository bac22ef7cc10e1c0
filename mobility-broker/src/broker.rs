//! The Broker Loop (§4.F): global peek→select→step→fan-out cycle, holding
//! global virtual time and the broker's state machine.

use std::collections::HashMap;

use mobility_wire::{
    peek_wire_to_time, BrokerPeekReply, BrokerSetupRequest, MessageReply, PeekReply,
    ProtocolError, ResultRecord, RunError, StepReply, Time,
};

use crate::directory::Directory;
use crate::dispatcher;
use crate::negotiator;
use crate::registry::SubscriptionRegistry;
use crate::result_writer::{self, ResultWriter};
use crate::state::BrokerState;

/// A service persistently failing to answer `/peek` escalates to a
/// [`ProtocolError`] after this many consecutive cycles, so a permanently
/// unreachable service does not stall `run_until` forever (§4.F.1, ADDED).
const PEEK_FAILURE_THRESHOLD: u32 = 3;

/// Thrown when a control-surface call arrives in a state that does not
/// permit it (§3 "Global Simulation State").
#[derive(Debug, thiserror::Error)]
#[error("illegal transition: cannot {action} while broker is {state:?}")]
pub struct InvalidTransition {
    pub action: &'static str,
    pub state: BrokerState,
}

/// The broker: service directory, subscription registry, global clock,
/// append-only event log, and state machine (§4.F).
pub struct Broker {
    client: reqwest::Client,
    state: BrokerState,
    directory: Directory,
    registry: SubscriptionRegistry,
    global_clock: Time,
    event_log: Vec<mobility_wire::Event>,
    next_seqno: u64,
    result_sink: Option<ResultWriter>,
    peek_failures: HashMap<String, u32>,
    last_peek: HashMap<String, Time>,
    last_success: bool,
}

impl Broker {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            state: BrokerState::Unconfigured,
            directory: Directory::new(),
            registry: SubscriptionRegistry::new(),
            global_clock: Time::ZERO,
            event_log: Vec::new(),
            next_seqno: 0,
            result_sink: None,
            peek_failures: HashMap::new(),
            last_peek: HashMap::new(),
            last_success: true,
        }
    }

    pub fn state(&self) -> BrokerState {
        self.state
    }

    /// `POST /setup` (§4.E): negotiates the directory + subscription
    /// registry and configures every service as a single transaction.
    pub async fn setup(&mut self, request: BrokerSetupRequest) -> Result<MessageReply, RunError> {
        if !self.state.can_setup() {
            return Err(invalid_transition("setup", self.state));
        }
        let (directory, registry) = negotiator::negotiate(&self.client, &request.services).await?;

        if let Some(writer_url) = request.services.iter().find_map(|s| s.writer_url.clone()) {
            self.result_sink = Some(ResultWriter::spawn(
                self.client.clone(),
                writer_url,
                result_writer::queue_size_from_env(),
                result_writer::over_interval_from_env(),
            ));
        }

        self.directory = directory;
        self.registry = registry;
        self.global_clock = Time::ZERO;
        self.event_log.clear();
        self.next_seqno = 0;
        self.peek_failures.clear();
        self.last_peek.clear();
        self.last_success = true;
        self.state = BrokerState::Configured;
        Ok(MessageReply::ok("configured"))
    }

    /// `POST /start` (§4.F): arms every service, concurrently.
    pub async fn start(&mut self) -> Result<MessageReply, RunError> {
        if !self.state.can_start() {
            return Err(invalid_transition("start", self.state));
        }
        let calls = self.directory.iter().map(|service| {
            let client = &self.client;
            let endpoint = service.endpoint.clone();
            let name = service.name.clone();
            async move {
                let url = format!("{}/start", endpoint.trim_end_matches('/'));
                client
                    .post(&url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| mobility_wire::ProtocolError::Unreachable {
                        name,
                        attempts: 1,
                        source: e.into(),
                    })
            }
        });
        futures::future::join_all(calls)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        self.state = BrokerState::Started;
        Ok(MessageReply::ok("started"))
    }

    /// `GET /peek` (§4.F): the last observed status.
    pub fn peek_status(&self) -> BrokerPeekReply {
        let running = matches!(self.state, BrokerState::Started | BrokerState::Running);
        BrokerPeekReply {
            running,
            next: mobility_wire::time_to_peek_wire(self.global_clock),
            success: self.last_success,
        }
    }

    /// The append-only event log, in delivery order (`GET /events`).
    pub fn event_log(&self) -> &[mobility_wire::Event] {
        &self.event_log
    }

    /// `POST /run?until=T` (§4.F): drives the conservative peek→select→step
    /// →fan-out loop until `t_min >= until` or every service is idle.
    pub async fn run_until(&mut self, until: Time) -> Result<MessageReply, RunError> {
        if !self.state.can_run() {
            return Err(invalid_transition("run", self.state));
        }
        self.state = BrokerState::Running;

        loop {
            let peeks = match self.peek_all().await {
                Ok(peeks) => peeks,
                Err(err) => {
                    self.state = BrokerState::Failed;
                    self.last_success = false;
                    return Err(err);
                }
            };
            let live: Vec<_> = peeks.iter().filter(|(_, t)| !t.is_infinite()).collect();

            if live.is_empty() {
                self.state = BrokerState::Idle;
                self.last_success = true;
                return Ok(MessageReply::ok("idle"));
            }

            let t_min = live.iter().map(|(_, t)| *t).min().unwrap();
            if t_min >= until {
                // No further step is issued: every live service's next
                // event already lies at or beyond `until`, so the global
                // clock advances to `until` with no HTTP round-trip
                // required of any service (§4.F's "advance every service
                // to T" is a bookkeeping no-op here, since the wire
                // protocol of §6 has no advance-clock call).
                self.global_clock = until;
                self.state = BrokerState::Idle;
                self.last_success = true;
                return Ok(MessageReply::ok("reached until"));
            }

            // Tie-break by directory insertion order (§9 Open Questions).
            let winner = live
                .iter()
                .min_by_key(|(name, t)| (*t, self.directory.position(name).unwrap_or(usize::MAX)))
                .map(|(name, _)| name.clone())
                .expect("live is non-empty");

            let step = match self.step_service(&winner).await {
                Ok(step) => step,
                Err(err) => {
                    self.state = BrokerState::Failed;
                    self.last_success = false;
                    return Err(err.into());
                }
            };

            if step.now < self.global_clock.as_minutes() {
                self.state = BrokerState::Failed;
                self.last_success = false;
                return Err(ProtocolError::FutureViolation {
                    name: winner,
                    event_time: step.now,
                    global_clock: self.global_clock.as_minutes(),
                }
                .into());
            }
            self.global_clock = Time::from_minutes(step.now);

            for event in step.events {
                self.record_event(event.clone()).await;
                let subscribers = self.registry.subscribers(&event.event_type).to_vec();
                let forwarded = event.with_source(&winner);
                if let Err(err) = dispatcher::dispatch(&self.client, &subscribers, &forwarded).await {
                    self.state = BrokerState::Failed;
                    self.last_success = false;
                    return Err(err.into());
                }
            }
        }
    }

    /// `POST /finish` (§4.H): idempotent teardown (P7); safe to call from
    /// any state, including after an already-completed `finish`.
    pub async fn finish(&mut self) -> Result<MessageReply, RunError> {
        if self.state == BrokerState::Stopped {
            return Ok(MessageReply::ok("already stopped"));
        }
        let calls = self.directory.iter().map(|service| {
            let client = &self.client;
            let endpoint = service.endpoint.clone();
            async move {
                let url = format!("{}/finish", endpoint.trim_end_matches('/'));
                let _ = client.post(&url).send().await;
            }
        });
        futures::future::join_all(calls).await;

        if let Some(sink) = self.result_sink.take() {
            sink.close().await;
        }
        self.state = BrokerState::Stopped;
        Ok(MessageReply::ok("stopped"))
    }

    async fn record_event(&mut self, event: mobility_wire::Event) {
        self.event_log.push(event.clone());
        if let Some(sink) = &self.result_sink {
            let seqno = self.next_seqno;
            self.next_seqno += 1;
            sink.submit(ResultRecord { seqno, data: event }).await;
        }
    }

    /// Issues `GET /peek` to every directory service concurrently (§4.F.1).
    /// A network/5xx failure degrades that service's reported time to
    /// `+∞` for this cycle; after [`PEEK_FAILURE_THRESHOLD`] consecutive
    /// failures it escalates to a fatal [`ProtocolError`]. Also enforces I2:
    /// a service's reported peek must never regress from its previous peek,
    /// whether or not it was the service stepped last cycle.
    async fn peek_all(&mut self) -> Result<Vec<(String, Time)>, RunError> {
        let calls = self.directory.iter().map(|service| {
            let client = &self.client;
            let endpoint = service.endpoint.clone();
            let name = service.name.clone();
            async move {
                let url = format!("{}/peek", endpoint.trim_end_matches('/'));
                let result = client.get(&url).send().await.and_then(|r| r.error_for_status());
                match result {
                    Ok(response) => response
                        .json::<PeekReply>()
                        .await
                        .map(|r| peek_wire_to_time(r.next))
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                }
                .map(|t| (name, Ok(t)))
                .unwrap_or_else(|reason| (name, Err(reason)))
            }
        });

        let results = futures::future::join_all(calls).await;
        let mut peeks = Vec::with_capacity(results.len());
        for (name, outcome) in results {
            match outcome {
                Ok(t) => {
                    self.peek_failures.remove(&name);
                    if let Some(&previous) = self.last_peek.get(&name) {
                        if t < previous {
                            return Err(ProtocolError::NonMonotoneTime {
                                name,
                                previous: previous.as_minutes(),
                                reported: t.as_minutes(),
                            }
                            .into());
                        }
                    }
                    self.last_peek.insert(name.clone(), t);
                    peeks.push((name, t));
                }
                Err(reason) => {
                    let failures = self.peek_failures.entry(name.clone()).or_insert(0);
                    *failures += 1;
                    tracing::warn!(service = %name, reason, attempt = *failures, "peek failed");
                    if *failures >= PEEK_FAILURE_THRESHOLD {
                        return Err(ProtocolError::Unreachable {
                            name,
                            attempts: *failures,
                            source: anyhow::anyhow!(reason),
                        }
                        .into());
                    }
                    peeks.push((name, Time::INFINITY));
                }
            }
        }
        Ok(peeks)
    }

    async fn step_service(&self, name: &str) -> Result<StepReply, ProtocolError> {
        let service = self
            .directory
            .get(name)
            .expect("winner must be in directory");
        let url = format!("{}/step", service.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| ProtocolError::Unreachable {
                name: name.to_string(),
                attempts: 1,
                source: e.into(),
            })?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(ProtocolError::StepOnEmptyQueue { name: name.to_string() });
        }
        response
            .error_for_status()
            .map_err(|e| ProtocolError::Unreachable {
                name: name.to_string(),
                attempts: 1,
                source: e.into(),
            })?
            .json::<StepReply>()
            .await
            .map_err(|e| ProtocolError::Unreachable {
                name: name.to_string(),
                attempts: 1,
                source: e.into(),
            })
    }

}

fn invalid_transition(action: &'static str, state: BrokerState) -> RunError {
    RunError::InvalidState(
        InvalidTransition { action, state }.to_string(),
    )
}
