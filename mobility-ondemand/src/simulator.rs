//! An on-demand ride-hailing simulator: one vehicle, a stop network, and a
//! boarding-window dispatch rule simple enough to be exact about the three
//! things §1 says are in scope for the co-simulation *protocol* (peek/step,
//! the outbox, reservation accept/reject) while staying silent on the
//! dispatch *heuristic* itself (out of scope; `original_source` kept only
//! this simulator's test fixtures, not its controller, so there is nothing
//! to be faithful to beyond the externally observable event sequences of
//! §8's S1–S3).

use std::collections::HashMap;

use mobility_kernel::{EventQueue, Fired, SimulatorRuntime, StepOutcome};
use mobility_wire::{Event, EventFeatures, RuntimeError, ServiceSpec, SetupError, Time};
use serde_json::json;

use crate::model::{Network, SetupConfig};

const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone)]
struct Reservation {
    user_id: String,
    org: String,
    dst: String,
    dept: Time,
    arrv: Time,
}

/// The vehicle's current boarding/transit commitment: the group of riders
/// sharing one org→dst leg.
struct Commitment {
    org: String,
    dst: String,
    /// Boarding remains open (further riders may join the same leg) until
    /// this time.
    boarding_close: Time,
    /// Whether the vehicle has already pulled away from `org`.
    departed: bool,
    riders: Vec<String>,
}

enum Task {
    EmitReserved {
        user_id: String,
        reservation: Option<Reservation>,
    },
    UserBoards {
        user_id: String,
    },
    VehicleDeparts,
    VehicleArrives {
        dst: String,
        riders: Vec<String>,
    },
    RiderAlights {
        user_id: String,
    },
    ServiceWindowClose,
    ReturnHomeArrives,
}

/// A single-vehicle on-demand simulator implementing
/// [`SimulatorRuntime`] (§4.B.1).
pub struct OndemandSimulator {
    config: Option<SetupConfig>,
    network: Network,
    queue: EventQueue<Task>,
    started: bool,
    finished: bool,
    location: String,
    committed: Option<Commitment>,
    /// Confirmed reservations awaiting their rider's `ready_to_depart`
    /// (`DEPART`) signal, keyed by user id.
    reservations: HashMap<String, Reservation>,
}

impl Default for OndemandSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl OndemandSimulator {
    pub fn new() -> Self {
        Self {
            config: None,
            network: Network::default(),
            queue: EventQueue::new(),
            started: false,
            finished: false,
            location: String::new(),
            committed: None,
            reservations: HashMap::new(),
        }
    }

    fn config(&self) -> &SetupConfig {
        self.config
            .as_ref()
            .expect("setup must be called before operating the simulator")
    }

    fn mobility_id(&self) -> String {
        self.config().mobility_id.clone()
    }

    fn board_time(&self) -> f64 {
        self.config().board_time
    }

    fn home_stop(&self) -> String {
        self.config().home_stop.clone()
    }

    /// This runtime's current virtual clock, for test fixtures that need to
    /// fast-forward through an idle stretch the way
    /// `test_integration.py::run`'s `simulation.env.run(until=until)`
    /// fallback does.
    pub fn clock(&self) -> Time {
        self.queue.clock()
    }

    /// Advances the clock with no work performed, provided nothing is
    /// scheduled before `until` (kernel §4.A `advance_to`). Exposed for
    /// tests that drive the simulator directly, bypassing HTTP.
    pub fn advance_to(&mut self, until: Time) -> Result<(), RuntimeError> {
        self.queue.advance_to(until)
    }

    /// Records a reservation request (the externally-observable effect of a
    /// `DEMAND` event): Stop1→Stop2-shaped route lookup, immediate
    /// accept/reject decision, and a same-tick `RESERVED` event (§8 S2–S4).
    ///
    /// Accepted whenever the vehicle has no open commitment, or the request
    /// matches the vehicle's current org→dst leg while its boarding window
    /// is still open; rejected otherwise (mismatched leg, or a leg already
    /// underway) — see the module doc for why this diverges from (but does
    /// not need to replicate) the original dispatch heuristic.
    pub fn reserve_user(
        &mut self,
        user_id: &str,
        org: &str,
        dst: &str,
        dept: f64,
    ) -> Result<(), RuntimeError> {
        let now = self.queue.clock();
        let dept_t = Time::from_minutes(dept);
        let board_time = self.board_time();

        let accept = match &self.committed {
            None => true,
            Some(c) => c.org == org && c.dst == dst && now < c.boarding_close,
        };

        let reservation = if accept {
            let travel = self.network.travel_time(org, dst).unwrap_or(0.0);
            let arrv_t = dept_t.plus_minutes(2.0 * board_time + travel);
            let reservation = Reservation {
                user_id: user_id.to_string(),
                org: org.to_string(),
                dst: dst.to_string(),
                dept: dept_t,
                arrv: arrv_t,
            };
            self.reservations.insert(user_id.to_string(), reservation.clone());
            Some(reservation)
        } else {
            None
        };

        self.queue.schedule(
            Task::EmitReserved {
                user_id: user_id.to_string(),
                reservation,
            },
            now,
        )?;
        Ok(())
    }

    /// Signals that a rider is ready to board (the externally-observable
    /// effect of a `DEPART` event): the rider boards at the later of "now"
    /// and their confirmed departure time.
    pub fn ready_to_depart(&mut self, user_id: &str) -> Result<(), RuntimeError> {
        let now = self.queue.clock();
        let dept = self
            .reservations
            .get(user_id)
            .map(|r| r.dept)
            .unwrap_or(now);
        let at = if dept > now { dept } else { now };
        self.queue.schedule(
            Task::UserBoards {
                user_id: user_id.to_string(),
            },
            at,
        )?;
        Ok(())
    }

    fn execute(&mut self, task: Task, now: Time, events: &mut Vec<Event>) -> Result<(), RuntimeError> {
        let mobility_id = self.mobility_id();
        match task {
            Task::EmitReserved { user_id, reservation } => {
                let details = match reservation {
                    Some(r) => json!({
                        "success": true,
                        "userId": r.user_id,
                        "mobilityId": mobility_id,
                        "route": [{
                            "org": { "locationId": r.org },
                            "dst": { "locationId": r.dst },
                            "dept": r.dept.as_minutes(),
                            "arrv": r.arrv.as_minutes(),
                        }],
                    }),
                    None => json!({
                        "success": false,
                        "userId": user_id,
                    }),
                };
                events.push(Event::new("RESERVED", now, mobility_id, details));
            }
            Task::UserBoards { user_id } => {
                let Some(reservation) = self.reservations.remove(&user_id) else {
                    return Ok(());
                };
                events.push(Event::new(
                    "DEPARTED",
                    now,
                    mobility_id.clone(),
                    json!({
                        "userId": reservation.user_id,
                        "mobilityId": mobility_id,
                        "location": { "locationId": reservation.org },
                    }),
                ));

                let boarding_close = now.plus_minutes(self.board_time());
                match &mut self.committed {
                    Some(c) if c.org == reservation.org && c.dst == reservation.dst && !c.departed => {
                        c.riders.push(reservation.user_id);
                    }
                    _ => {
                        self.committed = Some(Commitment {
                            org: reservation.org.clone(),
                            dst: reservation.dst.clone(),
                            boarding_close,
                            departed: false,
                            riders: vec![reservation.user_id],
                        });
                        self.queue.schedule(Task::VehicleDeparts, boarding_close)?;
                    }
                }
            }
            Task::VehicleDeparts => {
                let Some(commitment) = &mut self.committed else {
                    return Ok(());
                };
                commitment.departed = true;
                let org = commitment.org.clone();
                let dst = commitment.dst.clone();
                let riders = commitment.riders.clone();
                events.push(Event::new(
                    "DEPARTED",
                    now,
                    mobility_id.clone(),
                    json!({
                        "userId": serde_json::Value::Null,
                        "mobilityId": mobility_id,
                        "location": { "locationId": org },
                    }),
                ));
                let travel = self.network.travel_time(&org, &dst).unwrap_or(0.0);
                self.queue
                    .schedule(Task::VehicleArrives { dst, riders }, now.plus_minutes(travel))?;
            }
            Task::VehicleArrives { dst, riders } => {
                events.push(Event::new(
                    "ARRIVED",
                    now,
                    mobility_id.clone(),
                    json!({
                        "userId": serde_json::Value::Null,
                        "mobilityId": mobility_id,
                        "location": { "locationId": dst.clone() },
                    }),
                ));
                self.location = dst;
                for user_id in riders {
                    self.queue
                        .schedule(Task::RiderAlights { user_id }, now.plus_minutes(self.board_time()))?;
                }
            }
            Task::RiderAlights { user_id } => {
                events.push(Event::new(
                    "ARRIVED",
                    now,
                    mobility_id.clone(),
                    json!({
                        "userId": user_id,
                        "mobilityId": mobility_id,
                        "location": { "locationId": self.location.clone() },
                    }),
                ));
                if let Some(commitment) = &mut self.committed {
                    commitment.riders.retain(|r| r != &user_id);
                    if commitment.departed && commitment.riders.is_empty() {
                        self.committed = None;
                    }
                }
            }
            Task::ServiceWindowClose => {
                let home = self.home_stop();
                if self.location != home {
                    events.push(Event::new(
                        "DEPARTED",
                        now,
                        mobility_id.clone(),
                        json!({
                            "userId": serde_json::Value::Null,
                            "mobilityId": mobility_id,
                            "location": { "locationId": self.location.clone() },
                        }),
                    ));
                    let travel = self.network.travel_time(&self.location, &home).unwrap_or(0.0);
                    self.queue.schedule(Task::ReturnHomeArrives, now.plus_minutes(travel))?;
                }
            }
            Task::ReturnHomeArrives => {
                let home = self.home_stop();
                events.push(Event::new(
                    "ARRIVED",
                    now,
                    mobility_id.clone(),
                    json!({
                        "userId": serde_json::Value::Null,
                        "mobilityId": mobility_id,
                        "location": { "locationId": home.clone() },
                    }),
                ));
                self.location = home;
            }
        }
        Ok(())
    }
}

impl SimulatorRuntime for OndemandSimulator {
    fn spec(&self) -> ServiceSpec {
        ServiceSpec {
            version: SCHEMA_VERSION.to_string(),
            events: vec![
                EventFeatures {
                    event_type: "RESERVED".into(),
                    declared: ["success", "userId", "mobilityId", "route"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                    required: Default::default(),
                },
                EventFeatures {
                    event_type: "DEPARTED".into(),
                    declared: ["userId", "mobilityId", "location"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                    required: Default::default(),
                },
                EventFeatures {
                    event_type: "ARRIVED".into(),
                    declared: ["userId", "mobilityId", "location"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                    required: Default::default(),
                },
                EventFeatures {
                    event_type: "DEMAND".into(),
                    declared: Default::default(),
                    required: ["userId", "org", "dst", "dept"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                },
                EventFeatures {
                    event_type: "DEPART".into(),
                    declared: Default::default(),
                    required: ["userId"].into_iter().map(String::from).collect(),
                },
            ],
            step_schema: None,
            triggered_schema: None,
        }
    }

    fn setup(&mut self, config: serde_json::Value) -> Result<(), SetupError> {
        let config = SetupConfig::parse(config)?;
        self.network = Network::from_edges(&config.network);
        self.location = config.home_stop.clone();
        self.queue = EventQueue::new();
        self.started = false;
        self.finished = false;
        self.committed = None;
        self.reservations.clear();
        self.config = Some(config);
        Ok(())
    }

    fn start(&mut self) -> Result<(), RuntimeError> {
        let end_window = self.config().end_window;
        self.queue
            .schedule(Task::ServiceWindowClose, Time::from_minutes(end_window))?;
        self.started = true;
        Ok(())
    }

    fn peek(&self) -> Time {
        self.queue.peek()
    }

    fn step(&mut self) -> Result<StepOutcome, RuntimeError> {
        if !self.started {
            return Err(RuntimeError::NotStarted);
        }
        if self.finished {
            return Err(RuntimeError::AlreadyFinished);
        }
        let fired = self.queue.pop()?;
        let now = self.queue.clock();
        let task = match fired {
            Fired::Event(task) => task,
            Fired::Triggered { value, .. } => value,
        };
        let mut events = Vec::new();
        self.execute(task, now, &mut events)?;
        Ok(StepOutcome { now, events })
    }

    fn triggered(&mut self, event: Event) -> Result<(), RuntimeError> {
        if !self.started {
            return Err(RuntimeError::NotStarted);
        }
        if event.time < self.queue.clock() {
            return Err(RuntimeError::TriggeredInPast {
                current: self.queue.clock().as_minutes(),
                event_time: event.time.as_minutes(),
            });
        }
        if self.queue.clock() < event.time {
            self.queue.advance_to(event.time)?;
        }

        match event.event_type.as_str() {
            "DEMAND" => {
                let user_id = field_str(&event.details, "userId");
                let org = field_str(&event.details, "org");
                let dst = field_str(&event.details, "dst");
                let dept = event
                    .details
                    .get("dept")
                    .and_then(|v| v.as_f64())
                    .unwrap_or_else(|| event.time.as_minutes());
                self.reserve_user(&user_id, &org, &dst, dept)?;
            }
            "DEPART" => {
                let user_id = field_str(&event.details, "userId");
                self.ready_to_depart(&user_id)?;
            }
            other => {
                tracing::debug!(event_type = other, "ignoring unrecognized triggered event type");
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RuntimeError> {
        self.finished = true;
        Ok(())
    }

    /// Overridden (rather than using the provided default) so that, when
    /// nothing is scheduled before `until`, the clock still advances all
    /// the way there — the direct analogue of the original
    /// `simulation.env.run(until=until)` fallback in `test_integration.py`'s
    /// `run` helper.
    fn run_until(&mut self, until: Time) -> Result<Vec<Event>, RuntimeError> {
        let mut events = Vec::new();
        while self.peek() < until {
            let mut outcome = self.step()?;
            events.append(&mut outcome.events);
        }
        if self.queue.clock() < until {
            self.queue.advance_to(until)?;
        }
        Ok(events)
    }
}

fn field_str(details: &serde_json::Value, field: &str) -> String {
    details
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}
