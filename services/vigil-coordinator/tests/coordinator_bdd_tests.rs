//! BDD Tests for the coordinator HTTP API, driven in-process

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use clap::Parser;
use cucumber::{given, then, when, World};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use vigil_coordinator::{router, AppState, CoordinatorConfig};
use vigil_core::api::{DependencyRequest, ScheduleBinding, SubmitHeartbeatRequest};
use vigil_core::{
    endpoints, AcquireOutcome, AgentId, HeartbeatSample, Lease, LeaseKey, ManualClock, NodeRef,
    Schedule, ScheduleThresholds,
};

#[derive(Debug, World)]
#[world(init = Self::new)]
struct CoordinatorWorld {
    app: Router,
    agents: HashMap<String, AgentId>,
    leases: HashMap<String, Lease>,
    outcomes: HashMap<String, AcquireOutcome>,
    last_status: Option<StatusCode>,
    last_body: Value,
}

impl CoordinatorWorld {
    fn new() -> Self {
        let config = CoordinatorConfig::parse_from(["vigil-coordinator"]);
        let state = AppState::new(&config, Arc::new(ManualClock::default()));
        Self {
            app: router(state),
            agents: HashMap::new(),
            leases: HashMap::new(),
            outcomes: HashMap::new(),
            last_status: None,
            last_body: Value::Null,
        }
    }

    fn agent(&mut self, name: &str) -> AgentId {
        *self
            .agents
            .entry(name.to_string())
            .or_insert_with(Uuid::new_v4)
    }

    async fn call(&mut self, method: Method, uri: &str, body: Option<Vec<u8>>) -> Value {
        let mut request = Request::builder().method(method).uri(uri);
        if body.is_some() {
            request = request.header("content-type", "application/json");
        }
        let request = request
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .expect("valid request");

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        self.last_status = Some(response.status());

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        self.last_body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        self.last_body.clone()
    }

    async fn post<T: Serialize>(&mut self, uri: &str, body: &T) -> Value {
        let bytes = serde_json::to_vec(body).expect("serializable body");
        self.call(Method::POST, uri, Some(bytes)).await
    }

    async fn get(&mut self, uri: &str) -> Value {
        self.call(Method::GET, uri, None).await
    }

    async fn report(&mut self, name: &str, latency: u64, node: &str, schedule_id: i64, token_skew: u64) {
        let holder = self.agent(name);
        let lease = self.leases.get(name).expect("agent holds a lease").clone();
        let request = SubmitHeartbeatRequest {
            schedule_id,
            holder,
            token: lease.token + token_skew,
            node: node.parse().expect("valid node ref"),
            sample: HeartbeatSample::succeeded(chrono::Utc::now(), Some(latency)),
        };
        self.post(endpoints::API_V1_HEARTBEATS, &request).await;
    }
}

#[given("a running coordinator")]
async fn given_coordinator(world: &mut CoordinatorWorld) {
    world.get(endpoints::HEALTH).await;
    assert_eq!(world.last_status, Some(StatusCode::OK));
}

#[given(expr = "schedule {int} {string} every {int} seconds with thresholds {int} and {int} probing {string}")]
async fn given_schedule(
    world: &mut CoordinatorWorld,
    id: i64,
    name: String,
    interval: u64,
    warning: u64,
    critical: u64,
    node: String,
) {
    let binding = ScheduleBinding {
        schedule: Schedule::new(id, name, interval, ScheduleThresholds::new(warning, critical))
            .expect("valid schedule"),
        nodes: vec![node.parse().expect("valid node ref")],
    };
    world.post(endpoints::API_V1_SCHEDULES, &binding).await;
    assert_eq!(world.last_status, Some(StatusCode::CREATED));
}

#[given(expr = "dependency {string} on {string}")]
async fn given_dependency(world: &mut CoordinatorWorld, parent: String, child: String) {
    when_add_dependency(world, parent, child).await;
    assert_eq!(world.last_status, Some(StatusCode::CREATED));
}

#[when(expr = "I add dependency {string} on {string}")]
async fn when_add_dependency(world: &mut CoordinatorWorld, parent: String, child: String) {
    let request = DependencyRequest {
        parent: parent.parse().expect("valid parent"),
        child: child.parse().expect("valid child"),
    };
    world.post(endpoints::API_V1_DEPENDENCIES, &request).await;
}

#[given(expr = "agent {string} acquires schedule {int}")]
async fn given_agent_acquires(world: &mut CoordinatorWorld, name: String, schedule_id: i64) {
    when_agent_acquires(world, name, schedule_id).await;
}

#[when(expr = "agent {string} acquires schedule {int}")]
async fn when_agent_acquires(world: &mut CoordinatorWorld, name: String, schedule_id: i64) {
    let holder = world.agent(&name);
    let body = serde_json::json!({
        "resource": LeaseKey::schedule(schedule_id),
        "holder": holder,
        "ttl_secs": 30
    });
    let response = world.post(endpoints::API_V1_LEASES_ACQUIRE, &body).await;
    let outcome: AcquireOutcome = serde_json::from_value(response).expect("acquire outcome");
    if outcome.is_granted() {
        world.leases.insert(name.clone(), outcome.lease().clone());
    }
    world.outcomes.insert(name, outcome);
}

#[when(expr = "agent {string} reports {int} ms for {string} on schedule {int}")]
async fn when_agent_reports(
    world: &mut CoordinatorWorld,
    name: String,
    latency: u64,
    node: String,
    schedule_id: i64,
) {
    world.report(&name, latency, &node, schedule_id, 0).await;
}

#[when(expr = "agent {string} reports {int} ms for {string} on schedule {int} with a stale token")]
async fn when_agent_reports_stale(
    world: &mut CoordinatorWorld,
    name: String,
    latency: u64,
    node: String,
    schedule_id: i64,
) {
    world.report(&name, latency, &node, schedule_id, 1).await;
}

#[then(expr = "agent {string} should have been granted")]
async fn then_granted(world: &mut CoordinatorWorld, name: String) {
    assert!(world.outcomes[&name].is_granted());
}

#[then(expr = "agent {string} should have been told the lease is held")]
async fn then_held(world: &mut CoordinatorWorld, name: String) {
    let outcome = &world.outcomes[&name];
    assert!(!outcome.is_granted());
    assert_ne!(outcome.lease().agent_id, world.agents[&name]);
}

#[then(expr = "the last response status should be {int}")]
async fn then_status_code(world: &mut CoordinatorWorld, expected: u16) {
    assert_eq!(
        world.last_status.map(|s| s.as_u16()),
        Some(expected),
        "body: {}",
        world.last_body
    );
}

#[then(expr = "the error kind should be {string}")]
async fn then_error_kind(world: &mut CoordinatorWorld, expected: String) {
    assert_eq!(world.last_body["kind"], Value::String(expected));
}

#[then(expr = "node {string} should be {string}")]
async fn then_node_status(world: &mut CoordinatorWorld, node: String, expected: String) {
    let node: NodeRef = node.parse().expect("valid node ref");
    let uri = format!("{}/{}/{}", endpoints::API_V1_NODES, node.kind, node.id);
    let body = world.get(&uri).await;
    assert_eq!(world.last_status, Some(StatusCode::OK));
    assert_eq!(body["node"]["status"], Value::String(expected));
}

#[then(expr = "the event feed should contain at least {int} events")]
async fn then_event_feed(world: &mut CoordinatorWorld, minimum: usize) {
    let body = world.get(endpoints::API_V1_EVENTS).await;
    let total = body["total"].as_u64().expect("total") as usize;
    assert!(total >= minimum, "only {} events", total);
}

#[tokio::main]
async fn main() {
    CoordinatorWorld::run("tests/features").await;
}
