//! BDD Tests for the shared Vigil types

use chrono::{DateTime, Duration, Utc};
use cucumber::{given, then, when, World};
use uuid::Uuid;
use vigil_core::{
    Lease, LeaseKey, NodeKind, NodeRef, Schedule, ScheduleThresholds, Status, VigilError,
};

#[derive(Debug, World)]
#[world(init = Self::new)]
struct CoreWorld {
    statuses: Vec<Status>,
    aggregate: Option<Status>,
    node: Option<Result<NodeRef, VigilError>>,
    schedule: Option<Result<Schedule, VigilError>>,
    lease: Option<Lease>,
    now: DateTime<Utc>,
}

impl CoreWorld {
    fn new() -> Self {
        Self {
            statuses: Vec::new(),
            aggregate: None,
            node: None,
            schedule: None,
            lease: None,
            now: Utc::now(),
        }
    }
}

#[given(expr = "child statuses {string}")]
async fn given_statuses(world: &mut CoreWorld, statuses: String) {
    world.statuses = statuses
        .split(',')
        .map(|s| s.parse().expect("valid status"))
        .collect();
}

#[when("the statuses are aggregated")]
async fn when_aggregated(world: &mut CoreWorld) {
    world.aggregate = Status::aggregate(world.statuses.iter().copied());
}

#[then(expr = "the aggregate should be {string}")]
async fn then_aggregate(world: &mut CoreWorld, expected: String) {
    assert_eq!(world.aggregate, Some(expected.parse().expect("valid status")));
}

#[when(expr = "I parse the node reference {string}")]
async fn when_parse_node(world: &mut CoreWorld, input: String) {
    world.node = Some(input.parse());
}

#[then(expr = "the node should be of kind {string} with id {int}")]
async fn then_node(world: &mut CoreWorld, kind: String, id: i64) {
    let node = world.node.as_ref().expect("parsed").as_ref().expect("valid node");
    assert_eq!(node.kind, NodeKind::from(kind));
    assert_eq!(node.id, id);
}

#[then(expr = "it should be written as {string}")]
async fn then_written(world: &mut CoreWorld, expected: String) {
    let node = world.node.as_ref().expect("parsed").as_ref().expect("valid node");
    assert_eq!(node.to_string(), expected);
}

#[then(expr = "parsing should fail with kind {string}")]
async fn then_parse_fails(world: &mut CoreWorld, kind: String) {
    match world.node.as_ref().expect("parsed") {
        Err(error) => assert_eq!(error.kind(), kind),
        Ok(node) => panic!("Expected a parse error, got {}", node),
    }
}

#[when(expr = "I define schedule {int} every {int} seconds with warning {int}ms and critical {int}ms")]
async fn when_define_schedule(
    world: &mut CoreWorld,
    id: i64,
    interval: u64,
    warning: u64,
    critical: u64,
) {
    world.schedule = Some(Schedule::new(
        id,
        "core-bdd",
        interval,
        ScheduleThresholds::new(warning, critical),
    ));
}

#[then(expr = "the schedule should be rejected with kind {string}")]
async fn then_schedule_rejected(world: &mut CoreWorld, kind: String) {
    match world.schedule.as_ref().expect("defined") {
        Err(error) => assert_eq!(error.kind(), kind),
        Ok(schedule) => panic!("Expected rejection, got {:?}", schedule),
    }
}

#[given(expr = "a lease on {string} expiring in {int} seconds")]
async fn given_lease(world: &mut CoreWorld, resource: String, secs: i64) {
    world.lease = Some(Lease {
        resource: LeaseKey::new(resource),
        agent_id: Uuid::new_v4(),
        acquired_at: world.now,
        expires_at: world.now + Duration::seconds(secs),
        token: 1,
    });
}

#[when(expr = "{int} seconds pass")]
async fn when_time_passes(world: &mut CoreWorld, secs: i64) {
    world.now += Duration::seconds(secs);
}

#[then("the lease should be expired")]
async fn then_expired(world: &mut CoreWorld) {
    assert!(world.lease.as_ref().expect("lease").is_expired_at(world.now));
}

#[then("the lease should not be reclaimable")]
async fn then_not_reclaimable(world: &mut CoreWorld) {
    assert!(!world.lease.as_ref().expect("lease").is_reclaimable_at(world.now));
}

#[then("the lease should be reclaimable")]
async fn then_reclaimable(world: &mut CoreWorld) {
    assert!(world.lease.as_ref().expect("lease").is_reclaimable_at(world.now));
}

#[tokio::main]
async fn main() {
    CoreWorld::run("tests/features").await;
}
