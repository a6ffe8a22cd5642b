//! BDD Tests for status event fan-out

use chrono::Utc;
use cucumber::{given, then, when, World};
use status_events::{EventBus, EventSink, Subscription};
use vigil_core::{NodeRef, Status, StatusChange};

#[derive(Debug, World)]
#[world(init = Self::new)]
struct EventsWorld {
    bus: EventBus,
    subscribers: Vec<Subscription>,
}

impl EventsWorld {
    fn new() -> Self {
        Self {
            bus: EventBus::default(),
            subscribers: Vec::new(),
        }
    }

    fn publish(&self, node: NodeRef, new: Status) {
        self.bus.publish(&StatusChange {
            node,
            old: Status::Unknown,
            new,
            at: Utc::now(),
        });
    }
}

fn nodes(list: &str) -> Vec<NodeRef> {
    list.split(',')
        .map(|node| node.parse().expect("valid node"))
        .collect()
}

#[given(expr = "an event bus with capacity {int} keeping {int} recent events")]
async fn given_bus(world: &mut EventsWorld, capacity: usize, recent: usize) {
    world.bus = EventBus::new(capacity, recent);
}

#[given(expr = "{int} subscriber(s)")]
async fn given_subscribers(world: &mut EventsWorld, count: usize) {
    world.subscribers = (0..count).map(|_| world.bus.subscribe()).collect();
    assert_eq!(world.bus.subscriber_count(), count);
}

#[when(expr = "{string} changes to {string}")]
async fn when_changes(world: &mut EventsWorld, node: String, status: String) {
    world.publish(
        node.parse().expect("valid node"),
        status.parse().expect("valid status"),
    );
}

#[when(expr = "{int} changes are published")]
async fn when_many_changes(world: &mut EventsWorld, count: i64) {
    for id in 1..=count {
        world.publish(NodeRef::instance(id), Status::Warning);
    }
}

#[then(expr = "every subscriber should receive {string} in order")]
async fn then_received(world: &mut EventsWorld, expected: String) {
    let expected = nodes(&expected);
    for subscriber in &mut world.subscribers {
        let mut received = Vec::new();
        while let Some(change) = subscriber.try_next() {
            received.push(change.node);
        }
        assert_eq!(received, expected);
    }
}

#[then(expr = "the recent events should be {string}")]
async fn then_recent(world: &mut EventsWorld, expected: String) {
    let recent: Vec<NodeRef> = world
        .bus
        .recent(usize::MAX)
        .into_iter()
        .map(|change| change.node)
        .collect();
    assert_eq!(recent, nodes(&expected));
}

#[then(expr = "{int} events should have been published")]
async fn then_published(world: &mut EventsWorld, count: u64) {
    assert_eq!(world.bus.published(), count);
}

#[tokio::main]
async fn main() {
    EventsWorld::run("tests/features").await;
}
