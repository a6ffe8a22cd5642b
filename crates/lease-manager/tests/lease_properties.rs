//! Property-based tests for lease exclusivity
//!
//! - A concurrent acquire storm never yields two grants
//! - Under any interleaving of acquire/renew/release/sweep and clock
//!   movement, a grant is only handed out when no other agent holds a
//!   live lease

use chrono::{DateTime, Duration, Utc};
use lease_manager::{AgentId, InMemoryLeaseStore, LeaseConfig, LeaseKey, LeaseManager};
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;
use vigil_core::{Clock, ManualClock};

fn manager() -> (LeaseManager, ManualClock) {
    let clock = ManualClock::default();
    let manager = LeaseManager::new(
        Arc::new(InMemoryLeaseStore::new()),
        Arc::new(clock.clone()),
        LeaseConfig::default(),
    );
    (manager, clock)
}

#[derive(Debug, Clone)]
enum Op {
    Acquire { agent: usize, ttl_secs: i64 },
    Renew { agent: usize, ttl_secs: i64 },
    Release { agent: usize },
    Advance { secs: i64 },
    Sweep,
}

fn op_strategy(agents: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..agents, 1i64..20).prop_map(|(agent, ttl_secs)| Op::Acquire { agent, ttl_secs }),
        2 => (0..agents, 1i64..20).prop_map(|(agent, ttl_secs)| Op::Renew { agent, ttl_secs }),
        1 => (0..agents).prop_map(|agent| Op::Release { agent }),
        3 => (0i64..15).prop_map(|secs| Op::Advance { secs }),
        1 => Just(Op::Sweep),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_acquire_storm_grants_exactly_one(contenders in 2usize..24, ttl_secs in 1i64..120) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .build()
            .unwrap();

        let granted = runtime.block_on(async move {
            let (manager, _clock) = manager();
            let key = LeaseKey::schedule(7);
            let barrier = Arc::new(tokio::sync::Barrier::new(contenders));

            let handles: Vec<_> = (0..contenders)
                .map(|_| {
                    let manager = manager.clone();
                    let key = key.clone();
                    let barrier = barrier.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        manager
                            .acquire(&key, Uuid::new_v4(), Duration::seconds(ttl_secs))
                            .await
                    })
                })
                .collect();

            let mut granted = 0;
            for handle in handles {
                if handle.await.unwrap().unwrap().is_granted() {
                    granted += 1;
                }
            }
            granted
        });

        prop_assert_eq!(granted, 1);
    }

    #[test]
    fn prop_grants_never_overlap(ops in prop::collection::vec(op_strategy(3), 1..60)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let (manager, clock) = manager();
            let key = LeaseKey::schedule(1);
            let agents: Vec<AgentId> = (0..3).map(|_| Uuid::new_v4()).collect();
            // Model of the live holder as granted by the manager.
            let mut holder: Option<(AgentId, DateTime<Utc>)> = None;

            for op in ops {
                let now = clock.now();
                match op {
                    Op::Acquire { agent, ttl_secs } => {
                        let outcome = manager
                            .acquire(&key, agents[agent], Duration::seconds(ttl_secs))
                            .await
                            .unwrap();
                        if outcome.is_granted() {
                            if let Some((current, expires_at)) = holder {
                                assert!(
                                    current == agents[agent] || expires_at <= now,
                                    "granted while another agent held a live lease"
                                );
                            }
                            holder = Some((agents[agent], outcome.lease().expires_at));
                        } else {
                            let (current, expires_at) = holder.expect("refused with no holder");
                            assert_ne!(current, agents[agent]);
                            assert!(expires_at > now);
                        }
                    }
                    Op::Renew { agent, ttl_secs } => {
                        let result = manager
                            .renew(&key, agents[agent], Duration::seconds(ttl_secs))
                            .await;
                        match (result, holder) {
                            (Ok(lease), Some((current, expires_at))) => {
                                assert_eq!(current, agents[agent]);
                                assert!(expires_at > now);
                                holder = Some((current, lease.expires_at));
                            }
                            (Ok(_), None) => panic!("renewed a lease nobody holds"),
                            (Err(_), _) => {}
                        }
                    }
                    Op::Release { agent } => {
                        if manager.release(&key, agents[agent]).await.unwrap() {
                            holder = None;
                        }
                    }
                    Op::Advance { secs } => clock.advance(Duration::seconds(secs)),
                    Op::Sweep => {
                        manager.sweep(now).await.unwrap();
                        if matches!(holder, Some((_, expires_at)) if expires_at < now) {
                            holder = None;
                        }
                    }
                }
            }
        });
    }
}
