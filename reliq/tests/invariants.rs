//! Randomized invariant check
//!
//! Applies random transitions and verifies after every step that each task
//! sits in at most one location and that its status agrees with it.

mod common;

use common::{cleanup, queue, Snapshot};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use reliq::{EnqueueOptions, Error, Queue, ReleaseOptions, RequeueOptions, TaskStatus};
use std::collections::HashSet;
use std::time::Duration;

async fn check_invariants(
    queue: &Queue,
    known: &HashSet<String>,
    released: &HashSet<String>,
    retired: &HashSet<String>,
) {
    let snapshot = Snapshot::read(queue).await;
    let stats = queue.get_queue_stats().await.unwrap();
    assert_eq!(stats.pending as usize, snapshot.pending.len());
    assert_eq!(stats.working as usize, snapshot.working.len());
    assert_eq!(stats.delayed as usize, snapshot.delayed.len());
    assert_eq!(stats.tasks as usize, snapshot.tasks.len());

    for id in known {
        let locations = snapshot.location(id);
        assert!(locations.len() <= 1, "task {} in {:?}", id, locations);

        if released.contains(id) {
            assert!(locations.is_empty(), "released task {} still in {:?}", id, locations);
            assert!(!snapshot.tasks.contains(id));
            match queue.get_task_state(id).await {
                Ok(state) => assert!(state.status.is_terminal()),
                Err(Error::TaskNotFound(_)) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
            continue;
        }

        if retired.contains(id) {
            // Released while not working: data gone, record left until the
            // stale id is dropped by a dequeue
            assert!(!snapshot.tasks.contains(id));
            match queue.get_task_state(id).await {
                Ok(state) => assert_eq!(locations, vec![state.status], "task {}", id),
                Err(Error::TaskNotFound(_)) => assert!(locations.is_empty()),
                Err(e) => panic!("unexpected error: {}", e),
            }
            continue;
        }

        assert!(snapshot.tasks.contains(id), "unreleased task {} lost its data", id);
        let state = queue.get_task_state(id).await.unwrap();
        assert_eq!(locations, vec![state.status], "task {}", id);
        assert!(state.dequeue_count >= state.requeue_count, "task {}", id);
    }
}

#[tokio::test]
#[ignore = "Requires Redis server"]
async fn test_random_transitions_keep_invariants() {
    let queue = queue("invariants").await;
    let seed: u64 = rand::random();
    println!("seed: {}", seed);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut known = HashSet::new();
    let mut released = HashSet::new();
    let mut retired = HashSet::new();
    let mut in_hand: Vec<String> = Vec::new();

    for step in 0..200 {
        match rng.gen_range(0..6) {
            0 | 1 => {
                let delay = if rng.gen_bool(0.2) {
                    Duration::from_millis(rng.gen_range(1..400))
                } else {
                    Duration::ZERO
                };
                let timeout = Duration::from_millis(rng.gen_range(100..2000));
                let id = queue
                    .enqueue_with(&step, EnqueueOptions::default().delay(delay).task_timeout(timeout))
                    .await
                    .unwrap();
                known.insert(id);
            }
            2 => match queue.dequeue::<i32>(Some(Duration::from_secs(1))).await {
                // A reclaimed task can come back to us
                Ok((id, _)) => {
                    if !in_hand.contains(&id) {
                        in_hand.push(id);
                    }
                }
                Err(Error::Timeout(_)) => {}
                Err(e) => panic!("unexpected error: {}", e),
            },
            3 => {
                if let Some(id) = in_hand.choose(&mut rng).cloned() {
                    let delay = if rng.gen_bool(0.5) {
                        Duration::from_millis(rng.gen_range(1..300))
                    } else {
                        Duration::ZERO
                    };
                    // May have been reclaimed meanwhile; that is a reported no-op
                    queue
                        .requeue(&id, RequeueOptions::default().delay(delay))
                        .await
                        .unwrap();
                    in_hand.retain(|held| held != &id);
                }
            }
            4 => {
                if let Some(id) = in_hand.pop() {
                    let status = if rng.gen_bool(0.5) {
                        TaskStatus::Completed
                    } else {
                        TaskStatus::Rejected
                    };
                    let report = queue
                        .release_with(&id, Some(&step), ReleaseOptions::default().status(status))
                        .await
                        .unwrap();
                    if report.is_applied() {
                        released.insert(id);
                    } else {
                        retired.insert(id);
                    }
                }
            }
            _ => {
                queue.sweep().await.unwrap();
            }
        }

        check_invariants(&queue, &known, &released, &retired).await;
    }

    cleanup(&queue).await;
}
