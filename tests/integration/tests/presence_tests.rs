//! Presence Integration Tests
//!
//! Drive the presence service end to end: heartbeats, location updates,
//! background reaping, and minute accounting across both registries.
//!
//! Run with: cargo test -p integration-tests --test presence_tests

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use integration_tests::{
    assert_linked, build_service, join, leave, settle, test_config, unique_domain, unique_user,
    FailingLedger, TestPresence,
};
use metaverse_core::{Availability, LocationPatch};
use tokio::time::{advance, sleep, sleep_until, Instant};

// ============================================================================
// End-to-end Scenario
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_move_and_expiry_scenario() {
    let p = TestPresence::started();
    let service = &p.service;
    let start = Instant::now();

    let s1 = service.heartbeat_user("alice").await.unwrap();
    assert_eq!(s1, "s1");
    let presence = service.user_presence("alice").await.unwrap().unwrap();
    assert_eq!(presence.minutes_counted, 0);

    // Continuous heartbeats, every gap shorter than the TTL.
    for at in [20, 40, 65] {
        sleep_until(start + Duration::from_secs(at)).await;
        assert_eq!(service.heartbeat_user("alice").await.unwrap(), s1);
    }
    settle().await;
    let presence = service.user_presence("alice").await.unwrap().unwrap();
    assert_eq!(presence.minutes_counted, 1);
    assert_eq!(p.ledger.total("alice"), 1);

    sleep_until(start + Duration::from_secs(70)).await;
    assert_eq!(service.update_user_location("alice", &join("D1")).await.unwrap(), s1);
    let roster = service.domain_roster("D1").await.unwrap().unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].user_id.as_str(), "alice");

    // The domain keeps heartbeating; alice goes quiet.
    for at in (80..=200).step_by(10) {
        sleep_until(start + Duration::from_secs(at)).await;
        service.heartbeat_domain("D1").await.unwrap();
    }

    assert!(service.user_presence("alice").await.unwrap().is_none());
    assert_eq!(service.domain_roster("D1").await.unwrap(), Some(Vec::new()));
    assert_eq!(service.online_user_count(), 0);
    assert_eq!(service.online_domain_count(), 1);
    assert_eq!(p.ledger.total("alice"), 1);

    service.shutdown().await;
}

// ============================================================================
// Session Lifecycle Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_heartbeat_creates_one_session() {
    let p = TestPresence::new();
    let user = unique_user();

    let first = p.service.heartbeat_user(&user).await.unwrap();
    let second = p.service.heartbeat_user(&user).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(p.service.online_user_count(), 1);

    let presence = p.service.user_presence(&user).await.unwrap().unwrap();
    assert_eq!(presence.session_id, first);
    assert_eq!(presence.location.availability, Availability::None);
    assert!(!presence.location.connected);
    assert!(presence.location.domain_id.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_session_expires_within_ttl_plus_interval() {
    let p = TestPresence::started();
    let user = unique_user();
    p.service.heartbeat_user(&user).await.unwrap();

    sleep(Duration::from_secs(30)).await;
    assert!(p.service.user_presence(&user).await.unwrap().is_some());

    sleep(Duration::from_secs(16)).await;
    assert!(p.service.user_presence(&user).await.unwrap().is_none());
    assert_eq!(p.service.online_user_count(), 0);

    p.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_expired_session_gets_new_id() {
    let p = TestPresence::new();
    let user = unique_user();

    let first = p.service.heartbeat_user(&user).await.unwrap();
    advance(Duration::from_secs(31)).await;
    let second = p.service.heartbeat_user(&user).await.unwrap();

    assert_ne!(first, second);
    let presence = p.service.user_presence(&user).await.unwrap().unwrap();
    assert_eq!(presence.minutes_counted, 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_detaches_from_domain() {
    let p = TestPresence::new();
    let (user, domain) = (unique_user(), unique_domain());
    p.service.update_user_location(&user, &join(&domain)).await.unwrap();

    assert!(p.service.disconnect_user(&user).await.unwrap());
    assert!(!p.service.disconnect_user(&user).await.unwrap());

    assert_eq!(p.service.domain_roster(&domain).await.unwrap(), Some(Vec::new()));
    assert_eq!(p.service.online_domain_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_ids_never_create_sessions() {
    let p = TestPresence::new();

    assert!(p.service.heartbeat_user("").await.is_err());
    assert!(p.service.heartbeat_user("\t").await.is_err());
    assert!(p.service.heartbeat_user(&"x".repeat(300)).await.is_err());
    assert!(p.service.heartbeat_domain(" ").await.is_err());

    let err = p.service.update_user_location("", &join("d1")).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_KEY");

    assert_eq!(p.service.online_user_count(), 0);
    assert_eq!(p.service.online_domain_count(), 0);
}

// ============================================================================
// Minute Accounting Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_minutes_match_elapsed_time() {
    let p = TestPresence::new();
    let (steady, bursty) = (unique_user(), unique_user());
    p.service.heartbeat_user(&steady).await.unwrap();
    p.service.heartbeat_user(&bursty).await.unwrap();

    // Uneven gaps, all shorter than the TTL.
    let gaps = [1, 13, 29, 5, 2, 2, 17];
    let mut elapsed = 0;
    let mut i = 0;
    while elapsed < 450 {
        let gap = gaps[i % gaps.len()];
        advance(Duration::from_secs(gap)).await;
        elapsed += gap;
        i += 1;

        p.service.heartbeat_user(&steady).await.unwrap();
        for _ in 0..(i % 4) {
            p.service.heartbeat_user(&bursty).await.unwrap();
        }
        if i % 4 == 0 {
            p.service.heartbeat_user(&bursty).await.unwrap();
        }
    }
    settle().await;

    let expected = elapsed / 60;
    assert!(expected >= 7);
    assert_eq!(p.ledger.total(&steady), expected);
    assert_eq!(p.ledger.total(&bursty), expected);
    assert_eq!(
        p.service.user_presence(&steady).await.unwrap().unwrap().minutes_counted,
        expected
    );
}

#[tokio::test(start_paused = true)]
async fn test_ledger_failure_does_not_fail_heartbeat() {
    let ledger = Arc::new(FailingLedger::default());
    let service = build_service(test_config(30, 15).unwrap(), ledger.clone());
    let user = unique_user();

    let session = service.heartbeat_user(&user).await.unwrap();
    for _ in 0..3 {
        advance(Duration::from_secs(25)).await;
        assert_eq!(service.heartbeat_user(&user).await.unwrap(), session);
    }
    settle().await;

    assert_eq!(ledger.attempts(), 1);
    let presence = service.user_presence(&user).await.unwrap().unwrap();
    assert_eq!(presence.minutes_counted, 1);
}

// ============================================================================
// Roster Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_repeated_join_is_not_duplicated() {
    let p = TestPresence::new();
    let (user, domain) = (unique_user(), unique_domain());

    p.service.update_user_location(&user, &join(&domain)).await.unwrap();
    p.service.update_user_location(&user, &join(&domain)).await.unwrap();

    let roster = p.service.domain_roster(&domain).await.unwrap().unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(p.service.domain_online_count(&domain).await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rosters_follow_user_moves() {
    let p = TestPresence::new();
    let users: Vec<String> = (0..6).map(|_| unique_user()).collect();
    let domains: Vec<String> = (0..3).map(|_| unique_domain()).collect();

    for step in 0..60 {
        let user = &users[step % users.len()];
        let patch = match (step * 7 + 3) % 4 {
            3 => leave(),
            d => join(&domains[d]),
        };
        p.service.update_user_location(user, &patch).await.unwrap();
        assert_linked(&p.service, &users, &domains).await.unwrap();
    }

    // Every user is in exactly one roster or none.
    let mut placed = 0;
    for user in &users {
        let presence = p.service.user_presence(user).await.unwrap().unwrap();
        if presence.location.domain_id.is_some() {
            placed += 1;
        }
    }
    let mut seen = 0;
    for domain in &domains {
        seen += p.service.domain_online_count(domain).await.unwrap();
    }
    assert_eq!(seen, placed);
}

#[tokio::test(start_paused = true)]
async fn test_expired_user_leaves_live_domain() {
    let p = TestPresence::started();
    let (alice, bob, domain) = (unique_user(), unique_user(), unique_domain());

    p.service.update_user_location(&alice, &join(&domain)).await.unwrap();
    p.service.update_user_location(&bob, &join(&domain)).await.unwrap();

    for _ in 0..6 {
        sleep(Duration::from_secs(10)).await;
        p.service.heartbeat_domain(&domain).await.unwrap();
        p.service.heartbeat_user(&bob).await.unwrap();
    }

    let roster = p.service.domain_roster(&domain).await.unwrap().unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].user_id.as_str(), bob);
    assert!(p.service.user_presence(&alice).await.unwrap().is_none());

    p.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_user_heartbeat_rejoins_recreated_domain() {
    let p = TestPresence::new();
    let (alice, domain) = (unique_user(), unique_domain());
    p.service.update_user_location(&alice, &join(&domain)).await.unwrap();

    // Only alice heartbeats, so the domain lapses under her.
    for _ in 0..4 {
        advance(Duration::from_secs(10)).await;
        p.service.heartbeat_user(&alice).await.unwrap();
    }
    p.service.sweep();
    assert_eq!(p.service.online_domain_count(), 0);

    p.service.heartbeat_domain(&domain).await.unwrap();
    p.service.heartbeat_user(&alice).await.unwrap();

    let roster = p.service.domain_roster(&domain).await.unwrap().unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].user_id.as_str(), alice);
    assert_linked(&p.service, &[alice], &[domain]).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_rosters_agree_with_user_presence_before_reaping() {
    let p = TestPresence::new();
    let (alice, bob, domain) = (unique_user(), unique_user(), unique_domain());
    p.service.update_user_location(&alice, &join(&domain)).await.unwrap();
    p.service.update_user_location(&bob, &join(&domain)).await.unwrap();

    advance(Duration::from_secs(20)).await;
    p.service.heartbeat_domain(&domain).await.unwrap();
    p.service.heartbeat_user(&bob).await.unwrap();
    advance(Duration::from_secs(15)).await;

    assert!(p.service.user_presence(&alice).await.unwrap().is_none());
    let roster = p.service.domain_roster(&domain).await.unwrap().unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].user_id.as_str(), bob);
    assert_eq!(p.service.domain_online_count(&domain).await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_patch_from_json() {
    let p = TestPresence::new();
    let (user, domain) = (unique_user(), unique_domain());
    let body = serde_json::json!({
        "availability": "friends",
        "connected": true,
        "domain_id": domain,
        "network_address": "10.0.0.7",
        "network_port": "40102",
        "path": "/0,0,0/0,0,0,1",
    });
    let patch: LocationPatch = serde_json::from_value(body).unwrap();

    p.service.update_user_location(&user, &patch).await.unwrap();

    let location = p.service.user_presence(&user).await.unwrap().unwrap().location;
    assert_eq!(location.availability, Availability::Friends);
    assert!(location.connected);
    assert_eq!(location.domain_id.unwrap().as_str(), domain);
    assert_eq!(location.network_address, "10.0.0.7");
    assert_eq!(location.network_port, "40102");
    assert_eq!(location.path, "/0,0,0/0,0,0,1");
    assert!(location.place_id.is_none());

    let patch: LocationPatch = serde_json::from_str(r#"{"domain_id": null}"#).unwrap();
    p.service.update_user_location(&user, &patch).await.unwrap();
    assert_eq!(p.service.domain_roster(&domain).await.unwrap(), Some(Vec::new()));
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_heartbeats_share_one_session() {
    let p = TestPresence::new();
    let user = unique_user();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let service = p.service.clone();
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for _ in 0..50 {
                ids.push(service.heartbeat_user(&user).await.unwrap());
            }
            ids
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.extend(handle.await.unwrap());
    }

    assert_eq!(ids.len(), 1);
    assert_eq!(p.service.online_user_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_moves_keep_rosters_consistent() {
    let p = TestPresence::new();
    let users: Vec<String> = (0..8).map(|_| unique_user()).collect();
    let domains: Vec<String> = (0..4).map(|_| unique_domain()).collect();

    let mut handles = Vec::new();
    for (n, user) in users.iter().enumerate() {
        let service = p.service.clone();
        let user = user.clone();
        let domains = domains.clone();
        handles.push(tokio::spawn(async move {
            for step in 0..100 {
                let domain = &domains[(n + step) % domains.len()];
                service.update_user_location(&user, &join(domain)).await.unwrap();
                service.heartbeat_domain(domain).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_linked(&p.service, &users, &domains).await.unwrap();

    let mut total = 0;
    for domain in &domains {
        total += p.service.domain_online_count(domain).await.unwrap();
    }
    assert_eq!(total, users.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_moves_racing_disconnects_keep_rosters_consistent() {
    let p = TestPresence::new();
    let users: Vec<String> = (0..4).map(|_| unique_user()).collect();
    let domains: Vec<String> = (0..2).map(|_| unique_domain()).collect();

    let mut handles = Vec::new();
    for (n, user) in users.iter().enumerate() {
        let mover = p.service.clone();
        let (moving, domains) = (user.clone(), domains.clone());
        handles.push(tokio::spawn(async move {
            for step in 0..200 {
                let domain = &domains[(n + step) % domains.len()];
                mover.update_user_location(&moving, &join(domain)).await.unwrap();
            }
        }));

        let closer = p.service.clone();
        let leaving = user.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..200 {
                closer.disconnect_user(&leaving).await.unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_linked(&p.service, &users, &domains).await.unwrap();

    // Every roster entry is a user that is still online.
    let mut listed = 0;
    for domain in &domains {
        listed += p.service.domain_online_count(domain).await.unwrap();
    }
    let mut online = 0;
    for user in &users {
        if p.service.user_presence(user).await.unwrap().is_some() {
            online += 1;
        }
    }
    assert_eq!(listed, online);
}
