use std::time::Duration;

use crate::support::{
    helpers::{config, config_builder, init_tracing, runner, wait_until, WORKER_KEYS},
    mock_api::MockRiotApi,
};
use anyhow::{Context, Result};
use matchpull::{CredentialId, ExtractError, Region};
use tokio::time::{sleep, timeout};

fn revoked(label: &str) -> ExtractError {
    ExtractError::CredentialDead {
        credential: label.to_owned(),
    }
}

#[tokio::test(start_paused = true)]
async fn dead_credential_work_moves_to_survivor() -> Result<()> {
    init_tracing();
    let api = MockRiotApi::new().with_latency(Duration::from_millis(10));
    api.add_player("Faker", "KR1", Region::Korea, 40);
    api.inject("key-1", 3, revoked("key-1"));

    let mut runner = runner(&api, config(&WORKER_KEYS, 5)?)?;
    let receipt = runner
        .orchestrator()
        .enqueue_extraction("Faker#KR1", 40)
        .await?;

    let stats = timeout(Duration::from_secs(600), runner.run_until_drained()).await??;
    assert_eq!((stats.done, stats.failed), (8, 0));
    assert!(!runner.registry().is_alive(&CredentialId::new("key-1")));
    assert!(runner.registry().is_alive(&CredentialId::new("key-2")));

    let rejected_at = api
        .calls_by("key-1")
        .iter()
        .find(|call| call.failed)
        .map(|call| call.at)
        .context("key-1 should have been rejected")?;
    assert!(
        api.calls_by("key-1").iter().all(|call| call.at <= rejected_at),
        "a dead credential issues no further calls"
    );

    let records = runner
        .store()
        .records_for_subject(&receipt.subject.puuid)
        .await?;
    assert_eq!(records.len(), 40);
    assert_eq!(runner.telemetry().snapshot().dead_credentials, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn runner_stops_early_when_every_credential_is_dead() -> Result<()> {
    init_tracing();
    let api = MockRiotApi::new().with_latency(Duration::from_millis(10));
    api.add_player("Faker", "KR1", Region::Korea, 10);
    api.inject("key-1", 1, revoked("key-1"));

    let mut runner = runner(&api, config(&WORKER_KEYS[..1], 5)?)?;
    runner
        .orchestrator()
        .enqueue_extraction("Faker#KR1", 10)
        .await?;

    let stats = timeout(Duration::from_secs(600), runner.run_until_drained()).await??;
    assert_eq!(stats.done, 0);
    assert_eq!(stats.pending, 2, "unfinished work stays queued");
    assert_eq!(stats.in_flight, 0);
    assert!(!runner.is_running());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_inside_the_session() -> Result<()> {
    init_tracing();
    let api = MockRiotApi::new().with_latency(Duration::from_millis(10));
    api.add_player("Faker", "KR1", Region::Korea, 4);
    api.inject(
        "key-1",
        1,
        ExtractError::TransientUpstreamFailure {
            endpoint: "summoner_by_puuid",
            detail: "503 Service Unavailable".to_owned(),
        },
    );

    let mut runner = runner(&api, config(&WORKER_KEYS[..1], 4)?)?;
    runner
        .orchestrator()
        .enqueue_extraction("Faker#KR1", 4)
        .await?;
    runner.start().await?;

    let queue = runner.queue();
    wait_until(Duration::from_secs(60), || {
        let queue = queue.clone();
        async move { queue.stats().await.done == 1 }
    })
    .await?;
    runner.stop().await?;

    let snapshot = runner.telemetry().snapshot();
    assert_eq!(snapshot.transient_failures, 1);
    assert_eq!(snapshot.tasks_requeued, 0);
    assert_eq!(snapshot.records_inserted, 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stalled_claim_expires_to_peer_without_retiring_either_credential() -> Result<()> {
    init_tracing();
    let api = MockRiotApi::new().with_latency(Duration::from_millis(10));
    api.add_player("Faker", "KR1", Region::Korea, 2);
    api.stall_next("match_ids", Duration::from_secs(2));

    let config = config_builder(&WORKER_KEYS, 2)
        .claim_timeout(Duration::from_millis(300))
        .build()?;
    let mut runner = runner(&api, config)?;
    let receipt = runner
        .orchestrator()
        .enqueue_extraction("Faker#KR1", 2)
        .await?;
    runner.start().await?;

    let queue = runner.queue();
    wait_until(Duration::from_secs(30), || {
        let queue = queue.clone();
        async move { queue.stats().await.done == 1 }
    })
    .await?;
    // let the stalled worker wake up and try to settle its stale claim
    sleep(Duration::from_secs(5)).await;
    runner.stop().await?;

    let stalled = api
        .calls()
        .into_iter()
        .find(|call| call.stalled)
        .map(|call| call.credential)
        .context("the first match listing should have stalled")?;
    let details_by = |label: &str| {
        api.calls_by(label)
            .iter()
            .filter(|call| call.endpoint == "match_detail")
            .count()
    };
    let peer = if stalled == "key-1" { "key-2" } else { "key-1" };
    assert_eq!(details_by(peer), 2, "the peer took over the expired claim");
    assert_eq!(details_by(&stalled), 0, "stored matches are not fetched again");

    let stats = runner.queue().stats().await;
    assert_eq!(
        (stats.pending, stats.in_flight, stats.done, stats.failed),
        (0, 0, 1, 0)
    );
    for label in ["key-1", "key-2"] {
        assert!(runner.registry().is_alive(&CredentialId::new(label)), "{label} retired");
    }

    let snapshot = runner.telemetry().snapshot();
    assert_eq!(snapshot.tasks_done, 1);
    assert_eq!(snapshot.dead_credentials, 0);

    let records = runner
        .store()
        .records_for_subject(&receipt.subject.puuid)
        .await?;
    assert_eq!(records.len(), 2);
    Ok(())
}
