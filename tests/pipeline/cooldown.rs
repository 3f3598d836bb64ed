use std::time::Duration;

use crate::support::{
    helpers::{config, init_tracing, runner, WORKER_KEYS},
    mock_api::MockRiotApi,
};
use anyhow::{Context, Result};
use matchpull::{ExtractError, Region};
use tokio::time::timeout;

fn slow_world(matches: usize) -> MockRiotApi {
    let api = MockRiotApi::new().with_latency(Duration::from_secs(1));
    api.add_player("Faker", "KR1", Region::Korea, matches);
    api
}

#[tokio::test(start_paused = true)]
async fn rate_limited_credential_sits_out_cooldown_while_peer_continues() -> Result<()> {
    init_tracing();
    let api = slow_world(200);
    api.inject(
        "key-1",
        4,
        ExtractError::RateLimited {
            endpoint: "match_ids",
            retry_after: None,
        },
    );

    let mut runner = runner(&api, config(&WORKER_KEYS, 10)?)?;
    let cooldown = runner.config().cooldown();
    let receipt = runner
        .orchestrator()
        .enqueue_extraction("Faker#KR1", 200)
        .await?;
    assert_eq!(receipt.task_ids.len(), 20);

    let stats = timeout(Duration::from_secs(3_600), runner.run_until_drained()).await??;
    assert_eq!((stats.done, stats.failed), (20, 0));

    let limited_at = api
        .calls_by("key-1")
        .iter()
        .find(|call| call.failed)
        .map(|call| call.at)
        .context("key-1 should have been rate limited")?;

    let resumed: Vec<_> = api
        .calls_by("key-1")
        .into_iter()
        .filter(|call| call.at > limited_at)
        .collect();
    assert!(
        resumed.iter().all(|call| call.at >= limited_at + cooldown),
        "key-1 issued a call during its cool-down"
    );
    assert!(!resumed.is_empty(), "key-1 should rejoin once the cool-down ends");

    let peer_calls_during_cooldown = api
        .calls_by("key-2")
        .iter()
        .filter(|call| call.at > limited_at && call.at < limited_at + cooldown)
        .count();
    assert!(
        peer_calls_during_cooldown > 0,
        "key-2 should keep extracting while key-1 cools down"
    );

    let records = runner
        .store()
        .records_for_subject(&receipt.subject.puuid)
        .await?;
    assert_eq!(records.len(), 200);

    let snapshot = runner.telemetry().snapshot();
    assert_eq!(snapshot.rate_limit_signals, 1);
    assert_eq!(snapshot.records_inserted, 200);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_shortens_cooldown() -> Result<()> {
    init_tracing();
    let api = slow_world(100);
    let hint = Duration::from_secs(5);
    api.inject(
        "key-1",
        4,
        ExtractError::RateLimited {
            endpoint: "match_ids",
            retry_after: Some(hint),
        },
    );

    let mut runner = runner(&api, config(&WORKER_KEYS, 10)?)?;
    let default_cooldown = runner.config().cooldown();
    runner
        .orchestrator()
        .enqueue_extraction("Faker#KR1", 100)
        .await?;

    let stats = timeout(Duration::from_secs(3_600), runner.run_until_drained()).await??;
    assert_eq!((stats.done, stats.failed), (10, 0));

    let calls = api.calls_by("key-1");
    let limited_at = calls
        .iter()
        .find(|call| call.failed)
        .map(|call| call.at)
        .context("key-1 should have been rate limited")?;
    let next = calls
        .iter()
        .find(|call| call.at > limited_at)
        .map(|call| call.at)
        .context("key-1 should resume after the hinted delay")?;

    assert!(next >= limited_at + hint);
    assert!(next < limited_at + default_cooldown);
    Ok(())
}
