//! Behavior of the degrading fetcher composed with the batch orchestrator,
//! exercised without a network: a target that degrades down its ladder, a
//! target that exhausts it, and healthy siblings in the same batch.

use metaguru::pipeline::batch::{run_batch, split_results};
use metaguru::pipeline::fetcher::fetch_with_ladder;
use metaguru::pipeline::ladders::{self, Threshold};
use std::collections::HashMap;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn degraded_and_exhausted_targets_do_not_abort_the_batch() {
    let ladder = ladders::DECK_LIST;
    let targets: Vec<String> = ["diamond_4to1", "diamond_to_legend", "top_10k", "top_legend"]
        .into_iter()
        .map(String::from)
        .collect();

    let results = run_batch(
        targets,
        2,
        Duration::from_millis(500),
        |bracket| async move {
            let fetched = fetch_with_ladder(
                ladder,
                ladders::DECK_LIST_MIN_VIABLE,
                Duration::from_secs(5),
                Duration::from_millis(50),
                |threshold| {
                    let bracket = bracket.clone();
                    async move {
                        match (bracket.as_str(), threshold) {
                            // This bracket never responds.
                            ("top_legend", _) => Err("connection reset"),
                            // This bracket has thin data until min_games=800.
                            ("diamond_4to1", Threshold::SiteDefault) => Ok(vec![0u32; 3]),
                            ("diamond_4to1", Threshold::MinGames(1600)) => Ok(vec![0u32; 7]),
                            ("diamond_4to1", Threshold::MinGames(800)) => Ok(vec![0u32; 15]),
                            ("diamond_4to1", _) => Ok(vec![0u32; 40]),
                            // Everything else is healthy on the first rung.
                            (_, _) => Ok(vec![0u32; 25]),
                        }
                    }
                },
            )
            .await?;
            Ok((bracket, fetched.records.len(), fetched.threshold_used))
        },
    )
    .await;

    let (successes, failures) = split_results(results);
    assert_eq!(successes.len(), 3);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].target, "top_legend");
    assert!(failures[0].error.contains("attempts"));

    let by_bracket: HashMap<String, (usize, Threshold)> = successes
        .into_iter()
        .map(|(bracket, count, threshold)| (bracket, (count, threshold)))
        .collect();
    assert_eq!(
        by_bracket["diamond_4to1"],
        (15, Threshold::MinGames(800)),
        "thin bracket should accept the first rung meeting the minimum"
    );
    assert_eq!(
        by_bracket["diamond_to_legend"],
        (25, Threshold::SiteDefault),
        "healthy bracket should stop at the site default"
    );
}

#[tokio::test(start_paused = true)]
async fn inter_batch_delay_paces_chunks() {
    let start = tokio::time::Instant::now();
    run_batch(vec![1u32, 2, 3, 4], 2, Duration::from_millis(500), |n| async move {
        Ok::<_, anyhow::Error>(n)
    })
    .await;
    // Two chunks of two, each followed by the inter-batch delay.
    assert_eq!(start.elapsed(), Duration::from_millis(1000));
}
