//! Driving the boundary searcher with your own oracle.
//!
//! The searcher works on any monotone yes/no threshold, not just HTTP
//! endpoints. This example searches a simulated limit with a closure-backed
//! oracle and prints every trial through a closure event handler. No network
//! access needed.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example custom_oracle
//! ```

use ceiling_rs::prelude::*;
use std::time::Duration;

const HIDDEN_LIMIT: u32 = 200_000;

#[tokio::main]
async fn main() -> Result<(), ProbeError> {
    let oracle = FnOracle::new(|candidate| async move {
        Ok(if candidate <= HIDDEN_LIMIT {
            ProbeOutcome::success(candidate, candidate)
        } else {
            ProbeOutcome::failure(candidate, EvidenceSource::ApiError, "payload too large")
        })
    });

    let printer = FnEventHandler::new(|_scope, event| {
        if let SearchEvent::Trial {
            phase,
            trial,
            outcome,
            ..
        } = event
        {
            let verdict = if outcome.succeeded { "ok" } else { "rejected" };
            println!("  {phase} #{trial}: {} {verdict}", outcome.candidate_value);
        }
    });

    let config = SearchConfig::default().with_pacing(Duration::from_millis(10));
    let scope = ProbeScope::new("simulated", ProbeKind::ContextWindow);
    let searcher = BoundarySearcher::new(config, scope).with_event_handler(&printer);

    let grow = searcher.exponential_search(&oracle).await?;
    let Some(upper) = grow.failed_candidate() else {
        println!("never rejected; at least {}", grow.value);
        return Ok(());
    };
    let remaining = searcher.config().max_trials - grow.trials;
    let refined = searcher
        .with_max_trials(remaining)
        .search_with_evidence(grow.value, upper, grow.known, &oracle)
        .await?;

    let trials = grow.trials + refined.trials;
    let confidence = searcher.calculate_confidence(trials, EvidenceSource::Success, refined.value);
    println!(
        "limit in [{}, {}] after {trials} trials ({confidence} confidence; actual {HIDDEN_LIMIT})",
        refined.value, refined.upper
    );
    Ok(())
}
