//! Minimal probe example: context window and max output for one model.
//!
//! Prints both estimates with their confidence and trial counts.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run --example basic_probe -- openai/gpt-4o-mini
//! ```

use ceiling_rs::prelude::*;

#[tokio::main]
async fn main() -> Result<(), ProbeError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    // 1. Create the OpenRouter client.
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| ProbeError::Config("Set OPENROUTER_KEY to your OpenRouter API key".into()))?;
    let client = OpenRouterClient::new(api_key)?;
    let model = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openai/gpt-4o-mini".to_string());

    // 2. Keep the budget small; each trial is a real (billed) request.
    let config = ProbeConfig::default().with_search(SearchConfig::default().with_max_trials(20));

    // 3. Run both probes.
    let context = ContextWindowProbe::new(&client, config.clone())
        .with_event_handler(&LoggingHandler)
        .probe(&model)
        .await?;
    let output = MaxOutputTokensProbe::new(&client, config)
        .with_event_handler(&LoggingHandler)
        .probe(&model)
        .await?;

    // 4. Print results.
    println!("{context}");
    println!("{output}");
    Ok(())
}
