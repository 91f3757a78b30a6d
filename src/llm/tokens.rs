//! Per-episode token accounting.
//!
//! An accumulator is scoped to the pipeline task running one episode;
//! concurrent episodes never mingle totals. Recording outside a tracking
//! scope is a silent no-op, and recording failures are never propagated
//! into the LLM call path.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::future::Future;

tokio::task_local! {
    static EPISODE_TOKENS: RefCell<Option<TokenTotals>>;
}

/// Cumulative token usage for one episode run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub calls: u32,
}

/// Run `fut` with an armed per-episode accumulator and return its totals.
///
/// The accumulator is armed on entry and drained unconditionally on exit,
/// whether the future succeeds or fails.
pub async fn with_episode_tracking<F, T>(fut: F) -> (T, TokenTotals)
where
    F: Future<Output = T>,
{
    EPISODE_TOKENS
        .scope(RefCell::new(Some(TokenTotals::default())), async {
            let out = fut.await;
            let totals = get_episode_token_totals();
            (out, totals)
        })
        .await
}

/// Re-arm the accumulator inside an existing tracking scope.
pub fn start_episode_token_tracking() {
    let _ = EPISODE_TOKENS.try_with(|cell| {
        *cell.borrow_mut() = Some(TokenTotals::default());
    });
}

/// Return the accumulated totals and disarm the accumulator.
/// Outside a tracking scope, returns zeroed totals.
pub fn get_episode_token_totals() -> TokenTotals {
    EPISODE_TOKENS
        .try_with(|cell| cell.borrow_mut().take().unwrap_or_default())
        .unwrap_or_default()
}

/// Record one LLM call's usage into the current episode's accumulator.
pub fn record_usage(input_tokens: u64, output_tokens: u64) {
    let _ = EPISODE_TOKENS.try_with(|cell| {
        if let Some(totals) = cell.borrow_mut().as_mut() {
            totals.input_tokens += input_tokens;
            totals.output_tokens += output_tokens;
            totals.calls += 1;
        }
    });
}
