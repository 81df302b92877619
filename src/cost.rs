/*!
 * Token and cost estimation.
 *
 * Converts character counts or reported token usage into a cost estimate using
 * a fixed per-million-token price list. The estimate is advisory: it is shown
 * to the caller, who decides whether to proceed.
 */

use std::time::{Duration, Instant};

use crate::app_config::BackendKind;
use crate::errors::ConfigError;

/// Characters per block in the pre-run token heuristic
const HEURISTIC_CHARS_PER_BLOCK: f64 = 2000.0;

/// Prompt tokens per block in the pre-run token heuristic
const HEURISTIC_TOKENS_PER_BLOCK: f64 = 700.0;

/// Expected completion size relative to the prompt
const HEURISTIC_COMPLETION_RATIO: f64 = 0.9;

/// Hosted model prices in USD per million tokens: (model, input, output)
const HOSTED_PRICES: &[(&str, f64, f64)] = &[
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4-turbo", 10.00, 30.00),
    ("gpt-4", 30.00, 60.00),
    ("gpt-3.5-turbo", 0.50, 1.50),
];

/// Token counts reported by a backend for one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u64,
    /// Tokens produced by the completion
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Create a usage record
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self { prompt_tokens, completion_tokens }
    }

    /// Prompt plus completion tokens
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Price list for one model, in USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    /// Local inference is not billed
    pub const FREE: Pricing = Pricing {
        input_per_million: 0.0,
        output_per_million: 0.0,
    };

    /// Whether running with this price list costs nothing
    pub fn is_free(&self) -> bool {
        self.input_per_million == 0.0 && self.output_per_million == 0.0
    }
}

/// Look up the price list for a backend model
///
/// Hosted models match exactly or through a dated suffix such as
/// `gpt-4o-2024-08-06`; the longest matching family wins. Unknown hosted
/// models fail instead of silently pricing at zero.
pub fn pricing_for(kind: &BackendKind, model: &str) -> Result<Pricing, ConfigError> {
    match kind {
        BackendKind::Ollama => Ok(Pricing::FREE),
        BackendKind::OpenAI => {
            let model = model.trim().to_lowercase();
            HOSTED_PRICES
                .iter()
                .filter(|(name, _, _)| model == *name || is_dated_variant(&model, name))
                .max_by_key(|(name, _, _)| name.len())
                .map(|(_, input, output)| Pricing {
                    input_per_million: *input,
                    output_per_million: *output,
                })
                .ok_or_else(|| ConfigError::UnsupportedModel(model.clone()))
        }
    }
}

/// Hosted model families with a known price list
pub fn priced_models() -> impl Iterator<Item = &'static str> {
    HOSTED_PRICES.iter().map(|(name, _, _)| *name)
}

// "gpt-4o-2024-08-06" is a dated variant of "gpt-4o", "gpt-4o-mini" is not
fn is_dated_variant(model: &str, family: &str) -> bool {
    model
        .strip_prefix(family)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|suffix| suffix.starts_with(|c: char| c.is_ascii_digit()))
}

/// A derived cost estimate; never persisted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub pricing: Pricing,
}

impl CostEstimate {
    /// One-line human-readable rendering
    pub fn summary(&self) -> String {
        format!(
            "~{} prompt + ~{} completion tokens, estimated cost ${:.4} (input ${:.4}, output ${:.4})",
            self.prompt_tokens, self.completion_tokens, self.total_cost, self.input_cost, self.output_cost
        )
    }
}

/// Price a token count
pub fn estimate(prompt_tokens: u64, completion_tokens: u64, pricing: Pricing) -> CostEstimate {
    let input_cost = prompt_tokens as f64 * pricing.input_per_million / 1_000_000.0;
    let output_cost = completion_tokens as f64 * pricing.output_per_million / 1_000_000.0;
    CostEstimate {
        prompt_tokens,
        completion_tokens,
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
        pricing,
    }
}

/// Heuristic token counts for a document of `char_count` characters
pub fn heuristic_tokens(char_count: usize) -> TokenUsage {
    let prompt = (char_count as f64 / HEURISTIC_CHARS_PER_BLOCK) * HEURISTIC_TOKENS_PER_BLOCK;
    let completion = prompt * HEURISTIC_COMPLETION_RATIO;
    TokenUsage::new(prompt.round() as u64, completion.round() as u64)
}

/// Estimate the cost of a run before any network call
pub fn estimate_pre_run(char_count: usize, pricing: Pricing) -> CostEstimate {
    let tokens = heuristic_tokens(char_count);
    estimate(tokens.prompt_tokens, tokens.completion_tokens, pricing)
}

/// Usage accumulated over a run
#[derive(Debug, Clone)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Chunks whose backend reported usage
    pub metered_chunks: usize,
    pub start_time: Instant,
    /// Time spent waiting on the backend
    pub api_duration: Duration,
    pub backend: String,
    pub model: String,
}

impl UsageTotals {
    /// Start tracking usage for a backend and model
    pub fn new(backend: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            metered_chunks: 0,
            start_time: Instant::now(),
            api_duration: Duration::ZERO,
            backend: backend.into(),
            model: model.into(),
        }
    }

    /// Record one chunk's reported usage and request time
    pub fn record(&mut self, usage: Option<TokenUsage>, elapsed: Duration) {
        self.api_duration += elapsed;
        if let Some(usage) = usage {
            self.prompt_tokens += usage.prompt_tokens;
            self.completion_tokens += usage.completion_tokens;
            self.metered_chunks += 1;
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Actual cost from the summed reported usage
    pub fn cost(&self, pricing: Pricing) -> CostEstimate {
        estimate(self.prompt_tokens, self.completion_tokens, pricing)
    }

    /// Tokens per minute of backend time, falling back to wall time
    pub fn tokens_per_minute(&self) -> f64 {
        let duration_minutes = if self.api_duration.as_secs_f64() > 0.0 {
            self.api_duration.as_secs_f64() / 60.0
        } else {
            self.start_time.elapsed().as_secs_f64() / 60.0
        };

        if duration_minutes > 0.0 {
            self.total_tokens() as f64 / duration_minutes
        } else {
            0.0
        }
    }

    /// Generate a summary of token usage
    pub fn summary(&self) -> String {
        let elapsed_minutes = self.start_time.elapsed().as_secs_f64() / 60.0;
        let api_minutes = self.api_duration.as_secs_f64() / 60.0;

        format!(
            "Token Usage Summary:\n\
             Backend: {}\n\
             Model: {}\n\
             Prompt tokens: {}\n\
             Completion tokens: {}\n\
             Total tokens: {}\n\
             Metered chunks: {}\n\
             Elapsed time: {:.2} minutes\n\
             API request time: {:.2} minutes\n\
             Tokens per minute: {:.2}",
            self.backend,
            self.model,
            self.prompt_tokens,
            self.completion_tokens,
            self.total_tokens(),
            self.metered_chunks,
            elapsed_minutes,
            api_minutes,
            self.tokens_per_minute()
        )
    }
}
