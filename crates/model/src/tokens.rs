//! Prompt token estimation for bucket acquisition.
//!
//! Buckets must be charged before the provider reports real usage, so the
//! estimate runs on the rendered prompts. The cl100k tokenizer is a close
//! enough proxy across providers for rate-limiting purposes.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

const FALLBACK_MAX_OUTPUT: u32 = 1024;

fn bpe() -> Option<&'static CoreBPE> {
    static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();

    BPE.get_or_init(|| match tiktoken_rs::cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            log::warn!("Failed to load tokenizer, falling back to byte estimate: {e}");
            None
        }
    })
    .as_ref()
}

/// Token count of a text, by tokenizer when available, by a bytes/4
/// heuristic otherwise.
pub fn estimate_tokens(text: &str) -> u64 {
    match bpe() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as u64,
        None => (text.len() as u64 / 4).max(1),
    }
}

/// Tokens to charge against a model's token bucket for one call: both
/// prompts plus the worst-case completion.
pub fn estimate_request_tokens(system_prompt: &str, user_prompt: &str, max_tokens: Option<u32>) -> u64 {
    estimate_tokens(system_prompt) + estimate_tokens(user_prompt) + u64::from(max_tokens.unwrap_or(FALLBACK_MAX_OUTPUT))
}
