//! Token counting for memory budgeting.
//!
//! Uses the model-specific tiktoken encoder when one exists, falling back to
//! the generic `cl100k_base` encoder and finally to a 4-chars-per-token
//! estimate. Models without an encoder are memoised so the lookup failure
//! happens only once.

use crate::agent::types::Message;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tiktoken_rs::{cl100k_base, get_bpe_from_model, CoreBPE};
use tracing::debug;

/// Fixed per-request overhead in tokens.
const BASE_OVERHEAD: usize = 3;
/// Fixed per-message overhead in tokens.
const MESSAGE_OVERHEAD: usize = 4;

fn generic_encoder() -> Option<&'static CoreBPE> {
    static GENERIC: OnceLock<Option<CoreBPE>> = OnceLock::new();
    GENERIC.get_or_init(|| cl100k_base().ok()).as_ref()
}

/// Model-aware token counter.
pub struct Tokenizer {
    encoders: Mutex<HashMap<String, Arc<CoreBPE>>>,
    unsupported: Mutex<HashSet<String>>,
}

impl Tokenizer {
    /// Create a new tokenizer with empty encoder caches.
    pub fn new() -> Self {
        Tokenizer {
            encoders: Mutex::new(HashMap::new()),
            unsupported: Mutex::new(HashSet::new()),
        }
    }

    /// Count the tokens of `text` under `model`.
    pub fn count(&self, text: &str, model: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        if let Some(bpe) = self.encoder_for(model) {
            return bpe.encode_with_special_tokens(text).len();
        }

        match generic_encoder() {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => estimate_tokens(text),
        }
    }

    /// Count the tokens of a message list under `model`, including the
    /// per-request and per-message serialization overheads.
    pub fn count_messages(&self, messages: &[Message], model: &str) -> usize {
        let mut total = BASE_OVERHEAD;
        for message in messages {
            total += self.count_message(message, model);
        }
        total
    }

    /// Count the tokens of a single message, including its overhead.
    pub fn count_message(&self, message: &Message, model: &str) -> usize {
        let mut total = MESSAGE_OVERHEAD;
        total += self.count(message.role.as_str(), model);
        total += self.count(&message.content, model);
        if let Some(ref name) = message.name {
            total += self.count(name, model);
        }
        if let Some(ref id) = message.tool_call_id {
            total += self.count(id, model);
        }
        total
    }

    fn encoder_for(&self, model: &str) -> Option<Arc<CoreBPE>> {
        if self.unsupported.lock().contains(model) {
            return None;
        }
        if let Some(bpe) = self.encoders.lock().get(model) {
            return Some(bpe.clone());
        }
        match get_bpe_from_model(model) {
            Ok(bpe) => {
                let bpe = Arc::new(bpe);
                self.encoders.lock().insert(model.to_string(), bpe.clone());
                Some(bpe)
            }
            Err(_) => {
                debug!("No tiktoken encoder for model {}, using generic encoder", model);
                self.unsupported.lock().insert(model.to_string());
                None
            }
        }
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Rough estimate used when no encoder is available: 4 chars per token.
fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
