//! Priority- and token-budgeted conversation memory.
//!
//! A rolling window of messages bounded by a token budget. The system
//! prompt lives in a dedicated slot outside the window; the first user
//! message can be pinned. Eviction removes the lowest-priority, oldest
//! unpinned message until the window fits the budget again.

use crate::agent::types::{Message, Role};
use crate::config::MemoryConfig;
use crate::tokenizer::Tokenizer;
use std::sync::Arc;
use tracing::debug;

/// Priority levels controlling eviction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessagePriority {
    /// Removed first under memory pressure
    Low = 20,
    /// Default for ordinary conversation turns
    Medium = 50,
    /// Tool traffic and the first user message
    High = 80,
    /// Never a good eviction candidate
    Critical = 100,
}

struct MemoryEntry {
    id: u64,
    message: Message,
    priority: MessagePriority,
    token_count: usize,
}

/// Token-budgeted rolling window of conversation messages.
pub struct RollingMemory {
    tokenizer: Arc<Tokenizer>,
    model: String,
    max_tokens: usize,
    preserve_system_prompt: bool,
    preserve_first_user_message: bool,
    pressure_threshold: f64,
    system: Option<Message>,
    entries: Vec<MemoryEntry>,
    first_user_id: Option<u64>,
    next_id: u64,
    total_tokens: usize,
}

impl RollingMemory {
    /// Create a memory window counting tokens under `model`.
    pub fn new(tokenizer: Arc<Tokenizer>, model: impl Into<String>, config: &MemoryConfig) -> Self {
        RollingMemory {
            tokenizer,
            model: model.into(),
            max_tokens: config.max_tokens,
            preserve_system_prompt: config.preserve_system_prompt,
            preserve_first_user_message: config.preserve_first_user_message,
            pressure_threshold: config.summarization_threshold,
            system: None,
            entries: Vec::new(),
            first_user_id: None,
            next_id: 1,
            total_tokens: 0,
        }
    }

    /// Add a message with the default priority for its role: High for tool
    /// traffic and tool-calling assistant turns, Medium otherwise.
    pub fn add(&mut self, message: Message) {
        let priority = match message.role {
            Role::Tool => MessagePriority::High,
            Role::Assistant if message.has_tool_calls() => MessagePriority::High,
            _ => MessagePriority::Medium,
        };
        self.add_with_priority(message, priority);
    }

    /// Add a message with an explicit priority. System messages replace the
    /// system slot; the first user message is pinned at High priority.
    pub fn add_with_priority(&mut self, message: Message, priority: MessagePriority) {
        if message.role == Role::System {
            self.system = Some(message);
            return;
        }

        let mut priority = priority;
        let id = self.next_id;
        self.next_id += 1;

        if message.role == Role::User && self.first_user_id.is_none() {
            self.first_user_id = Some(id);
            priority = MessagePriority::High;
        }

        let token_count = self.tokenizer.count_message(&message, &self.model);
        self.total_tokens += token_count;
        self.entries.push(MemoryEntry {
            id,
            message,
            priority,
            token_count,
        });

        self.evict_to_budget();

        if self.max_tokens > 0 {
            let usage = self.total_tokens as f64 / self.max_tokens as f64;
            if usage >= self.pressure_threshold {
                debug!(
                    "Memory window at {:.0}% of its {}-token budget",
                    usage * 100.0,
                    self.max_tokens
                );
            }
        }
    }

    fn is_preserved(&self, entry: &MemoryEntry) -> bool {
        self.preserve_first_user_message && Some(entry.id) == self.first_user_id
    }

    fn evict_to_budget(&mut self) {
        while self.total_tokens > self.max_tokens {
            // Lowest priority first, oldest within a priority level.
            let victim = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| !self.is_preserved(e))
                .min_by_key(|(_, e)| (e.priority, e.id))
                .map(|(i, _)| i);

            match victim {
                Some(index) => {
                    let removed = self.entries.remove(index);
                    self.total_tokens -= removed.token_count;
                    debug!(
                        "Evicted message id={} priority={:?} ({} tokens)",
                        removed.id, removed.priority, removed.token_count
                    );
                }
                None => break,
            }
        }
    }

    /// All messages in chronological order, system slot first.
    pub fn get(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.entries.len() + 1);
        if let Some(ref system) = self.system {
            messages.push(system.clone());
        }
        messages.extend(self.entries.iter().map(|e| e.message.clone()));
        messages
    }

    /// Messages with priority at or above `min_priority`, system slot
    /// included when present.
    pub fn get_prioritized(&self, min_priority: MessagePriority) -> Vec<Message> {
        let mut messages = Vec::new();
        if let Some(ref system) = self.system {
            messages.push(system.clone());
        }
        messages.extend(
            self.entries
                .iter()
                .filter(|e| e.priority >= min_priority)
                .map(|e| e.message.clone()),
        );
        messages
    }

    /// The last assistant message in the window, if any.
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.entries
            .iter()
            .rev()
            .map(|e| &e.message)
            .find(|m| m.role == Role::Assistant)
    }

    /// Contents of prior assistant messages, oldest first.
    pub fn assistant_contents(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.message.role == Role::Assistant)
            .map(|e| e.message.content.as_str())
            .collect()
    }

    /// Clear the window, keeping only the system slot. Resets the id counter.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.first_user_id = None;
        self.next_id = 1;
        self.total_tokens = 0;
        if !self.preserve_system_prompt {
            self.system = None;
        }
    }

    /// Replay a message list through `add`, replacing the current contents.
    pub fn load(&mut self, messages: Vec<Message>) {
        self.clear();
        for message in messages {
            self.add(message);
        }
    }

    /// Current cached token total of the rolling window.
    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// Number of messages in the rolling window (system slot excluded).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the rolling window is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The pinned system message, if any.
    pub fn system_message(&self) -> Option<&Message> {
        self.system.as_ref()
    }
}
