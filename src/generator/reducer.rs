//! Prompt reduction for conversations that exceed the context budget.

use tracing::debug;

use super::conversation::{ASSISTANT_CUE, Conversation};
use super::tokens::TokenCounter;

/// Shrinks an over-long conversation into a prompt under a token budget.
pub trait PromptReducer: Send + Sync {
    /// Builds a prompt ending with the assistant cue that counts fewer than
    /// `budget` tokens.
    fn reduce(&self, conversation: &Conversation, counter: &dyn TokenCounter, budget: usize)
    -> String;
}

/// Keeps the newest turns that fit and drops the oldest ones.
///
/// The final turn is always kept. When it alone exceeds the budget its
/// content is cut down to its newest tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecentTurnsReducer;

impl PromptReducer for RecentTurnsReducer {
    fn reduce(
        &self,
        conversation: &Conversation,
        counter: &dyn TokenCounter,
        budget: usize,
    ) -> String {
        let turns = conversation.turns();
        let Some(newest) = turns.last() else {
            return ASSISTANT_CUE.to_string();
        };

        let mut used = counter.count(ASSISTANT_CUE);
        let mut kept: Vec<String> = Vec::new();

        for turn in turns.iter().rev() {
            let line = turn.to_prompt_line();
            let tokens = counter.count(&line);
            if used + tokens >= budget {
                break;
            }
            used += tokens;
            kept.push(line);
        }

        if kept.is_empty() {
            let prefix = format!("{}: ", newest.role);
            // Trailing newline plus one to stay strictly under budget.
            let room = budget
                .saturating_sub(counter.count(ASSISTANT_CUE))
                .saturating_sub(counter.count(&prefix))
                .saturating_sub(2);
            let content = counter.truncate_tail(&newest.content, room);
            kept.push(format!("{prefix}{content}\n"));
        }

        debug!(
            total_turns = turns.len(),
            kept_turns = kept.len(),
            budget,
            "reduced conversation prompt"
        );

        let mut prompt: String = kept.into_iter().rev().collect();
        prompt.push_str(ASSISTANT_CUE);
        prompt
    }
}
