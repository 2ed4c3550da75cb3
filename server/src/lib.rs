//! Front-ends for the FAQ matcher.
//!
//! The match engine never words a fallback or touches the console. This
//! crate does both: [`http`] serves answers as JSON over HTTP and [`chat`]
//! runs an interactive prompt loop.

pub mod chat;
pub mod http;

use faqbot_matcher::{MatchAnswer, MatchResult};

/// Reply shown when no catalog entry is close enough.
pub const FALLBACK_ANSWER: &str = "I'm not sure. Can you rephrase your question?";

/// Text to show the user for a match result.
pub fn reply_text(result: &MatchResult) -> &str {
    match &result.answer {
        MatchAnswer::Answer(text) => text,
        MatchAnswer::LowConfidence => FALLBACK_ANSWER,
    }
}
