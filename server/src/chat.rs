//! Interactive chat loop.

use faqbot_matcher::MatchEngine;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::reply_text;

/// Inputs that end the conversation (compared case-insensitively).
pub const EXIT_WORDS: [&str; 3] = ["exit", "quit", "q"];

/// Prompt for questions on `input` and write answers to `output` until an
/// exit word or end of input.
///
/// A failed question is reported and the loop keeps going.
pub async fn run_chat<R, W>(
    engine: &MatchEngine,
    verbose: bool,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(b"\n==== FAQ Chatbot ====\n").await?;
    output
        .write_all(b"Ask me any question! Type 'exit', 'quit', or 'q' to end the conversation.\n")
        .await?;

    let mut lines = input.lines();
    loop {
        output.write_all(b"\nYou: ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let query = line.trim();
        if EXIT_WORDS.iter().any(|word| query.eq_ignore_ascii_case(word)) {
            output
                .write_all(b"\nGoodbye! Thanks for chatting.\n")
                .await?;
            break;
        }
        if query.is_empty() {
            continue;
        }

        match engine.answer(query).await {
            Ok(result) => {
                if verbose {
                    let debug = format!(
                        "[DEBUG] Matched: '{}'\n[DEBUG] Similarity score: {:.4}\n",
                        result.matched_question, result.similarity
                    );
                    output.write_all(debug.as_bytes()).await?;
                }
                let reply = format!("\nBot: {}\n", reply_text(&result));
                output.write_all(reply.as_bytes()).await?;
            }
            Err(err) => {
                warn!("Failed to answer question: {err}");
                let reply = format!("\nBot: Sorry, I couldn't answer that ({err}).\n");
                output.write_all(reply.as_bytes()).await?;
            }
        }
    }

    output.flush().await
}
