//! Pipeline nodes used by the scraper graphs.

mod fetch;
mod generate_answer;
mod rag;

pub use fetch::FetchNode;
pub use generate_answer::GenerateAnswerNode;
pub use rag::{RagNode, chunk_text};

/// State key holding the user's question.
pub const PROMPT_KEY: &str = "user_prompt";
/// State key written by [`FetchNode`].
pub const DOC_KEY: &str = "doc";
/// State key written by [`RagNode`].
pub const CHUNKS_KEY: &str = "relevant_chunks";
/// State key written by [`GenerateAnswerNode`].
pub const ANSWER_KEY: &str = "answer";
