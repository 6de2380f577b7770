use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::assembly::prompts::{rewrite_prompt, REWRITE_CANDIDATE_DELIMITER, REWRITE_SYSTEM};
use crate::llm_client::prompts::PLAIN_TEXT_ONLY;
use crate::llm_client::LanguageModel;

/// Rewrites free-text project requirements into resume-style search terms.
///
/// Never fails: when the model errors, times out or answers with nothing
/// usable, the raw query is returned and `Rewrite::rewritten` is false.
pub struct QueryRewriter {
    llm: Arc<dyn LanguageModel>,
    timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub query: String,
    pub rewritten: bool,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub async fn rewrite(&self, raw_query: &str) -> Rewrite {
        let fallback = || Rewrite {
            query: raw_query.to_string(),
            rewritten: false,
        };

        let prompt = format!("{}\n\n{PLAIN_TEXT_ONLY}", rewrite_prompt(raw_query));
        let answer =
            match tokio::time::timeout(self.timeout, self.llm.complete(&prompt, REWRITE_SYSTEM))
                .await
            {
                Ok(Ok(answer)) => answer,
                Ok(Err(e)) => {
                    warn!("Query rewrite failed, using raw query: {e}");
                    return fallback();
                }
                Err(_) => {
                    warn!("Query rewrite timed out after {:?}, using raw query", self.timeout);
                    return fallback();
                }
            };

        match first_candidate(&answer) {
            Some(query) => Rewrite {
                query: query.to_string(),
                rewritten: true,
            },
            None => fallback(),
        }
    }
}

/// First rewrite in a model answer: text before the first `**` delimiter,
/// then the first non-empty line of that.
pub fn first_candidate(answer: &str) -> Option<&str> {
    answer
        .split(REWRITE_CANDIDATE_DELIMITER)
        .next()
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
}
