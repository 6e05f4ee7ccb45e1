//! Synchronous text generation

use bon::bon;
use serde::{Deserialize, Serialize};

use crate::client::{ApiPath, NpdClient};
use crate::error::{Error, Result};
use crate::tasks::{require_id, DEFAULT_MODEL_TAG};

/// One generated line with the model's score for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub score: f64,
}

/// Candidates in the order the service produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// Highest-scoring candidate; the first one wins ties
    pub fn best(&self) -> Option<&Candidate> {
        self.candidates
            .iter()
            .fold(None, |best: Option<&Candidate>, c| match best {
                Some(b) if b.score >= c.score => Some(b),
                _ => Some(c),
            })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model_tag: &'a str,
    persona: &'a str,
    emotion: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a [String]>,
    num_candidates: u32,
    seed: i64,
}

#[bon]
impl NpdClient {
    /// Generate candidate lines for a persona in a given emotional state
    ///
    /// `context` carries preceding dialogue lines. No task is created; the
    /// candidates come back in the response.
    #[builder]
    pub async fn generate(
        &self,
        #[builder(into)] persona: String,
        #[builder(into)] emotion: String,
        context: Option<Vec<String>>,
        #[builder(default = 3)] num_candidates: u32,
        #[builder(default = 123)] seed: i64,
        #[builder(into, default = DEFAULT_MODEL_TAG.to_string())] model_tag: String,
    ) -> Result<GenerateResponse> {
        require_id("persona", &persona)?;
        require_id("emotion", &emotion)?;
        if num_candidates == 0 {
            return Err(Error::Validation(
                "num_candidates must be at least 1".to_string(),
            ));
        }

        let request = GenerateRequest {
            model_tag: &model_tag,
            persona: &persona,
            emotion: &emotion,
            context: context.as_deref(),
            num_candidates,
            seed,
        };

        self.create(&ApiPath::new(["generate"]), &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(text: &str, score: f64) -> Candidate {
        Candidate {
            text: text.to_string(),
            score,
        }
    }

    #[test]
    fn test_best_candidate() {
        let response = GenerateResponse {
            candidates: vec![candidate("a", 0.8), candidate("b", 0.95), candidate("c", 0.95)],
        };
        assert_eq!(response.best().unwrap().text, "b");
        assert!(GenerateResponse { candidates: vec![] }.best().is_none());
    }
}
