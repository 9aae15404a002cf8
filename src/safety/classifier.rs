use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Second-stage classifier. Returns the raw verdict text; the reviewer
/// normalizes it.
#[async_trait]
pub trait SafetyClassifier: Send + Sync {
    async fn classify(&self, instruction: &str, text: &str) -> Result<String, LlmError>;
}

/// Classifier backed by a chat model.
pub struct LlmSafetyClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl LlmSafetyClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl SafetyClassifier for LlmSafetyClassifier {
    async fn classify(&self, instruction: &str, text: &str) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(instruction),
            ChatMessage::user(text),
        ])
        .with_temperature(0.0)
        .with_max_tokens(16);

        let response = self.llm.complete(request).await?;
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubLlm;

    #[tokio::test]
    async fn test_llm_classifier_returns_reply() {
        let llm = Arc::new(StubLlm::new("ALLOW"));
        let classifier = LlmSafetyClassifier::new(llm.clone());
        let verdict = classifier.classify("judge this", "rainbows").await.unwrap();
        assert_eq!(verdict, "ALLOW");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_llm_classifier_propagates_errors() {
        let classifier = LlmSafetyClassifier::new(Arc::new(StubLlm::failing("stub")));
        assert!(classifier.classify("judge this", "rainbows").await.is_err());
    }
}
