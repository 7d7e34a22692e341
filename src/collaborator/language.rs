use std::sync::Arc;

use conduit_common::LanguageDetection;
use tracing::debug;

use super::client::{GenerationRequest, TextGenerator, parse_structured};
use crate::errors::CollaboratorError;

const SYSTEM_PROMPT: &str = r#"You are an expert programming language detection system.

Your task is to analyze source code and determine:
1. The programming language (python, javascript, or typescript)
2. A confidence score from 0.0 to 1.0

Consider these indicators:
- Python: indentation-based syntax, keywords like 'def', 'import', 'class', 'if __name__'
- JavaScript: curly braces, 'function', 'var/let/const', 'console.log'
- TypeScript: like JavaScript but with type annotations, interfaces, 'export type'

Respond with a single JSON object and nothing else:
{"detected_language": "python" | "javascript" | "typescript", "confidence": <0.0-1.0>, "features_detected": [<strings>]}
Be conservative with confidence - only give high confidence (>0.8) when very certain."#;

/// Asks the collaborator which language a piece of source code is written in.
#[derive(Clone)]
pub struct LanguageDetectionAgent {
    generator: Arc<dyn TextGenerator>,
}

impl LanguageDetectionAgent {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    pub async fn detect(&self, source_code: &str) -> Result<LanguageDetection, CollaboratorError> {
        let request = GenerationRequest::new(format!(
            "Analyze this source code and detect the programming language:\n\n```\n{source_code}\n```"
        ))
        .with_system_prompt(SYSTEM_PROMPT);

        let reply = self.generator.generate(request).await?;
        let detection: LanguageDetection = parse_structured("LanguageDetection", &reply)?;
        detection
            .validate()
            .map_err(|e| CollaboratorError::SchemaMismatch {
                schema: "LanguageDetection".to_string(),
                message: e.to_string(),
            })?;

        debug!(
            language = %detection.detected_language,
            confidence = detection.confidence,
            model = self.generator.model_name(),
            "Language detected"
        );
        Ok(detection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::MockGenerator;
    use conduit_common::LanguageType;

    fn agent_with(response: &str) -> (LanguageDetectionAgent, Arc<MockGenerator>) {
        let mock = Arc::new(MockGenerator::new());
        mock.add_response(response);
        (LanguageDetectionAgent::new(mock.clone()), mock)
    }

    #[test]
    fn test_system_prompt_lists_languages() {
        let (agent, _) = agent_with("");
        let prompt = agent.system_prompt();
        assert!(prompt.contains("python"));
        assert!(prompt.contains("javascript"));
        assert!(prompt.contains("typescript"));
        assert!(prompt.contains("confidence"));
    }

    #[tokio::test]
    async fn test_detect_python() {
        let (agent, mock) = agent_with(
            r#"Sure! {"detected_language": "python", "confidence": 0.95, "features_detected": ["def", "import"]}"#,
        );
        let detection = agent
            .detect("def hello():\n    print('Hello, World!')\n\nimport os")
            .await
            .unwrap();

        assert_eq!(detection.detected_language, LanguageType::Python);
        assert_eq!(detection.confidence, 0.95);

        let sent = &mock.requests()[0];
        assert!(sent.prompt.contains("def hello()"));
        assert_eq!(sent.system_prompt.as_deref(), Some(SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_schema_mismatch() {
        let (agent, _) =
            agent_with(r#"{"detected_language": "typescript", "confidence": 1.7}"#);
        let err = agent.detect("interface A {}").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::SchemaMismatch { .. }));
    }

    #[tokio::test]
    async fn test_unknown_language_is_schema_mismatch() {
        let (agent, _) = agent_with(r#"{"detected_language": "rust", "confidence": 0.9}"#);
        let err = agent.detect("fn main() {}").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::SchemaMismatch { .. }));
    }

    #[tokio::test]
    async fn test_collaborator_error_propagates() {
        let mock = Arc::new(MockGenerator::new());
        mock.add_error(CollaboratorError::Api {
            status: 429,
            message: "rate limited".into(),
        });
        let agent = LanguageDetectionAgent::new(mock);
        let err = agent.detect("x = 1").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Api { status: 429, .. }));
    }
}
