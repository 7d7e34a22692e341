use std::sync::Arc;

use conduit_common::{Dependencies, SourceCode};
use tracing::debug;

use super::client::{GenerationRequest, TextGenerator, parse_structured};
use crate::errors::CollaboratorError;

const SYSTEM_PROMPT: &str = r#"You are an expert dependency extraction system for code analysis.

Your task is to analyze source code and extract:
1. imports: All import/include statements found in the code
2. external_libraries: Third-party libraries/packages being used
3. standard_libraries: Built-in/standard library modules being used
4. documentation_urls: Relevant documentation URLs for the libraries

Language-specific patterns:
- Python: 'import', 'from...import', pip packages, standard library (os, sys, json, etc.)
- JavaScript: 'import', 'require()', npm packages, built-ins (fs, path, http, etc.)
- TypeScript: Same as JavaScript + type imports, @types packages

For documentation_urls, map each library to its official documentation:
- Python: https://docs.python.org/ or PyPI pages
- JavaScript/Node.js: https://nodejs.org/docs/ or npm registry
- TypeScript: https://www.typescriptlang.org/docs/

Respond with a single JSON object with the keys imports, external_libraries,
standard_libraries (arrays of strings) and documentation_urls (object of
library name to URL). Only include dependencies that are actually present."#;

/// Asks the collaborator for the imports and libraries a source file uses.
#[derive(Clone)]
pub struct DependencyExtractionAgent {
    generator: Arc<dyn TextGenerator>,
}

impl DependencyExtractionAgent {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    fn build_prompt(source: &SourceCode) -> String {
        let language = source.language.as_str();
        format!(
            "Language: {language}\nFilename: {}\n\nSource Code:\n```{language}\n{}\n```\n\nAnalyze this code and extract all dependencies.",
            source.display_name(),
            source.content
        )
    }

    pub async fn extract(&self, source: &SourceCode) -> Result<Dependencies, CollaboratorError> {
        let request =
            GenerationRequest::new(Self::build_prompt(source)).with_system_prompt(SYSTEM_PROMPT);
        let reply = self.generator.generate(request).await?;
        let dependencies: Dependencies = parse_structured("Dependencies", &reply)?;

        debug!(
            file = source.display_name(),
            imports = dependencies.imports.len(),
            external = dependencies.external_libraries.len(),
            "Dependencies extracted"
        );
        Ok(dependencies)
    }
}
