//! Semantic generator: natural-language interpretation of the intent.

use std::sync::Arc;

use async_trait::async_trait;
use helix_core_types::{
    GeneratorType, Intent, LanguageUnderstanding, LocatorExpr, PlatformContext, Provenance,
    Strategy,
};
use tracing::debug;

use crate::errors::GeneratorError;
use crate::generator::Generator;
use crate::matching::{
    effectively_hidden, element_match_score, element_strategy, kind_matches, scaled, MIN_MATCH,
};

/// Asks the language collaborator for locator patterns and keeps the ones
/// that resolve in the snapshot. Without a collaborator it falls back to the
/// built-in concept lexicon.
pub struct SemanticGenerator {
    language: Option<Arc<dyn LanguageUnderstanding>>,
}

impl SemanticGenerator {
    pub fn new(language: Option<Arc<dyn LanguageUnderstanding>>) -> Self {
        Self { language }
    }

    async fn interpret(
        &self,
        language: &dyn LanguageUnderstanding,
        intent: &Intent,
        context: &PlatformContext,
    ) -> Result<Vec<Strategy>, GeneratorError> {
        let hint = intent.platform_hint.as_ref().unwrap_or(&context.platform_id);
        let proposals = language
            .infer(&intent.raw_text, Some(hint))
            .await
            .map_err(|err| GeneratorError::collaborator(GeneratorType::Semantic, err))?;

        let snapshot = &context.snapshot;
        let mut strategies = Vec::new();
        for (pattern, confidence) in proposals {
            if LocatorExpr::parse(&pattern).is_err() {
                debug!(pattern = %pattern, "language proposal is not a locator");
                continue;
            }
            let hits = snapshot.query(&pattern).unwrap_or_default();
            if hits.is_empty() {
                debug!(pattern = %pattern, "language proposal absent from snapshot");
                continue;
            }
            let mut provenance = Provenance::new("language_model").with_detail(pattern.clone());
            if let [only] = hits.as_slice() {
                provenance = provenance.with_overlap(Provenance::node_key(&snapshot.id, *only));
            }
            strategies.push(Strategy::new(
                pattern,
                GeneratorType::Semantic,
                confidence,
                GeneratorType::Semantic.tier(),
                provenance,
            ));
        }
        Ok(strategies)
    }

    fn lexicon(&self, intent: &Intent, context: &PlatformContext) -> Vec<Strategy> {
        let snapshot = &context.snapshot;
        let kind = intent.element_kind();
        snapshot
            .body_elements()
            .filter(|node| node.is_interactive() && kind_matches(node, kind))
            .filter(|node| !effectively_hidden(snapshot, node))
            .filter_map(|node| {
                let score = element_match_score(node, intent);
                (score >= MIN_MATCH).then(|| {
                    element_strategy(
                        GeneratorType::Semantic,
                        snapshot,
                        node,
                        scaled(0.5, 0.35, score),
                        "lexicon",
                    )
                })
            })
            .collect()
    }
}

#[async_trait]
impl Generator for SemanticGenerator {
    async fn generate(
        &self,
        intent: &Intent,
        context: &PlatformContext,
    ) -> Result<Vec<Strategy>, GeneratorError> {
        if intent.is_empty() {
            return Ok(Vec::new());
        }
        match &self.language {
            Some(language) => self.interpret(language.as_ref(), intent, context).await,
            None => Ok(self.lexicon(intent, context)),
        }
    }

    fn generator_type(&self) -> GeneratorType {
        GeneratorType::Semantic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;
    use helix_core_types::{CollaboratorError, PlatformId};

    struct FixedLanguage(Result<Vec<(String, f64)>, CollaboratorError>);

    #[async_trait]
    impl LanguageUnderstanding for FixedLanguage {
        async fn infer(
            &self,
            _intent_text: &str,
            _platform_hint: Option<&PlatformId>,
        ) -> Result<Vec<(String, f64)>, CollaboratorError> {
            self.0.clone()
        }
    }

    const PAGE: &str = r#"<form><button id="saveBtn">Save</button><button>Cancel</button></form>"#;

    #[tokio::test]
    async fn keeps_only_proposals_present_in_the_snapshot() {
        let language = FixedLanguage(Ok(vec![
            ("#saveBtn".to_string(), 0.8),
            ("#nowhere".to_string(), 0.9),
            ("not a [selector".to_string(), 0.9),
        ]));
        let generator = SemanticGenerator::new(Some(Arc::new(language)));
        let intent = Intent::new("save button", "form", None);
        let strategies = generator.generate(&intent, &context(PAGE)).await.unwrap();
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].locator, "#saveBtn");
        assert_eq!(strategies[0].raw_confidence, 0.8);
    }

    #[tokio::test]
    async fn collaborator_failures_become_generator_errors() {
        let language = FixedLanguage(Err(CollaboratorError::Transport("reset".into())));
        let generator = SemanticGenerator::new(Some(Arc::new(language)));
        let intent = Intent::new("save button", "form", None);
        let err = generator
            .generate(&intent, &context(PAGE))
            .await
            .unwrap_err();
        assert_eq!(err.generator(), GeneratorType::Semantic);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn lexicon_fallback_matches_synonyms() {
        let generator = SemanticGenerator::new(None);
        let intent = Intent::new("submit button", "form", None);
        let strategies = generator.generate(&intent, &context(PAGE)).await.unwrap();
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].locator, "#saveBtn");
        assert_eq!(strategies[0].provenance.source, "lexicon");
    }
}
