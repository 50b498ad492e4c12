//! Generator capability contract and the registry of the nine variants.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use helix_core_types::{
    GeneratorType, Intent, LanguageUnderstanding, PerformanceTier, PlatformContext, Strategy,
    VisionService,
};

use crate::errors::GeneratorError;
use crate::{
    AccessibilityGenerator, BehavioralGenerator, ContextualGenerator, MutationGenerator,
    SemanticGenerator, StateGenerator, StructuralGenerator, TimingGenerator, VisualGenerator,
};

/// Strategy generator trait
///
/// Generators are stateless: the only side effects allowed are calls into
/// the collaborators they were built with.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Propose candidate strategies for the intent
    async fn generate(
        &self,
        intent: &Intent,
        context: &PlatformContext,
    ) -> Result<Vec<Strategy>, GeneratorError>;

    /// Get generator type
    fn generator_type(&self) -> GeneratorType;

    /// Get generator name
    fn name(&self) -> &'static str {
        self.generator_type().name()
    }
}

/// External services handed to the generators that need them.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub language: Option<Arc<dyn LanguageUnderstanding>>,
    pub vision: Option<Arc<dyn VisionService>>,
}

impl Collaborators {
    pub fn with_language(mut self, language: Arc<dyn LanguageUnderstanding>) -> Self {
        self.language = Some(language);
        self
    }

    pub fn with_vision(mut self, vision: Arc<dyn VisionService>) -> Self {
        self.vision = Some(vision);
        self
    }
}

/// One generator per variant, keyed by type.
#[derive(Clone)]
pub struct GeneratorRegistry {
    generators: HashMap<GeneratorType, Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    /// Registry holding the built-in implementation of every variant.
    pub fn standard(collaborators: &Collaborators) -> Self {
        let generators = GeneratorType::ALL
            .into_iter()
            .map(|generator_type| (generator_type, build(generator_type, collaborators)))
            .collect();
        Self { generators }
    }

    /// Replace the implementation of one variant.
    pub fn with_override(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generators.insert(generator.generator_type(), generator);
        self
    }

    pub fn get(&self, generator_type: GeneratorType) -> Option<Arc<dyn Generator>> {
        self.generators.get(&generator_type).cloned()
    }

    /// Generators scheduled in `tier`, in stable variant order.
    pub fn for_tier(&self, tier: PerformanceTier) -> Vec<Arc<dyn Generator>> {
        GeneratorType::in_tier(tier)
            .into_iter()
            .filter_map(|generator_type| self.get(generator_type))
            .collect()
    }
}

fn build(generator_type: GeneratorType, collaborators: &Collaborators) -> Arc<dyn Generator> {
    match generator_type {
        GeneratorType::Semantic => Arc::new(SemanticGenerator::new(collaborators.language.clone())),
        GeneratorType::Contextual => Arc::new(ContextualGenerator),
        GeneratorType::Visual => Arc::new(VisualGenerator::new(collaborators.vision.clone())),
        GeneratorType::Behavioral => Arc::new(BehavioralGenerator),
        GeneratorType::Structural => Arc::new(StructuralGenerator),
        GeneratorType::Accessibility => Arc::new(AccessibilityGenerator),
        GeneratorType::Mutation => Arc::new(MutationGenerator),
        GeneratorType::Timing => Arc::new(TimingGenerator),
        GeneratorType::State => Arc::new(StateGenerator),
    }
}
