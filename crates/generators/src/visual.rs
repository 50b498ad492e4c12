//! Visual generator: screen-coordinate strategies from the vision service.

use std::sync::Arc;

use async_trait::async_trait;
use helix_core_types::{
    GeneratorType, Intent, LocatorExpr, PlatformContext, Provenance, Strategy, VisionService,
};
use tracing::debug;

use crate::errors::GeneratorError;
use crate::generator::Generator;

/// Coordinates are brittle compared to markup anchors.
const COORDINATE_DISCOUNT: f64 = 0.9;

pub struct VisualGenerator {
    vision: Option<Arc<dyn VisionService>>,
}

impl VisualGenerator {
    pub fn new(vision: Option<Arc<dyn VisionService>>) -> Self {
        Self { vision }
    }
}

#[async_trait]
impl Generator for VisualGenerator {
    async fn generate(
        &self,
        intent: &Intent,
        context: &PlatformContext,
    ) -> Result<Vec<Strategy>, GeneratorError> {
        let Some(vision) = &self.vision else {
            return Ok(Vec::new());
        };
        let screenshot = match &context.snapshot.screenshot {
            Some(bytes) => bytes.clone(),
            None => match context
                .page
                .screenshot()
                .await
                .map_err(|err| GeneratorError::collaborator(GeneratorType::Visual, err))?
            {
                Some(bytes) => bytes,
                None => {
                    debug!("no screenshot available for visual analysis");
                    return Ok(Vec::new());
                }
            },
        };

        let regions = vision
            .locate(&screenshot, &intent.raw_text)
            .await
            .map_err(|err| GeneratorError::collaborator(GeneratorType::Visual, err))?;

        Ok(regions
            .into_iter()
            .map(|(bounds, confidence)| {
                let (x, y) = bounds.center();
                Strategy::new(
                    LocatorExpr::visual(x, y),
                    GeneratorType::Visual,
                    confidence * COORDINATE_DISCOUNT,
                    GeneratorType::Visual.tier(),
                    Provenance::new("vision").with_detail(format!(
                        "{}x{}@{},{}",
                        bounds.width, bounds.height, bounds.x, bounds.y
                    )),
                )
            })
            .collect())
    }

    fn generator_type(&self) -> GeneratorType {
        GeneratorType::Visual
    }
}
