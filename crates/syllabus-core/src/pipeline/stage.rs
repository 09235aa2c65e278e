use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::generator::TextGenerator;
use super::{GenerationContext, GenerationRequest, prompts};

pub const STRATEGIST: &str = "strategist";
pub const SCOUT: &str = "scout";
pub const ARCHITECT: &str = "architect";

/// One step of the generation chain.
///
/// A stage sees the original request and the outputs of every stage that ran
/// before it, and returns its own raw text output.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    async fn produce(
        &self,
        request: &GenerationRequest,
        context: &GenerationContext,
    ) -> Result<String>;
}

type RenderFn = fn(&GenerationRequest, &GenerationContext) -> String;

/// A stage that renders a prompt and hands it to a [`TextGenerator`].
pub struct PromptStage {
    name: &'static str,
    render: RenderFn,
    generator: Arc<dyn TextGenerator>,
}

impl PromptStage {
    pub fn new(name: &'static str, render: RenderFn, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            name,
            render,
            generator,
        }
    }

    pub fn strategist(generator: Arc<dyn TextGenerator>) -> Self {
        Self::new(STRATEGIST, prompts::strategist, generator)
    }

    pub fn scout(generator: Arc<dyn TextGenerator>) -> Self {
        Self::new(SCOUT, prompts::scout, generator)
    }

    pub fn architect(generator: Arc<dyn TextGenerator>) -> Self {
        Self::new(ARCHITECT, prompts::architect, generator)
    }

    pub fn render(&self, request: &GenerationRequest, context: &GenerationContext) -> String {
        (self.render)(request, context)
    }
}

impl std::fmt::Debug for PromptStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptStage")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for PromptStage {
    fn name(&self) -> &str {
        self.name
    }

    async fn produce(
        &self,
        request: &GenerationRequest,
        context: &GenerationContext,
    ) -> Result<String> {
        let prompt = self.render(request, context);
        self.generator.generate(&prompt).await
    }
}

// Stages are stored as `Box<dyn Stage>`.
const _: () = {
    fn _assert_object_safe(_: &dyn Stage) {}
};

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records every prompt it is given and answers with a fixed reply.
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("reply".to_string())
        }
    }

    #[tokio::test]
    async fn prompt_stage_sends_rendered_prompt() {
        let generator = Arc::new(RecordingGenerator {
            prompts: Mutex::new(Vec::new()),
        });
        let stage = PromptStage::scout(generator.clone());
        let request = GenerationRequest::new("Learn Go", 2).unwrap();
        let mut ctx = GenerationContext::default();
        ctx.push(STRATEGIST, "plan outline".to_string());

        let out = stage.produce(&request, &ctx).await.unwrap();
        assert_eq!(out, "reply");
        assert_eq!(stage.name(), "scout");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("plan outline"));
        assert!(prompts[0].contains("Learn Go"));
    }
}
