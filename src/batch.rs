use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use crate::{
    error::ServiceError,
    model::{BatchItemResult, ErrorPlaceholder, GenerationDefaults, GenerationRequest},
    service::Generate,
};

/// Runs requests one after another. A failing item becomes a placeholder
/// in its own slot and never aborts the rest of the batch.
pub struct BatchCoordinator<G> {
    generator: Arc<G>,
    defaults: GenerationDefaults,
}

impl<G: Generate> BatchCoordinator<G> {
    pub fn new(generator: Arc<G>, defaults: GenerationDefaults) -> Self {
        Self {
            generator,
            defaults,
        }
    }

    pub async fn generate_batch(&self, requests: Vec<GenerationRequest>) -> Vec<BatchItemResult> {
        self.run(requests.into_iter().map(Ok).collect()).await
    }

    /// Decodes each element on its own, so an item with the wrong shape
    /// only fails its own slot.
    pub async fn generate_json_batch(&self, items: Vec<Value>) -> Vec<BatchItemResult> {
        let requests = items
            .into_iter()
            .map(|item| {
                serde_json::from_value::<GenerationRequest>(item)
                    .map_err(|e| ServiceError::BadRequest(e.to_string()))
            })
            .collect();
        self.run(requests).await
    }

    async fn run(
        &self,
        requests: Vec<Result<GenerationRequest, ServiceError>>,
    ) -> Vec<BatchItemResult> {
        info!(count = requests.len(), "processing batch");
        let mut results = Vec::with_capacity(requests.len());

        for (index, request) in requests.into_iter().enumerate() {
            let outcome = match request.and_then(|r| r.resolve(&self.defaults)) {
                Ok(params) => self.generator.generate(params).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(result) => results.push(BatchItemResult::Generated(result)),
                Err(err) => {
                    error!(index, error = %err, "batch generation error");
                    results.push(BatchItemResult::Failed(ErrorPlaceholder::new(&err)));
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use proptest::prelude::*;

    use super::*;
    use crate::{
        fallback::FallbackGenerator,
        model::{BackendState, GenerationParams, GenerationResult},
        service::GenerationService,
    };

    /// Fails every prompt containing "boom".
    struct Picky;

    #[async_trait]
    impl Generate for Picky {
        async fn generate(
            &self,
            params: GenerationParams,
        ) -> Result<GenerationResult, ServiceError> {
            if params.prompt.contains("boom") {
                return Err(ServiceError::Inference("engine crashed".into()));
            }
            Ok(GenerationResult {
                text: params.prompt.to_uppercase(),
                tokens_used: 1,
                generation_time_ms: 0.0,
                model: "picky".into(),
            })
        }
    }

    fn unloaded_batch() -> BatchCoordinator<GenerationService> {
        let service = GenerationService::new(
            BackendState::Unloaded,
            FallbackGenerator::default(),
            "tiny-Q5_1",
            None,
        );
        BatchCoordinator::new(Arc::new(service), GenerationDefaults::batch())
    }

    #[tokio::test]
    async fn invalid_item_becomes_a_placeholder_in_place() {
        let results = unloaded_batch()
            .generate_batch(vec![
                GenerationRequest::new("first"),
                GenerationRequest::new(""),
                GenerationRequest::new("third"),
            ])
            .await;

        assert_eq!(results.len(), 3);
        assert!(!results[0].is_error());
        assert!(results[0].text().contains("first"));
        assert!(results[1].is_error());
        assert_eq!(results[1].tokens_used(), 0);
        assert!(results[1].text().starts_with("Error: "));
        assert!(!results[2].is_error());
        assert!(results[2].text().contains("third"));
    }

    #[tokio::test]
    async fn generation_errors_are_isolated_per_item() {
        let batch = BatchCoordinator::new(Arc::new(Picky), GenerationDefaults::batch());
        let results = batch
            .generate_batch(vec![
                GenerationRequest::new("boom"),
                GenerationRequest::new("fine"),
            ])
            .await;

        assert_eq!(
            results[0],
            BatchItemResult::Failed(ErrorPlaceholder {
                text: "Error: model execution failed: engine crashed".into(),
                tokens_used: 0,
            })
        );
        assert_eq!(results[1].text(), "FINE");
    }

    #[tokio::test]
    async fn malformed_json_items_fail_only_their_slot() {
        let items = vec![
            serde_json::json!({"prompt": "one"}),
            serde_json::json!({"max_tokens": 5}),
            serde_json::json!({"prompt": "two", "max_tokens": -1}),
            serde_json::json!({"prompt": "three", "temperature": "hot"}),
            serde_json::json!("not an object"),
            serde_json::json!({"prompt": "four"}),
        ];
        let results = BatchCoordinator::new(Arc::new(Picky), GenerationDefaults::batch())
            .generate_json_batch(items)
            .await;

        assert_eq!(results.len(), 6);
        assert_eq!(results[0].text(), "ONE");
        for failed in &results[1..5] {
            assert!(failed.is_error());
            assert_eq!(failed.tokens_used(), 0);
            assert!(failed.text().starts_with("Error: invalid request: "));
        }
        assert!(results[1].text().contains("prompt"));
        assert_eq!(results[5].text(), "FOUR");
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_output() {
        assert!(unloaded_batch().generate_batch(Vec::new()).await.is_empty());
    }

    #[tokio::test]
    async fn items_use_the_batch_defaults() {
        let generator = Arc::new(GenerationService::new(
            BackendState::Unloaded,
            FallbackGenerator::new(true),
            "tiny-Q5_1",
            None,
        ));
        let batch = BatchCoordinator::new(generator, GenerationDefaults::batch());
        let results = batch.generate_batch(vec![GenerationRequest::new("x")]).await;

        let unpadded = FallbackGenerator::default().generate("x", 0);
        let fillers = results[0].text().split_whitespace().count()
            - unpadded.split_whitespace().count();
        assert_eq!(fillers, GenerationDefaults::batch().max_tokens / 5);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_output_is_aligned_with_input(prompts in prop::collection::vec("(boom|ok)?[a-z]{0,8}", 0..12)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let batch = BatchCoordinator::new(Arc::new(Picky), GenerationDefaults::batch());
            let requests = prompts.iter().cloned().map(GenerationRequest::new).collect();
            let results = runtime.block_on(batch.generate_batch(requests));

            prop_assert_eq!(results.len(), prompts.len());
            for (prompt, result) in prompts.iter().zip(&results) {
                let should_fail = prompt.trim().is_empty() || prompt.contains("boom");
                prop_assert_eq!(result.is_error(), should_fail);
                if !should_fail {
                    prop_assert_eq!(result.text(), prompt.to_uppercase());
                }
            }
        }
    }
}
