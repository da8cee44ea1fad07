use tch::{Device, IValue, Kind, Tensor, no_grad};
use tokenizers::Tokenizer;

use crate::{
    config::AppConfig,
    model::{
        BackendError, BackendOutput, Completion, InferenceBackend, LoadError, SamplingParams,
        earliest_stop,
    },
};

/// TorchScript causal LM traced with a single `input_ids` argument.
/// Applies temperature and top-k; other sampling fields are accepted but ignored.
pub struct TorchEngine {
    tokenizer: Tokenizer,
    module: tch::CModule,
    device: Device,
    eos_token_id: i64,
}

impl TorchEngine {
    pub fn load(config: &AppConfig) -> Result<Self, LoadError> {
        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| LoadError::Engine(format!("tokenizer: {e}")))?;

        if config.n_threads > 0 {
            tch::set_num_threads(config.n_threads as i32);
        }
        let mut module = tch::CModule::load_on_device(&config.model_file, config.device)
            .map_err(|e| LoadError::Engine(e.to_string()))?;
        module.set_eval();

        Ok(Self {
            tokenizer,
            module,
            device: config.device,
            eos_token_id: config.eos_token_id,
        })
    }

    fn forward_last_logits(&self, input_ids: &[i64]) -> Result<Tensor, BackendError> {
        let input_tensor = Tensor::from_slice(input_ids)
            .reshape([1, input_ids.len() as i64])
            .to(self.device);

        let output = self
            .module
            .forward_is(&[IValue::Tensor(input_tensor)])
            .map_err(|e| BackendError::new(e.to_string()))?;

        // traced GPT-style models return either logits or (logits, past)
        let logits = match output {
            IValue::Tensor(t) => t,
            IValue::Tuple(ref tuple) if !tuple.is_empty() => match &tuple[0] {
                IValue::Tensor(t) => t.shallow_clone(),
                _ => return Err(BackendError::new("expected tensor as first tuple element")),
            },
            _ => return Err(BackendError::new("unexpected model output format")),
        };

        // [1, seq_len, vocab] -> [vocab]
        Ok(logits.select(1, -1).squeeze())
    }

    fn next_token(&self, logits: &Tensor, params: &SamplingParams) -> i64 {
        if params.temperature <= f64::EPSILON || params.top_k == 1 {
            return logits.argmax(0, false).int64_value(&[]);
        }
        let vocab = logits.size().first().copied().unwrap_or(1);
        let k = (params.top_k as i64).min(vocab);
        let (values, indices) = logits.topk(k, 0, true, true);
        let probs = (values / params.temperature).softmax(0, Kind::Float);
        let choice = probs.multinomial(1, false).int64_value(&[0]);
        indices.int64_value(&[choice])
    }

    fn decode(&self, ids: &[i64]) -> Result<String, BackendError> {
        let ids: Vec<u32> = ids.iter().map(|&id| id as u32).collect();
        self.tokenizer
            .decode(&ids, true)
            .map_err(|e| BackendError::new(format!("tokenizer: {e}")))
    }
}

impl InferenceBackend for TorchEngine {
    fn complete(
        &mut self,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<Box<dyn BackendOutput>, BackendError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| BackendError::new(format!("tokenizer: {e}")))?;
        let mut input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        if input_ids.is_empty() {
            input_ids.push(0);
        }
        let prompt_len = input_ids.len();

        let mut text = String::new();
        no_grad(|| {
            for _ in 0..params.max_tokens {
                let logits = self.forward_last_logits(&input_ids)?;
                let next = self.next_token(&logits, params);
                if next == self.eos_token_id {
                    break;
                }
                input_ids.push(next);

                text = self.decode(&input_ids[prompt_len..])?;
                if let Some(cut) = earliest_stop(&text, &params.stop) {
                    text.truncate(cut);
                    break;
                }
            }
            Ok::<(), BackendError>(())
        })?;

        Ok(Box::new(Completion {
            text,
            token_count: Some(input_ids.len()),
        }))
    }
}
