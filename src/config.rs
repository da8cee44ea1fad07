use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{anyhow, ensure};

#[cfg(feature = "tch-backend")]
use tch::Device;

use crate::model::GenerationDefaults;

const DEFAULT_MODEL_NAME: &str =
    "DavidAU/OpenAi-GPT-oss-20b-abliterated-uncensored-NEO-Imatrix-gguf";
const DEFAULT_QUANTIZATION: &str = "Q5_1";
const DEFAULT_MODEL_DIR: &str = "/app/models";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub model_dir: PathBuf,
    pub model_name: String,
    pub quantization: String,
    pub model_file: PathBuf,
    pub tokenizer_path: PathBuf,
    pub n_ctx: usize,
    pub n_threads: usize,
    pub n_batch: usize,
    pub n_gpu_layers: u32,
    pub eos_token_id: i64,
    pub defaults: GenerationDefaults,
    pub batch_defaults: GenerationDefaults,
    pub fallback_padding: bool,
    pub generation_timeout: Option<Duration>,
    #[cfg(feature = "tch-backend")]
    pub device: Device,
}

impl Default for AppConfig {
    fn default() -> Self {
        let model_dir = PathBuf::from(DEFAULT_MODEL_DIR);
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000),
            model_file: derive_model_file(&model_dir, DEFAULT_MODEL_NAME, DEFAULT_QUANTIZATION),
            tokenizer_path: model_dir.join("tokenizer.json"),
            model_dir,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            quantization: DEFAULT_QUANTIZATION.to_string(),
            n_ctx: 4096,
            n_threads: 4,
            n_batch: 512,
            n_gpu_layers: 0,
            eos_token_id: 50256,
            defaults: GenerationDefaults::standard(),
            batch_defaults: GenerationDefaults::batch(),
            fallback_padding: false,
            generation_timeout: Some(Duration::from_secs(300)),
            #[cfg(feature = "tch-backend")]
            device: Device::Cpu,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset or unparsable
    /// values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = Self::default();

        let host: IpAddr = parsed(&lookup, "HOST").unwrap_or(base.listen_addr.ip());
        let port: u16 = parsed(&lookup, "PORT").unwrap_or(base.listen_addr.port());
        let listen_addr: SocketAddr =
            parsed(&lookup, "SERVER_ADDR").unwrap_or_else(|| SocketAddr::new(host, port));

        let model_dir = lookup("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or(base.model_dir);
        let model_name = lookup("MODEL_NAME").unwrap_or(base.model_name);
        ensure!(!model_name.trim().is_empty(), "MODEL_NAME must not be empty");
        let quantization = lookup("MODEL_QUANTIZATION").unwrap_or(base.quantization);

        let model_file = lookup("MODEL_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| derive_model_file(&model_dir, &model_name, &quantization));
        let tokenizer_path = lookup("TOKENIZER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| model_dir.join("tokenizer.json"));

        let n_ctx = parsed(&lookup, "N_CTX").unwrap_or(base.n_ctx);
        let n_threads = parsed(&lookup, "N_THREADS").unwrap_or(base.n_threads);
        let n_batch = parsed(&lookup, "N_BATCH").unwrap_or(base.n_batch);
        let n_gpu_layers = parsed(&lookup, "N_GPU_LAYERS").unwrap_or(base.n_gpu_layers);
        let eos_token_id = parsed(&lookup, "EOS_TOKEN_ID").unwrap_or(base.eos_token_id);

        let stop = lookup("STOP_SEQUENCES").map(|raw| {
            raw.split('|')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        let mut defaults = base.defaults;
        defaults.max_tokens = parsed(&lookup, "MAX_TOKENS").unwrap_or(defaults.max_tokens);
        defaults.temperature = parsed(&lookup, "TEMPERATURE").unwrap_or(defaults.temperature);
        defaults.top_p = parsed(&lookup, "TOP_P").unwrap_or(defaults.top_p);
        defaults.top_k = parsed(&lookup, "TOP_K").unwrap_or(defaults.top_k);
        defaults.repeat_penalty =
            parsed(&lookup, "REPEAT_PENALTY").unwrap_or(defaults.repeat_penalty);

        let mut batch_defaults = base.batch_defaults;
        for preset in [&mut defaults, &mut batch_defaults] {
            preset.max_tokens_limit = n_ctx;
            if let Some(stop) = stop.as_ref() {
                preset.stop = stop.clone();
            }
            preset
                .sampling()
                .validate(n_ctx)
                .map_err(|e| anyhow!("invalid default generation parameters: {e}"))?;
        }

        let fallback_padding = lookup("FALLBACK_PAD_OUTPUT")
            .map(|v| parse_flag(&v))
            .unwrap_or(base.fallback_padding);
        let generation_timeout = match parsed::<u64, _>(&lookup, "GENERATION_TIMEOUT_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => base.generation_timeout,
        };

        #[cfg(feature = "tch-backend")]
        let device = {
            let raw = lookup("DEVICE").unwrap_or_else(|| "cpu".into());
            parse_device(&raw)
        };

        Ok(Self {
            listen_addr,
            model_dir,
            model_name,
            quantization,
            model_file,
            tokenizer_path,
            n_ctx,
            n_threads,
            n_batch,
            n_gpu_layers,
            eos_token_id,
            defaults,
            batch_defaults,
            fallback_padding,
            generation_timeout,
            #[cfg(feature = "tch-backend")]
            device,
        })
    }

    /// `"{model_name}-{quantization}"`, reported in every generation result.
    pub fn model_identifier(&self) -> String {
        format!("{}-{}", self.model_name, self.quantization)
    }
}

fn derive_model_file(dir: &Path, model_name: &str, quantization: &str) -> PathBuf {
    let base = model_name.rsplit('/').next().unwrap_or(model_name);
    dir.join(format!("{base}-{quantization}.gguf"))
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(feature = "tch-backend")]
fn parse_device(raw: &str) -> Device {
    let lower = raw.to_lowercase();
    if lower == "cpu" {
        Device::Cpu
    } else if lower.starts_with("cuda") {
        let idx = lower
            .split(':')
            .nth(1)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        if tch::Cuda::is_available() {
            Device::Cuda(idx)
        } else {
            Device::Cpu
        }
    } else {
        Device::Cpu
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_follow_the_deployment_layout() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.listen_addr.to_string(), "0.0.0.0:8000");
        assert_eq!(
            config.model_file,
            PathBuf::from(
                "/app/models/OpenAi-GPT-oss-20b-abliterated-uncensored-NEO-Imatrix-gguf-Q5_1.gguf"
            )
        );
        assert_eq!(config.defaults.max_tokens, 512);
        assert_eq!(config.batch_defaults.max_tokens, 256);
        assert_eq!(config.generation_timeout, Some(Duration::from_secs(300)));
        assert!(!config.fallback_padding);
    }

    #[test]
    fn model_identifier_joins_name_and_quantization() {
        let config = config_from(&[("MODEL_NAME", "org/tiny"), ("MODEL_QUANTIZATION", "Q4_K")])
            .unwrap();
        assert_eq!(config.model_identifier(), "org/tiny-Q4_K");
        assert!(config.model_file.ends_with("tiny-Q4_K.gguf"));
    }

    #[test]
    fn overrides_are_applied_and_garbage_is_ignored() {
        let config = config_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "9001"),
            ("MODEL_FILE", "/tmp/custom.ts"),
            ("TEMPERATURE", "0.2"),
            ("TOP_K", "not-a-number"),
            ("N_CTX", "1024"),
            ("STOP_SEQUENCES", "###|END"),
            ("FALLBACK_PAD_OUTPUT", "true"),
            ("GENERATION_TIMEOUT_SECS", "0"),
        ])
        .unwrap();

        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:9001");
        assert_eq!(config.model_file, PathBuf::from("/tmp/custom.ts"));
        assert_eq!(config.defaults.temperature, 0.2);
        assert_eq!(config.defaults.top_k, 40);
        assert_eq!(config.defaults.max_tokens_limit, 1024);
        assert_eq!(config.batch_defaults.stop, vec!["###", "END"]);
        assert!(config.fallback_padding);
        assert_eq!(config.generation_timeout, None);
    }

    #[test]
    fn server_addr_wins_over_host_and_port() {
        let config = config_from(&[("SERVER_ADDR", "127.0.0.1:7000"), ("PORT", "9001")]).unwrap();
        assert_eq!(config.listen_addr.port(), 7000);
    }

    #[test]
    fn rejects_defaults_the_validator_would_refuse() {
        assert!(config_from(&[("TOP_P", "1.5")]).is_err());
        assert!(config_from(&[("MAX_TOKENS", "8192")]).is_err());
        assert!(config_from(&[("MODEL_NAME", "  ")]).is_err());
    }
}
