//! Deterministic placeholder text served while no model is loaded.

const FILLER_WORD: &str = "additional";
const WORDS_PER_FILLER: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct FallbackGenerator {
    pad_to_max_tokens: bool,
}

impl FallbackGenerator {
    pub fn new(pad_to_max_tokens: bool) -> Self {
        Self { pad_to_max_tokens }
    }

    pub fn template_count() -> usize {
        TEMPLATES.len()
    }

    /// Stable across processes: the first eight bytes of the prompt's
    /// blake3 digest, reduced modulo the template count.
    pub fn template_index(prompt: &str) -> usize {
        let digest = blake3::hash(prompt.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        (u64::from_le_bytes(head) % TEMPLATES.len() as u64) as usize
    }

    pub fn render_template(index: usize, prompt: &str) -> String {
        let (before, after) = TEMPLATES[index % TEMPLATES.len()];
        format!("{before}{prompt}{after}")
    }

    pub fn generate(&self, prompt: &str, max_tokens: usize) -> String {
        let mut text = Self::render_template(Self::template_index(prompt), prompt);
        if self.pad_to_max_tokens {
            for _ in 0..max_tokens / WORDS_PER_FILLER {
                text.push(' ');
                text.push_str(FILLER_WORD);
            }
        }
        text
    }
}

/// Fallback output is counted in whitespace-separated words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

// Each entry is rendered as `before + prompt + after`.
const TEMPLATES: [(&str, &str); 4] = [
    (
        "[mock] No model is loaded, so this is a simulated reply to: ",
        "",
    ),
    (
        "[mock] Simulated completion. A loaded model would respond to \"",
        "\" here.",
    ),
    (
        "[mock] The inference backend is offline. Received prompt: ",
        "",
    ),
    (
        "[mock] Placeholder output generated without a model for the request: ",
        "",
    ),
];
