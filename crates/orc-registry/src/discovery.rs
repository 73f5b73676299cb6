//! Filename-convention parsing for local GGUF model files.
//!
//! Expects names of the shape `<family>-<size>b-[tag-...]-<quant>.gguf`,
//! e.g. `qwen2.5-14b-instruct-q4_k_m.gguf` or `deepseek-r1-32b-q4_k_s.gguf`.
//! Anything that doesn't carry a recognizable size token is skipped rather
//! than rejected outright, since a models directory commonly holds
//! non-model files (`.json` sidecars, README, partial downloads).

use orc_kernel::model::RuntimeOverrides;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedModel {
    pub family: String,
    pub size_params_b: f64,
    pub quantization: String,
    pub is_thinking: bool,
    pub is_coder: bool,
    pub is_instruct: bool,
}

const MODEL_EXTENSIONS: &[&str] = &["gguf", "bin", "safetensors"];

const THINKING_TOKENS: &[&str] = &["r1", "think", "reasoning", "qwq"];
const CODER_TOKENS: &[&str] = &["coder", "code"];
const INSTRUCT_TOKENS: &[&str] = &["instruct", "chat", "it"];
const QUANT_TOKENS: &[&str] = &[
    "q2_k", "q3_k_s", "q3_k_m", "q3_k_l", "q4_0", "q4_k_s", "q4_k_m", "q5_0", "q5_k_s", "q5_k_m",
    "q6_k", "q8_0", "fp16", "f16", "f32",
];

pub fn is_model_file(file_name: &str) -> bool {
    MODEL_EXTENSIONS
        .iter()
        .any(|ext| file_name.to_ascii_lowercase().ends_with(&format!(".{ext}")))
}

/// Parse a model's stem (file name without extension) into its discovered
/// attributes. Returns `None` when no size token (`<number>b`) is found,
/// since that's the one component discovery cannot proceed without.
pub fn parse_stem(stem: &str) -> Option<ParsedModel> {
    let lower = stem.to_ascii_lowercase();
    let tokens: Vec<&str> = lower.split(['-', '_', '.']).collect();

    let mut size_params_b = None;
    let mut size_token_pos = None;
    for (i, tok) in tokens.iter().enumerate() {
        if let Some(rest) = tok.strip_suffix('b') {
            if let Ok(n) = rest.parse::<f64>() {
                size_params_b = Some(n);
                size_token_pos = Some(i);
                break;
            }
        }
    }
    let size_params_b = size_params_b?;
    let size_pos = size_token_pos.unwrap();

    let family = lower
        .split(['-', '_'])
        .take(size_pos)
        .collect::<Vec<_>>()
        .join("-");
    let family = if family.is_empty() {
        tokens.first().copied().unwrap_or("unknown").to_string()
    } else {
        family
    };

    let quantization = QUANT_TOKENS
        .iter()
        .find(|q| lower.contains(*q))
        .map(|q| q.to_uppercase())
        .unwrap_or_else(|| "UNKNOWN".to_string());

    let is_thinking = THINKING_TOKENS.iter().any(|t| lower.contains(t));
    let is_coder = CODER_TOKENS.iter().any(|t| lower.contains(t));
    let is_instruct = INSTRUCT_TOKENS.iter().any(|t| lower.contains(t));

    Some(ParsedModel {
        family,
        size_params_b,
        quantization,
        is_thinking,
        is_coder,
        is_instruct,
    })
}

pub fn default_overrides() -> RuntimeOverrides {
    RuntimeOverrides::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_instruct_model() {
        let p = parse_stem("qwen2.5-14b-instruct-q4_k_m").unwrap();
        assert_eq!(p.size_params_b, 14.0);
        assert_eq!(p.quantization, "Q4_K_M");
        assert!(p.is_instruct);
        assert!(!p.is_coder);
        assert!(!p.is_thinking);
    }

    #[test]
    fn parses_thinking_model() {
        let p = parse_stem("deepseek-r1-32b-q4_k_s").unwrap();
        assert_eq!(p.size_params_b, 32.0);
        assert!(p.is_thinking);
    }

    #[test]
    fn parses_coder_model() {
        let p = parse_stem("qwen2.5-coder-7b-q5_k_m").unwrap();
        assert!(p.is_coder);
        assert_eq!(p.size_params_b, 7.0);
    }

    #[test]
    fn no_size_token_returns_none() {
        assert!(parse_stem("readme").is_none());
    }

    #[test]
    fn recognizes_model_extensions() {
        assert!(is_model_file("model.gguf"));
        assert!(is_model_file("model.safetensors"));
        assert!(!is_model_file("model.json"));
    }
}
