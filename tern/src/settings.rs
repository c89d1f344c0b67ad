//! Engine configuration: defaults, environment resolution, and clamping.
//!
//! Configuration is resolved in one place per request: request overrides >
//! instance settings > environment > built-in default. Numeric parameters are
//! clamped at this boundary so the rest of the engine never re-checks ranges.

use serde::Deserialize;

/// Total skeptic calls allowed per run (not retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Hard cap on skeptic calls regardless of configuration.
pub const MAX_ATTEMPTS_CAP: u32 = 5;

pub const DEFAULT_ROLE_TEMPERATURE: f32 = 0.6;
pub const DEFAULT_MAX_EVIDENCE_LENGTH: usize = 2000;
pub const DEFAULT_RERANK_INITIAL_K: usize = 20;
pub const DEFAULT_RERANK_FINAL_K: usize = 5;
pub const DEFAULT_SIMPLE_SEARCH_LIMIT: usize = 3;
pub const DEFAULT_RERANK_SCORE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.8;
pub const DEFAULT_RELEVANCE_GATE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_HISTORY_ANSWER_MAX_CHARS: usize = 300;

/// How the optimist prompt treats evidence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Every fact must be cited; no inference across sources; no prior knowledge.
    #[default]
    Strict,
    /// Citations preferred; synthesis allowed; conflicts must be flagged.
    Balanced,
}

impl std::str::FromStr for Strictness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "balanced" => Ok(Self::Balanced),
            _ => Err(format!("unknown strictness: {} (use strict or balanced)", s)),
        }
    }
}

/// Per-request temperature overrides, highest precedence.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct TemperatureOverrides {
    pub optimist: Option<f32>,
    pub skeptic: Option<f32>,
    pub refiner: Option<f32>,
}

/// Resolved engine settings. Construct via [`EngineSettings::default`] or
/// [`EngineSettings::from_env`], then derive per-request values with
/// [`EngineSettings::with_overrides`].
#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub max_attempts: u32,
    pub optimist_temperature: f32,
    pub skeptic_temperature: f32,
    pub refiner_temperature: f32,
    pub strictness: Strictness,
    pub skeptic_examples_path: Option<String>,
    pub max_evidence_length: usize,
    pub rerank_initial_k: usize,
    pub rerank_final_k: usize,
    pub simple_search_limit: usize,
    pub rerank_score_threshold: f32,
    pub distance_threshold: f32,
    pub relevance_gate_threshold: f32,
    pub relevance_gate_enabled: bool,
    pub history_answer_max_chars: usize,
    /// Optional skeptic model override (split-brain auditing).
    pub skeptic_model: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            optimist_temperature: DEFAULT_ROLE_TEMPERATURE,
            skeptic_temperature: DEFAULT_ROLE_TEMPERATURE,
            refiner_temperature: DEFAULT_ROLE_TEMPERATURE,
            strictness: Strictness::default(),
            skeptic_examples_path: None,
            max_evidence_length: DEFAULT_MAX_EVIDENCE_LENGTH,
            rerank_initial_k: DEFAULT_RERANK_INITIAL_K,
            rerank_final_k: DEFAULT_RERANK_FINAL_K,
            simple_search_limit: DEFAULT_SIMPLE_SEARCH_LIMIT,
            rerank_score_threshold: DEFAULT_RERANK_SCORE_THRESHOLD,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            relevance_gate_threshold: DEFAULT_RELEVANCE_GATE_THRESHOLD,
            relevance_gate_enabled: true,
            history_answer_max_chars: DEFAULT_HISTORY_ANSWER_MAX_CHARS,
            skeptic_model: None,
        }
    }
}

/// Clamps a temperature into the provider-accepted [0, 2] range.
pub fn clamp_temperature(t: f32) -> f32 {
    t.clamp(0.0, 2.0)
}

/// Clamps attempts into [1, cap]; the cap bounds end-to-end latency.
pub fn clamp_attempts(n: u32) -> u32 {
    n.clamp(1, MAX_ATTEMPTS_CAP)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(v) => match v.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(key = key, value = %v, "invalid value, using default");
                None
            }
        },
        Err(_) => None,
    }
}

impl EngineSettings {
    /// Reads settings from the environment, clamping every numeric value.
    /// Unset or unparseable keys keep the built-in defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_attempts: env_parse("MAX_VERIFICATION_ATTEMPTS")
                .map(clamp_attempts)
                .unwrap_or(d.max_attempts),
            optimist_temperature: env_parse("OPTIMIST_TEMPERATURE")
                .map(clamp_temperature)
                .unwrap_or(d.optimist_temperature),
            skeptic_temperature: env_parse("SKEPTIC_TEMPERATURE")
                .map(clamp_temperature)
                .unwrap_or(d.skeptic_temperature),
            refiner_temperature: env_parse("REFINER_TEMPERATURE")
                .map(clamp_temperature)
                .unwrap_or(d.refiner_temperature),
            strictness: env_parse("OPTIMIST_STRICTNESS").unwrap_or(d.strictness),
            skeptic_examples_path: std::env::var("SKEPTIC_EXAMPLES_PATH").ok(),
            max_evidence_length: env_parse("MAX_EVIDENCE_LENGTH")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(d.max_evidence_length),
            rerank_initial_k: env_parse("RERANK_INITIAL_K")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(d.rerank_initial_k),
            rerank_final_k: env_parse("RERANK_FINAL_K")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(d.rerank_final_k),
            simple_search_limit: env_parse("SIMPLE_SEARCH_LIMIT")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(d.simple_search_limit),
            rerank_score_threshold: env_parse("RERANK_SCORE_THRESHOLD")
                .map(|t: f32| t.clamp(0.0, 1.0))
                .unwrap_or(d.rerank_score_threshold),
            distance_threshold: env_parse("DISTANCE_THRESHOLD")
                .filter(|&t: &f32| t > 0.0)
                .unwrap_or(d.distance_threshold),
            relevance_gate_threshold: env_parse("RELEVANCE_GATE_THRESHOLD")
                .map(|t: f32| t.clamp(0.0, 1.0))
                .unwrap_or(d.relevance_gate_threshold),
            relevance_gate_enabled: env_parse("RELEVANCE_GATE_ENABLED")
                .unwrap_or(d.relevance_gate_enabled),
            history_answer_max_chars: env_parse("HISTORY_ANSWER_MAX_CHARS")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(d.history_answer_max_chars),
            skeptic_model: std::env::var("SKEPTIC_MODEL").ok(),
        }
    }

    /// Applies per-request temperature overrides (request > instance),
    /// clamping at the boundary. Other settings are instance-scoped.
    pub fn with_overrides(&self, overrides: &TemperatureOverrides) -> Self {
        let mut s = self.clone();
        if let Some(t) = overrides.optimist {
            s.optimist_temperature = clamp_temperature(t);
        }
        if let Some(t) = overrides.skeptic {
            s.skeptic_temperature = clamp_temperature(t);
        }
        if let Some(t) = overrides.refiner {
            s.refiner_temperature = clamp_temperature(t);
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Defaults match the documented configuration surface.
    #[test]
    fn defaults() {
        let s = EngineSettings::default();
        assert_eq!(s.max_attempts, 3);
        assert_eq!(s.rerank_initial_k, 20);
        assert_eq!(s.rerank_final_k, 5);
        assert_eq!(s.simple_search_limit, 3);
        assert_eq!(s.rerank_score_threshold, 0.3);
        assert_eq!(s.distance_threshold, 0.8);
        assert_eq!(s.relevance_gate_threshold, 0.5);
        assert!(s.relevance_gate_enabled);
        assert_eq!(s.history_answer_max_chars, 300);
        assert_eq!(s.strictness, Strictness::Strict);
    }

    /// **Scenario**: Attempts clamp to [1, 5] and temperatures to [0, 2].
    #[test]
    fn clamping() {
        assert_eq!(clamp_attempts(0), 1);
        assert_eq!(clamp_attempts(99), 5);
        assert_eq!(clamp_attempts(3), 3);
        assert_eq!(clamp_temperature(-1.0), 0.0);
        assert_eq!(clamp_temperature(9.0), 2.0);
        assert_eq!(clamp_temperature(0.7), 0.7);
    }

    /// **Scenario**: Request overrides win over instance settings and are clamped.
    #[test]
    fn overrides_take_precedence_and_clamp() {
        let base = EngineSettings::default();
        let s = base.with_overrides(&TemperatureOverrides {
            optimist: Some(0.1),
            skeptic: Some(5.0),
            refiner: None,
        });
        assert_eq!(s.optimist_temperature, 0.1);
        assert_eq!(s.skeptic_temperature, 2.0);
        assert_eq!(s.refiner_temperature, base.refiner_temperature);
    }

    /// **Scenario**: Strictness parses case-insensitively and rejects unknown values.
    #[test]
    fn strictness_from_str() {
        assert_eq!("STRICT".parse::<Strictness>().unwrap(), Strictness::Strict);
        assert_eq!("balanced".parse::<Strictness>().unwrap(), Strictness::Balanced);
        assert!("loose".parse::<Strictness>().is_err());
    }
}
