//! Gate configuration.
//! Reads ideagate.toml from the current directory or the path in IDEAGATE_CONFIG,
//! then applies IDEAGATE_* environment overrides. The resulting value is
//! immutable and handed to each component at construction.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{GateError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub pass: PassConfig,
    #[serde(default)]
    pub refine: RefineConfig,
    #[serde(default)]
    pub novelty: NoveltyConfig,
    #[serde(default)]
    pub novelty_mode: NoveltyModeConfig,
    #[serde(default)]
    pub critic: CriticConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
}

// ── Anchored calibration ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_anchor_quantiles")]
    pub anchor_quantiles: Vec<f64>,
    #[serde(default = "default_anchor_max_initial")]
    pub anchor_max_initial: usize,
    #[serde(default = "default_anchor_max_total")]
    pub anchor_max_total: usize,
    #[serde(default = "default_anchor_max_exemplars")]
    pub anchor_max_exemplars: usize,
    #[serde(default = "default_densify_offsets")]
    pub densify_offsets: Vec<f64>,
    #[serde(default = "default_sigmoid_k")]
    pub sigmoid_k: f64,
    #[serde(default = "default_grid_step")]
    pub grid_step: f64,
    #[serde(default = "default_densify_loss_threshold")]
    pub densify_loss_threshold: f64,
    #[serde(default = "default_densify_min_avg_conf")]
    pub densify_min_avg_conf: f64,
}

fn default_anchor_quantiles() -> Vec<f64> { vec![0.1, 0.25, 0.5, 0.75, 0.9] }
fn default_anchor_max_initial() -> usize { 7 }
fn default_anchor_max_total() -> usize { 9 }
fn default_anchor_max_exemplars() -> usize { 2 }
fn default_densify_offsets() -> Vec<f64> { vec![-0.5, 0.5, -0.25, 0.25] }
fn default_sigmoid_k() -> f64 { 1.2 }
fn default_grid_step() -> f64 { 0.01 }
fn default_densify_loss_threshold() -> f64 { 0.03 }
fn default_densify_min_avg_conf() -> f64 { 0.45 }

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            anchor_quantiles: default_anchor_quantiles(),
            anchor_max_initial: default_anchor_max_initial(),
            anchor_max_total: default_anchor_max_total(),
            anchor_max_exemplars: default_anchor_max_exemplars(),
            densify_offsets: default_densify_offsets(),
            sigmoid_k: default_sigmoid_k(),
            grid_step: default_grid_step(),
            densify_loss_threshold: default_densify_loss_threshold(),
            densify_min_avg_conf: default_densify_min_avg_conf(),
        }
    }
}

// ── Pass decision ────────────────────────────────────────────────────────────

/// What to do when a pattern has too few reference scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Use anchors built from every pattern's scores combined.
    Global,
    /// Use the fixed raw-score threshold.
    Fixed,
}

impl FallbackPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackPolicy::Global => "global",
            FallbackPolicy::Fixed  => "fixed",
        }
    }
}

impl FromStr for FallbackPolicy {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(FallbackPolicy::Global),
            "fixed"  => Ok(FallbackPolicy::Fixed),
            other => Err(GateError::Config(format!(
                "unknown pass fallback '{other}' (expected global|fixed)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// Decision mode name, resolved once by the decision engine.
    #[serde(default = "default_pass_mode")]
    pub mode: String,
    #[serde(default = "default_min_pattern_papers")]
    pub min_pattern_papers: usize,
    #[serde(default = "default_fallback")]
    pub fallback: FallbackPolicy,
    #[serde(default = "default_pass_score")]
    pub pass_score: f64,
}

fn default_pass_mode() -> String { "two_of_three_q75_and_avg_ge_q50".to_string() }
fn default_min_pattern_papers() -> usize { 20 }
fn default_fallback() -> FallbackPolicy { FallbackPolicy::Global }
fn default_pass_score() -> f64 { 7.0 }

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            mode: default_pass_mode(),
            min_pattern_papers: default_min_pattern_papers(),
            fallback: default_fallback(),
            pass_score: default_pass_score(),
        }
    }
}

// ── Refinement ───────────────────────────────────────────────────────────────

/// Rank ranges are 0-indexed and inclusive: (4, 9) covers ranks 5–10.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_tail_range")]
    pub tail_injection_rank_range: (usize, usize),
    #[serde(default = "default_head_range")]
    pub head_injection_rank_range: (usize, usize),
    #[serde(default = "default_head_cluster_threshold")]
    pub head_injection_cluster_threshold: usize,
}

fn default_max_iterations() -> usize { 3 }
fn default_tail_range() -> (usize, usize) { (4, 9) }
fn default_head_range() -> (usize, usize) { (0, 2) }
fn default_head_cluster_threshold() -> usize { 15 }

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tail_injection_rank_range: default_tail_range(),
            head_injection_rank_range: default_head_range(),
            head_injection_cluster_threshold: default_head_cluster_threshold(),
        }
    }
}

// ── Novelty ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoveltyConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Similarity at or below this is low risk.
    #[serde(default = "default_low_risk_threshold")]
    pub low_risk_threshold: f64,
    /// Similarity above this is a collision (high risk).
    #[serde(default = "default_collision_threshold")]
    pub collision_threshold: f64,
}

fn default_top_k() -> usize { 10 }
fn default_low_risk_threshold() -> f64 { 0.5 }
fn default_collision_threshold() -> f64 { 0.75 }

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            low_risk_threshold: default_low_risk_threshold(),
            collision_threshold: default_collision_threshold(),
        }
    }
}

// ── Novelty mode ─────────────────────────────────────────────────────────────

/// Fallback after a refinement session is exhausted: try other selected
/// patterns and accept the draft the novelty critic rates highest, provided
/// it clears `score_threshold`. `max_patterns = 0` turns the fallback off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoveltyModeConfig {
    #[serde(default = "default_novelty_mode_max_patterns")]
    pub max_patterns: usize,
    /// Raw 0-10 score from the novelty critic.
    #[serde(default = "default_novelty_score_threshold")]
    pub score_threshold: f64,
    #[serde(default = "default_novelty_critic_id")]
    pub critic_id: String,
}

fn default_novelty_mode_max_patterns() -> usize { 3 }
fn default_novelty_score_threshold() -> f64 { 6.0 }
fn default_novelty_critic_id() -> String { "novelty".to_string() }

impl Default for NoveltyModeConfig {
    fn default() -> Self {
        Self {
            max_patterns: default_novelty_mode_max_patterns(),
            score_threshold: default_novelty_score_threshold(),
            critic_id: default_novelty_critic_id(),
        }
    }
}

// ── Critics ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticConfig {
    #[serde(default = "default_critic_count")]
    pub critic_count: usize,
    #[serde(default = "bool_true")]
    pub strict_json: bool,
    /// Extra attempts after the first malformed response.
    #[serde(default = "default_json_retries")]
    pub json_retries: u32,
}

fn default_critic_count() -> usize { 3 }
fn default_json_retries() -> u32 { 2 }
fn bool_true() -> bool { true }

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            critic_count: default_critic_count(),
            strict_json: true,
            json_retries: default_json_retries(),
        }
    }
}

// ── Pattern selection ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_select_count")]
    pub select_pattern_count: usize,
    #[serde(default = "default_head_range")]
    pub conservative_rank_range: (usize, usize),
    #[serde(default = "default_innovative_threshold")]
    pub innovative_cluster_threshold: usize,
}

fn default_select_count() -> usize { 3 }
fn default_innovative_threshold() -> usize { 10 }

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            select_pattern_count: default_select_count(),
            conservative_rank_range: default_head_range(),
            innovative_cluster_threshold: default_innovative_threshold(),
        }
    }
}

// ── Providers ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,
    #[serde(default = "default_llm_api_url")]
    pub llm_api_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    /// Never serialized back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_timeout_secs")]
    pub embedding_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub chat_timeout_secs: u64,
}

fn default_provider_name() -> String { "siliconflow".to_string() }
fn default_llm_api_url() -> String { "https://api.siliconflow.cn/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "Pro/zai-org/GLM-4.7".to_string() }
fn default_embedding_url() -> String { "https://api.siliconflow.cn/v1/embeddings".to_string() }
fn default_embedding_model() -> String { "Qwen/Qwen3-Embedding-8B".to_string() }
fn default_timeout_secs() -> u64 { 120 }

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            llm_api_url: default_llm_api_url(),
            llm_model: default_llm_model(),
            api_key: None,
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            embedding_timeout_secs: default_timeout_secs(),
            chat_timeout_secs: default_timeout_secs(),
        }
    }
}

// ── Logging ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "bool_true")]
    pub enable_call_log: bool,
    /// Directory for the JSON-lines call log; tracing only when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default = "default_log_max_text_chars")]
    pub log_max_text_chars: usize,
}

fn default_log_max_text_chars() -> usize { 20_000 }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_call_log: true,
            log_dir: None,
            log_max_text_chars: default_log_max_text_chars(),
        }
    }
}

// ── Corpus ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusConfig {
    #[serde(default)]
    pub patterns_path: Option<String>,
    #[serde(default)]
    pub records_path: Option<String>,
}


impl GateConfig {
    /// Load configuration from ideagate.toml (or IDEAGATE_CONFIG), apply
    /// environment overrides and validate. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var("IDEAGATE_CONFIG")
            .unwrap_or_else(|_| "ideagate.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::from_toml_str(&content)?
        } else {
            tracing::info!(path = %path, "No config file found, using defaults");
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply IDEAGATE_* overrides. `lookup` abstracts the environment so
    /// overrides can be exercised without touching process state.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("IDEAGATE_PASS_MODE") {
            self.pass.mode = v;
        }
        if let Some(v) = lookup("IDEAGATE_PASS_MIN_PATTERN_PAPERS") {
            self.pass.min_pattern_papers = parse_var("IDEAGATE_PASS_MIN_PATTERN_PAPERS", &v)?;
        }
        if let Some(v) = lookup("IDEAGATE_PASS_FALLBACK") {
            self.pass.fallback = v.parse()?;
        }
        if let Some(v) = lookup("IDEAGATE_CRITIC_STRICT_JSON") {
            self.critic.strict_json = parse_flag(&v);
        }
        if let Some(v) = lookup("IDEAGATE_CRITIC_JSON_RETRIES") {
            self.critic.json_retries = parse_var("IDEAGATE_CRITIC_JSON_RETRIES", &v)?;
        }
        if let Some(v) = lookup("IDEAGATE_NOVELTY_MODE_MAX_PATTERNS") {
            self.novelty_mode.max_patterns = parse_var("IDEAGATE_NOVELTY_MODE_MAX_PATTERNS", &v)?;
        }
        if let Some(v) = lookup("IDEAGATE_NOVELTY_SCORE_THRESHOLD") {
            self.novelty_mode.score_threshold = parse_var("IDEAGATE_NOVELTY_SCORE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("IDEAGATE_LLM_API_KEY") {
            if !v.is_empty() {
                self.provider.api_key = Some(v);
            }
        }
        if let Some(v) = lookup("IDEAGATE_LLM_API_URL") {
            self.provider.llm_api_url = v;
        }
        if let Some(v) = lookup("IDEAGATE_LLM_MODEL") {
            self.provider.llm_model = v;
        }
        if let Some(v) = lookup("IDEAGATE_EMBEDDING_URL") {
            self.provider.embedding_url = v;
        }
        if let Some(v) = lookup("IDEAGATE_EMBEDDING_MODEL") {
            self.provider.embedding_model = v;
        }
        if let Some(v) = lookup("IDEAGATE_EMBEDDING_TIMEOUT_SECS") {
            self.provider.embedding_timeout_secs = parse_var("IDEAGATE_EMBEDDING_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("IDEAGATE_ENABLE_CALL_LOG") {
            self.logging.enable_call_log = parse_flag(&v);
        }
        if let Some(v) = lookup("IDEAGATE_LOG_DIR") {
            self.logging.log_dir = Some(v);
        }
        if let Some(v) = lookup("IDEAGATE_LOG_MAX_TEXT_CHARS") {
            self.logging.log_max_text_chars = parse_var("IDEAGATE_LOG_MAX_TEXT_CHARS", &v)?;
        }
        Ok(())
    }

    /// Reject settings the numeric core cannot work with.
    pub fn validate(&self) -> Result<()> {
        let cal = &self.calibration;
        if cal.anchor_quantiles.is_empty() {
            return Err(GateError::Config("anchor_quantiles must not be empty".into()));
        }
        if cal.anchor_quantiles.iter().any(|q| !(0.0..=1.0).contains(q)) {
            return Err(GateError::Config("anchor_quantiles must lie in [0, 1]".into()));
        }
        if cal.anchor_quantiles.windows(2).any(|w| w[1] <= w[0]) {
            return Err(GateError::Config("anchor_quantiles must be strictly increasing".into()));
        }
        if cal.anchor_max_initial == 0 || cal.anchor_max_total < cal.anchor_max_initial {
            return Err(GateError::Config(format!(
                "anchor_max_total ({}) must be >= anchor_max_initial ({}) > 0",
                cal.anchor_max_total, cal.anchor_max_initial
            )));
        }
        if !(cal.sigmoid_k > 0.0 && cal.sigmoid_k.is_finite()) {
            return Err(GateError::Config("sigmoid_k must be positive".into()));
        }
        if !(cal.grid_step > 0.0 && cal.grid_step < 1.0) {
            return Err(GateError::Config("grid_step must lie in (0, 1)".into()));
        }
        if self.refine.max_iterations == 0 {
            return Err(GateError::Config("refine.max_iterations must be at least 1".into()));
        }
        for (name, (lo, hi)) in [
            ("tail_injection_rank_range", self.refine.tail_injection_rank_range),
            ("head_injection_rank_range", self.refine.head_injection_rank_range),
            ("conservative_rank_range", self.selection.conservative_rank_range),
        ] {
            if lo > hi {
                return Err(GateError::Config(format!("{name}: start {lo} > end {hi}")));
            }
        }
        let nov = &self.novelty;
        if nov.top_k == 0 {
            return Err(GateError::Config("novelty.top_k must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&nov.low_risk_threshold)
            || !(0.0..=1.0).contains(&nov.collision_threshold)
            || nov.low_risk_threshold > nov.collision_threshold
        {
            return Err(GateError::Config(format!(
                "novelty thresholds must satisfy 0 <= low ({}) <= collision ({}) <= 1",
                nov.low_risk_threshold, nov.collision_threshold
            )));
        }
        if !(0.0..=10.0).contains(&self.novelty_mode.score_threshold) {
            return Err(GateError::Config(format!(
                "novelty_mode.score_threshold ({}) must lie in [0, 10]",
                self.novelty_mode.score_threshold
            )));
        }
        if self.critic.critic_count == 0 {
            return Err(GateError::Config("critic.critic_count must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    let v = value.trim();
    v == "1" || v.eq_ignore_ascii_case("true")
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GateError::Config(format!("{key}: cannot parse '{value}'")))
}
