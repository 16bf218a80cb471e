//! Configuration system for Delve.
//!
//! Uses `figment` for layered configuration: defaults -> user file ->
//! workspace file -> explicit file -> environment. Configuration is loaded
//! from `~/.config/delve/config.toml` and/or `.delve/config.toml` in the
//! workspace directory. Everything here is read once at session start.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration for a Delve session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DelveConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
    pub scraper: ScraperConfig,
    pub output: OutputConfig,
}

impl DelveConfig {
    /// Collect validation warnings from every section.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.llm.validate();
        warnings.extend(self.search.validate());
        warnings.extend(self.research.validate());
        warnings
    }
}

/// Configuration for the LLM backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai", "anthropic", "ollama".
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o", "llama3.1:8b").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Inline API key. Prefer `api_key_env`; never written by `config init`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Retries for transient errors (rate limit, timeout, connection).
    pub max_retries: usize,
    /// Base delay for exponential backoff between retries.
    pub retry_base_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 2048,
            temperature: 0.7,
            top_p: 0.9,
            timeout_secs: 120,
            max_retries: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

impl LlmConfig {
    /// Return human-readable warnings for suspicious values.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !(0.0..=2.0).contains(&self.temperature) {
            warnings.push(format!(
                "llm.temperature = {} is outside the usual 0.0-2.0 range",
                self.temperature
            ));
        }
        if self.timeout_secs == 0 {
            warnings.push("llm.timeout_secs = 0 disables the request timeout".to_string());
        }
        if self.model.trim().is_empty() {
            warnings.push("llm.model is empty".to_string());
        }
        warnings
    }
}

/// Per-provider search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Environment variable holding the credential. `None` for keyless providers.
    pub api_key_env: Option<String>,
    /// Inline credential; takes precedence over `api_key_env`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Override of `search.max_results` for this provider.
    pub max_results: Option<usize>,
    /// Set to false to keep a provider out of the chain entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::keyless()
    }
}

impl ProviderSettings {
    pub fn keyed(env: &str) -> Self {
        Self {
            api_key_env: Some(env.to_string()),
            api_key: None,
            max_results: None,
            enabled: true,
        }
    }

    pub fn keyless() -> Self {
        Self {
            api_key_env: None,
            api_key: None,
            max_results: None,
            enabled: true,
        }
    }

    /// Resolve the credential from the inline value or the environment.
    ///
    /// Blank values count as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
            })
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

/// Configuration for the provider fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Provider tried first.
    pub default_provider: String,
    /// Remaining providers in preference order.
    pub fallback_order: Vec<String>,
    /// Consecutive rate-limit/auth failures before a provider is disabled.
    pub disable_after: u32,
    /// Timeout applied to every provider call.
    pub call_timeout_secs: u64,
    /// Requests per minute across all providers (0 = unlimited).
    pub requests_per_minute: usize,
    /// Default number of results requested per query.
    pub max_results: usize,
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert("brave".to_string(), ProviderSettings::keyed("BRAVE_API_KEY"));
        providers.insert(
            "tavily".to_string(),
            ProviderSettings::keyed("TAVILY_API_KEY"),
        );
        providers.insert("exa".to_string(), ProviderSettings::keyed("EXA_API_KEY"));
        providers.insert("bing".to_string(), ProviderSettings::keyed("BING_API_KEY"));
        providers.insert("duckduckgo".to_string(), ProviderSettings::keyless());
        providers.insert("arxiv".to_string(), ProviderSettings::keyless());

        Self {
            default_provider: "brave".to_string(),
            fallback_order: vec![
                "exa".to_string(),
                "bing".to_string(),
                "brave".to_string(),
                "tavily".to_string(),
                "duckduckgo".to_string(),
            ],
            disable_after: 2,
            call_timeout_secs: 15,
            requests_per_minute: 10,
            max_results: 10,
            providers,
        }
    }
}

impl SearchConfig {
    /// Settings for a provider, falling back to keyless defaults when absent.
    pub fn settings(&self, name: &str) -> ProviderSettings {
        self.providers
            .get(name)
            .cloned()
            .unwrap_or_else(ProviderSettings::keyless)
    }

    /// Number of results to request from a provider.
    pub fn max_results_for(&self, name: &str) -> usize {
        self.providers
            .get(name)
            .and_then(|s| s.max_results)
            .unwrap_or(self.max_results)
    }

    /// Default provider followed by the fallback order, without duplicates.
    pub fn preference_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        let names = std::iter::once(&self.default_provider).chain(self.fallback_order.iter());
        for name in names {
            let name = name.trim().to_lowercase();
            if !name.is_empty() && !order.contains(&name) {
                order.push(name);
            }
        }
        order
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.disable_after == 0 {
            warnings.push(
                "search.disable_after = 0; providers will be disabled on their first rate limit"
                    .to_string(),
            );
        }
        if self.call_timeout_secs == 0 {
            warnings.push(
                "search.call_timeout_secs = 0; a hung provider would stall command handling"
                    .to_string(),
            );
        }
        if self.max_results == 0 {
            warnings.push("search.max_results = 0; searches will request nothing".to_string());
        }
        warnings
    }
}

/// Configuration for the research loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Focus areas produced per planning round.
    pub focus_areas_per_round: usize,
    /// Search queries a focus area may spend before it is exhausted.
    pub queries_per_area: usize,
    /// Search queries issued per controller step.
    pub queries_per_step: usize,
    /// Candidate results fetched per step.
    pub max_selected_results: usize,
    /// Session-wide budget for prompt plus context, in characters.
    pub context_budget_chars: usize,
    /// Smallest per-entry share of the digest before older entries are dropped.
    pub min_entry_chars: usize,
    /// Optional cap on planning rounds; unbounded when absent.
    pub max_planning_rounds: Option<usize>,
    /// Prior Q&A turns replayed to the LLM during conversation.
    pub conversation_history_turns: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            focus_areas_per_round: 5,
            queries_per_area: 4,
            queries_per_step: 2,
            max_selected_results: 3,
            context_budget_chars: 12_000,
            min_entry_chars: 200,
            max_planning_rounds: None,
            conversation_history_turns: 3,
        }
    }
}

impl ResearchConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.focus_areas_per_round == 0 {
            warnings.push(
                "research.focus_areas_per_round = 0; the planner will never produce work"
                    .to_string(),
            );
        }
        if self.queries_per_step == 0 {
            warnings.push(
                "research.queries_per_step = 0; treating it as 1 query per step".to_string(),
            );
        }
        if self.queries_per_area < self.queries_per_step {
            warnings.push(format!(
                "research.queries_per_area ({}) is below queries_per_step ({}); each area gets a single step",
                self.queries_per_area, self.queries_per_step
            ));
        }
        if self.context_budget_chars < 2_000 {
            warnings.push(format!(
                "research.context_budget_chars = {} leaves little room for evidence",
                self.context_budget_chars
            ));
        }
        if self.max_planning_rounds == Some(0) {
            warnings.push("research.max_planning_rounds = 0; no research will run".to_string());
        }
        warnings
    }
}

/// Configuration for the page fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Extracted text beyond this length is cut.
    pub max_content_chars: usize,
    pub max_redirects: usize,
    /// Retries after a network error or a 5xx response.
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    /// Skip pages the site's robots.txt disallows for our user agent.
    pub respect_robots_txt: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("Delve/", env!("CARGO_PKG_VERSION"), " (+research assistant)")
                .to_string(),
            timeout_secs: 10,
            max_content_chars: 2_400,
            max_redirects: 5,
            max_retries: 3,
            retry_base_delay_ms: 500,
            respect_robots_txt: false,
        }
    }
}

/// Where research logs and session snapshots go.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub log_dir: Option<PathBuf>,
}

impl OutputConfig {
    /// Configured directory, or `<data dir>/research`.
    pub fn resolve_log_dir(&self) -> PathBuf {
        if let Some(dir) = &self.log_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("dev", "delve", "delve")
            .map(|d| d.data_dir().join("research"))
            .unwrap_or_else(|| PathBuf::from(".delve").join("research"))
    }
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "delve", "delve")
        .map(|d| d.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".delve").join("config.toml")
}

/// Load configuration with layered sources.
///
/// Priority (highest first):
/// 1. Environment variables (prefixed with `DELVE_`, `__` between sections)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`.delve/config.toml`)
/// 4. User config (`~/.config/delve/config.toml`)
/// 5. Built-in defaults
///
/// CLI flags are applied by the caller on the returned value.
pub fn load_config(
    workspace: Option<&Path>,
    explicit_file: Option<&Path>,
) -> Result<DelveConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(DelveConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit_file {
        figment = figment.merge(Toml::file(path));
    }

    // DELVE_LLM__MODEL, DELVE_RESEARCH__QUERIES_PER_AREA, ...
    figment = figment.merge(Env::prefixed("DELVE_").split("__"));

    figment.extract().map_err(Box::new)
}

/// Check whether any Delve configuration file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DelveConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.search.default_provider, "brave");
        assert_eq!(config.search.disable_after, 2);
        assert_eq!(config.research.focus_areas_per_round, 5);
        assert_eq!(config.research.context_budget_chars, 12_000);
        assert_eq!(config.scraper.max_content_chars, 2_400);
        assert_eq!(config.scraper.max_retries, 3);
        assert!(!config.scraper.respect_robots_txt);
        assert!(config.research.max_planning_rounds.is_none());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = DelveConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: DelveConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.llm.model, config.llm.model);
        assert_eq!(parsed.search.fallback_order, config.search.fallback_order);
        assert_eq!(
            parsed.research.queries_per_area,
            config.research.queries_per_area
        );
    }

    #[test]
    fn test_inline_keys_not_serialized() {
        let mut config = DelveConfig::default();
        config.llm.api_key = Some("sk-secret".into());
        if let Some(brave) = config.search.providers.get_mut("brave") {
            brave.api_key = Some("brave-secret".into());
        }
        let toml_str = toml::to_string(&config).unwrap();
        assert!(!toml_str.contains("sk-secret"));
        assert!(!toml_str.contains("brave-secret"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let parsed: DelveConfig = toml::from_str(
            r#"
            [research]
            queries_per_area = 6
            "#,
        )
        .unwrap();
        assert_eq!(parsed.research.queries_per_area, 6);
        assert_eq!(parsed.research.focus_areas_per_round, 5);
        assert_eq!(parsed.search.default_provider, "brave");
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let delve_dir = dir.path().join(".delve");
        std::fs::create_dir_all(&delve_dir).unwrap();
        std::fs::write(
            delve_dir.join("config.toml"),
            r#"
            [search]
            default_provider = "tavily"
            disable_after = 3

            [research]
            max_planning_rounds = 2
            "#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.search.default_provider, "tavily");
        assert_eq!(config.search.disable_after, 3);
        assert_eq!(config.research.max_planning_rounds, Some(2));
    }

    #[test]
    fn test_load_config_explicit_file_wins_over_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let delve_dir = dir.path().join(".delve");
        std::fs::create_dir_all(&delve_dir).unwrap();
        std::fs::write(
            delve_dir.join("config.toml"),
            "[llm]\nmodel = \"workspace-model\"\n",
        )
        .unwrap();
        let explicit = dir.path().join("custom.toml");
        std::fs::write(&explicit, "[llm]\nmodel = \"explicit-model\"\n").unwrap();

        let config = load_config(Some(dir.path()), Some(&explicit)).unwrap();
        assert_eq!(config.llm.model, "explicit-model");
    }

    #[test]
    fn test_preference_order_dedups() {
        let config = SearchConfig {
            default_provider: "Exa".into(),
            fallback_order: vec!["exa".into(), "brave".into(), "".into(), "brave".into()],
            ..SearchConfig::default()
        };
        assert_eq!(config.preference_order(), vec!["exa", "brave"]);
    }

    #[test]
    fn test_max_results_override() {
        let mut config = SearchConfig::default();
        config.providers.get_mut("exa").unwrap().max_results = Some(4);
        assert_eq!(config.max_results_for("exa"), 4);
        assert_eq!(config.max_results_for("brave"), 10);
        assert_eq!(config.max_results_for("unknown"), 10);
    }

    #[test]
    fn test_resolve_api_key_prefers_inline_and_ignores_blank() {
        let settings = ProviderSettings {
            api_key_env: Some("DELVE_TEST_KEY_THAT_IS_NEVER_SET".into()),
            api_key: Some("  inline  ".into()),
            max_results: None,
            enabled: true,
        };
        assert_eq!(settings.resolve_api_key().as_deref(), Some("inline"));

        let blank = ProviderSettings {
            api_key: Some("   ".into()),
            ..ProviderSettings::keyed("DELVE_TEST_KEY_THAT_IS_NEVER_SET")
        };
        assert!(blank.resolve_api_key().is_none());
        assert!(ProviderSettings::keyless().resolve_api_key().is_none());
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = DelveConfig::default();
        assert!(config.validate().is_empty());

        config.research.queries_per_step = 0;
        config.research.max_planning_rounds = Some(0);
        config.llm.temperature = 3.5;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
    }
}
