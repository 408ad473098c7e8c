use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Immutable, process-wide scraping contract for one resort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountainConfig {
    pub id: String,
    pub display_name: String,
    pub canonical_url: String,

    /// Defaults to `canonical_url` when absent in the source file.
    #[serde(default)]
    pub data_url: Option<String>,

    #[serde(flatten)]
    pub strategy: StrategyParams,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub batch: Option<u32>,
}

fn default_enabled() -> bool {
    true
}

impl MountainConfig {
    /// The URL a strategy actually fetches: `data_url` if set, else `canonical_url`.
    pub fn data_url(&self) -> &str {
        self.data_url.as_deref().unwrap_or(&self.canonical_url)
    }
}

/// Strategy-tagged, strategy-specific parameters. The declared `strategy`
/// tag is what the Orchestrator's factory dispatches on, and serde rejects
/// a config whose fields don't match its declared tag at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyParams {
    StaticHtml(StaticHtmlParams),
    JsonApi(JsonApiParams),
    HeadlessBrowser(HeadlessParams),
}

impl StrategyParams {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyParams::StaticHtml(_) => "static_html",
            StrategyParams::JsonApi(_) => "json_api",
            StrategyParams::HeadlessBrowser(_) => "headless_browser",
        }
    }
}

/// Mapping of semantic field -> CSS selector, with optional regex fallbacks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticHtmlParams {
    pub selectors: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl Default for HttpMethod {
    fn default() -> Self {
        HttpMethod::Get
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonApiParams {
    pub endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Maps semantic field -> transform rule applied to the response body.
    pub transform: HashMap<String, TransformRule>,
}

/// The small primitive vocabulary allowed for JSON transforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformRule {
    /// Select a dotted path and coerce to an integer.
    Path { path: String },
    /// Select two dotted paths and produce an {open,total} ratio.
    Ratio { open_path: String, total_path: String },
    /// Select a dotted path and coerce to a 0-100 percent.
    Percent { path: String },
    /// Select a dotted path and coerce presence/truthiness to bool.
    PresenceBool { path: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeadlessParams {
    pub selectors: HashMap<String, String>,
    #[serde(default = "default_wait_network_idle")]
    pub wait_network_idle: bool,
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

fn default_wait_network_idle() -> bool {
    true
}

fn default_grace_secs() -> u64 {
    3
}
