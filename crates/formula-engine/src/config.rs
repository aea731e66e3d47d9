//! Engine configuration.

use crate::error::ConfigError;
use formula_parser::ParserOptions;
use formula_types::Features;
use serde::Deserialize;
use tracing::Dispatch;

/// Default nesting limit for function calls during evaluation.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Everything an [`Engine`](crate::Engine) is constructed with.
///
/// Logging goes to `dispatch` only; the default discards everything, so an
/// engine never writes to a process-wide subscriber unless handed one.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub parser: ParserOptions,
    pub features: Features,
    pub max_call_depth: usize,
    pub dispatch: Dispatch,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parser: ParserOptions::default(),
            features: Features::default(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            dispatch: Dispatch::none(),
        }
    }
}

/// Plain-data part of [`EngineConfig`].
#[derive(Debug, Deserialize)]
#[serde(default)]
struct ConfigFile {
    parser: ParserOptions,
    features: Features,
    max_call_depth: usize,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            parser: config.parser,
            features: config.features,
            max_call_depth: config.max_call_depth,
        }
    }
}

impl EngineConfig {
    pub fn with_parser(mut self, parser: ParserOptions) -> Self {
        self.parser = parser;
        self
    }

    /// Accept `Set`, `;` chains and behavior functions.
    pub fn with_side_effects(mut self) -> Self {
        self.parser.allow_side_effects = true;
        self
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Load parser options, features and limits from JSON; missing keys
    /// take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(json)?;
        Ok(Self {
            parser: file.parser,
            features: file.features,
            max_call_depth: file.max_call_depth,
            ..Self::default()
        })
    }
}
