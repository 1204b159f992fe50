//! Session configuration from environment variables

use std::env;

use shakmaty::Color;
use tracing::info;

use crate::error::EngineError;

/// `ENGINE_PATH` value selecting the in-process material engine
pub const BUILTIN_ENGINE: &str = "builtin";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Path to the UCI engine binary, or `builtin`
    pub engine_path: String,

    /// Search budget per position; `None` searches until stopped
    pub search_ms: Option<u64>,

    /// Extra `setoption`s sent after the analysis defaults
    pub engine_options: Vec<(String, String)>,

    /// Side the user plays; `None` is free analysis
    pub player_color: Option<Color>,
}

impl SessionConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, EngineError> {
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        info!(
            engine_path = %config.engine_path,
            search_ms = ?config.search_ms,
            options = config.engine_options.len(),
            "Session config loaded"
        );
        Ok(config)
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let engine_path = var("ENGINE_PATH")
            .or_else(|| var("STOCKFISH_PATH"))
            .unwrap_or_else(|| "/usr/local/bin/stockfish".to_string());

        let search_ms = match var("SEARCH_MS") {
            None => Some(2000),
            Some(v) => match v
                .trim()
                .parse::<u64>()
                .map_err(|_| EngineError::Config("SEARCH_MS must be a number of milliseconds"))?
            {
                0 => None,
                ms => Some(ms),
            },
        };

        let engine_options = match var("ENGINE_OPTIONS") {
            Some(v) => parse_options(&v)?,
            None => Vec::new(),
        };

        let player_color = match var("PLAYER_COLOR").as_deref().map(str::trim) {
            None | Some("") => None,
            Some(c) if c.eq_ignore_ascii_case("white") => Some(Color::White),
            Some(c) if c.eq_ignore_ascii_case("black") => Some(Color::Black),
            Some(_) => return Err(EngineError::Config("PLAYER_COLOR must be white or black")),
        };

        Ok(Self {
            engine_path,
            search_ms,
            engine_options,
            player_color,
        })
    }

    pub fn is_builtin(&self) -> bool {
        self.engine_path == BUILTIN_ENGINE
    }
}

/// Parse `Name=Value;Name=Value`
fn parse_options(raw: &str) -> Result<Vec<(String, String)>, EngineError> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, value) = entry
                .split_once('=')
                .ok_or(EngineError::Config("ENGINE_OPTIONS entries must be Name=Value"))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(EngineError::Config("ENGINE_OPTIONS entry has an empty name"));
            }
            Ok((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<SessionConfig, EngineError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SessionConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.engine_path, "/usr/local/bin/stockfish");
        assert_eq!(config.search_ms, Some(2000));
        assert!(config.engine_options.is_empty());
        assert_eq!(config.player_color, None);
        assert!(!config.is_builtin());
    }

    #[test]
    fn test_engine_path_fallback() {
        let config = load(&[("STOCKFISH_PATH", "/opt/sf")]).unwrap();
        assert_eq!(config.engine_path, "/opt/sf");
        let config = load(&[("STOCKFISH_PATH", "/opt/sf"), ("ENGINE_PATH", "builtin")]).unwrap();
        assert!(config.is_builtin());
    }

    #[test]
    fn test_search_ms_zero_is_infinite() {
        assert_eq!(load(&[("SEARCH_MS", "0")]).unwrap().search_ms, None);
        assert_eq!(load(&[("SEARCH_MS", "750")]).unwrap().search_ms, Some(750));
        assert!(matches!(load(&[("SEARCH_MS", "soon")]), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_engine_options() {
        let config = load(&[("ENGINE_OPTIONS", "Threads=2; Hash = 256;")]).unwrap();
        assert_eq!(
            config.engine_options,
            vec![
                ("Threads".to_string(), "2".to_string()),
                ("Hash".to_string(), "256".to_string())
            ]
        );
        assert!(load(&[("ENGINE_OPTIONS", "Threads")]).is_err());
        assert!(load(&[("ENGINE_OPTIONS", "=3")]).is_err());
    }

    #[test]
    fn test_player_color() {
        assert_eq!(load(&[("PLAYER_COLOR", "Black")]).unwrap().player_color, Some(Color::Black));
        assert!(load(&[("PLAYER_COLOR", "green")]).is_err());
    }
}
