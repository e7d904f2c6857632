use std::path::PathBuf;

use crate::{db, llm};

/**
 * \brief Runtime settings, read from the environment with defaults.
 * \details `FINAI_DB`, `FINAI_API_BASE`, `FINAI_MODEL`, `FINAI_TELEMETRY`,
 * `FINAI_UI_DIR`. Command line flags override these in the CLI.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /** \brief SQLite file holding the API key. */
    pub db_path: PathBuf,
    /** \brief Gemini API base address. */
    pub api_base: String,
    /** \brief Gemini model name. */
    pub model: String,
    /** \brief Whether telemetry lines are written to logs/. */
    pub telemetry: bool,
    /** \brief Static front-end directory served by `serve`. */
    pub ui_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(db::DEFAULT_DB_PATH),
            api_base: llm::DEFAULT_API_BASE.to_string(),
            model: llm::DEFAULT_MODEL.to_string(),
            telemetry: false,
            ui_dir: PathBuf::from("web"),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /**
     * \brief Build settings from an arbitrary variable lookup; blank values are ignored.
     */
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            db_path: get("FINAI_DB").map(PathBuf::from).unwrap_or(defaults.db_path),
            api_base: get("FINAI_API_BASE").unwrap_or(defaults.api_base),
            model: get("FINAI_MODEL").unwrap_or(defaults.model),
            telemetry: get("FINAI_TELEMETRY")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.telemetry),
            ui_dir: get("FINAI_UI_DIR").map(PathBuf::from).unwrap_or(defaults.ui_dir),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
