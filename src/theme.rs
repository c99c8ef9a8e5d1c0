use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Theme {
    #[default]
    #[serde(rename = "tokyo-dark")]
    TokyoDark,
    #[serde(rename = "tokyo-light")]
    TokyoLight,
}

impl Theme {
    pub fn name(self) -> &'static str {
        match self {
            Theme::TokyoDark => "tokyo-dark",
            Theme::TokyoLight => "tokyo-light",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::TokyoDark => Theme::TokyoLight,
            Theme::TokyoLight => Theme::TokyoDark,
        }
    }

    /// Headings and the primary figure.
    pub fn accent(self, text: &str) -> String {
        match self {
            Theme::TokyoDark => text.bright_magenta().bold().to_string(),
            Theme::TokyoLight => text.blue().bold().to_string(),
        }
    }

    /// Secondary labels.
    pub fn muted(self, text: &str) -> String {
        match self {
            Theme::TokyoDark => text.bright_black().to_string(),
            Theme::TokyoLight => text.dimmed().to_string(),
        }
    }

    pub fn error(self, text: &str) -> String {
        text.red().to_string()
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tokyo-dark" => Ok(Theme::TokyoDark),
            "tokyo-light" => Ok(Theme::TokyoLight),
            other => anyhow::bail!("unknown theme '{other}' (expected tokyo-dark or tokyo-light)"),
        }
    }
}

/// On-disk shape of the state file: a single `theme` entry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    theme: Option<String>,
}

/// The persisted theme flag.
///
/// Passed to whatever renders, rather than looked up globally.
#[derive(Debug, Clone)]
pub struct ThemeStore {
    path: PathBuf,
    current: Theme,
}

impl ThemeStore {
    /// Read the persisted theme. A missing file or unknown value yields the
    /// default theme.
    pub fn init(path: &Path) -> Result<Self> {
        let current = match std::fs::read_to_string(path) {
            Ok(contents) => {
                let stored: StoredState = toml::from_str(&contents)
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                match stored.theme.as_deref().map(str::parse::<Theme>) {
                    Some(Ok(theme)) => theme,
                    Some(Err(e)) => {
                        warn!("Ignoring stored theme: {e}");
                        Theme::default()
                    }
                    None => Theme::default(),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Theme::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            current,
        })
    }

    pub fn get(&self) -> Theme {
        self.current
    }

    /// Apply and persist `theme`.
    pub fn set(&mut self, theme: Theme) -> Result<()> {
        let stored = StoredState {
            theme: Some(theme.name().to_string()),
        };
        let contents = toml::to_string_pretty(&stored).context("failed to serialize theme")?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        self.current = theme;
        info!("Theme set to {theme}");
        Ok(())
    }

    pub fn toggle(&mut self) -> Result<Theme> {
        let next = self.current.toggled();
        self.set(next)?;
        Ok(next)
    }
}
