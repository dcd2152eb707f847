use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::buffer::Invalidation;

/// Defaults persisted as command-line flags, one per line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigFlags {
    pub soft_wrap_column: Option<usize>,
    pub no_soft_wrap: bool,
    pub invalidate: Option<Invalidation>,
    pub exclusive: bool,
    pub json: bool,
}

impl ConfigFlags {
    /// Merge `other` over `self`: options from `other` win, switches add up.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            soft_wrap_column: other.soft_wrap_column.or(self.soft_wrap_column),
            no_soft_wrap: self.no_soft_wrap || other.no_soft_wrap,
            invalidate: other.invalidate.or(self.invalidate),
            exclusive: self.exclusive || other.exclusive,
            json: self.json || other.json,
        }
    }

    /// The wrap width to display with; `--no-soft-wrap` beats any column.
    pub const fn effective_soft_wrap_column(&self) -> Option<usize> {
        if self.no_soft_wrap {
            None
        } else {
            self.soft_wrap_column
        }
    }
}

pub fn global_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("wrapmark").join("config");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("wrapmark")
                .join("config");
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("wrapmark").join("config");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join("wrapmark")
                .join("config");
        }
    }

    local_override_path()
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(".wrapmarkrc")
}

pub fn load_config_flags(path: &Path) -> Result<ConfigFlags> {
    if !path.exists() {
        return Ok(ConfigFlags::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let tokens = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split_whitespace().map(ToOwned::to_owned))
        .collect::<Vec<_>>();
    Ok(parse_flag_tokens(&tokens))
}

pub fn save_config_flags(path: &Path, flags: &ConfigFlags) -> Result<()> {
    let mut lines = vec!["# wrapmark defaults (saved with --save)".to_string()];
    if let Some(column) = flags.soft_wrap_column {
        lines.push(format!("--soft-wrap-column {column}"));
    }
    if flags.no_soft_wrap {
        lines.push("--no-soft-wrap".to_string());
    }
    if let Some(invalidate) = flags.invalidate {
        lines.push(format!("--invalidate {}", invalidate.as_str()));
    }
    if flags.exclusive {
        lines.push("--exclusive".to_string());
    }
    if flags.json {
        lines.push("--json".to_string());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    fs::write(path, format!("{}\n", lines.join("\n")))
        .with_context(|| format!("Failed to write config {}", path.display()))
}

pub fn clear_config_flags(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Pick the persistable flags out of raw arguments. Unknown tokens are skipped.
pub fn parse_flag_tokens(tokens: &[String]) -> ConfigFlags {
    let mut flags = ConfigFlags::default();
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if token == "--no-soft-wrap" {
            flags.no_soft_wrap = true;
        } else if token == "--exclusive" {
            flags.exclusive = true;
        } else if token == "--json" {
            flags.json = true;
        } else if token == "--soft-wrap-column" {
            if let Some(next) = tokens.get(i + 1) {
                flags.soft_wrap_column = next.parse().ok();
                i += 1;
            }
        } else if let Some(value) = token.strip_prefix("--soft-wrap-column=") {
            flags.soft_wrap_column = value.parse().ok();
        } else if token == "--invalidate" {
            if let Some(next) = tokens.get(i + 1) {
                flags.invalidate = parse_invalidation(next);
                i += 1;
            }
        } else if let Some(value) = token.strip_prefix("--invalidate=") {
            flags.invalidate = parse_invalidation(value);
        }
        i += 1;
    }
    flags
}

fn parse_invalidation(s: &str) -> Option<Invalidation> {
    Invalidation::from_str(s, true).ok()
}
