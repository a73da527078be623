//! Display configuration
//!
//! Everything a registry needs to know up front: the theme, whether to color
//! status glyphs, how fast to animate, and whether to animate at all.
//! [`DisplayConfig::from_env`] layers the usual environment switches on top of
//! the defaults.

use std::time::Duration;

use spindle_term::Capabilities;
use tracing::{debug, warn};

use crate::theme::Theme;

/// When to color status glyphs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorChoice {
    /// Color if the terminal honors escape sequences.
    #[default]
    Auto,
    /// Always color.
    Always,
    /// Never color.
    Never,
}

impl ColorChoice {
    /// Decide for a concrete terminal.
    pub fn resolve(self, caps: &dyn Capabilities) -> bool {
        match self {
            Self::Auto => caps.supports_ansi_escapes(),
            Self::Always => true,
            Self::Never => false,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "always" => Some(Self::Always),
            "never" => Some(Self::Never),
            _ => None,
        }
    }
}

/// Settings shared by every spinner bound to one registry.
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    /// Frames, icons and colors.
    pub theme: Theme,
    /// Status glyph coloring.
    pub color: ColorChoice,
    /// Animation interval once a message is on screen.
    pub tick: Duration,
    /// Render plain lines even on an interactive terminal.
    pub force_plain: bool,
    /// Let Ctrl-C cancel blocking [`Spinner::run`](crate::Spinner::run)
    /// scopes. Installs a process-wide SIGINT handler on first use.
    pub catch_interrupts: bool,
}

impl DisplayConfig {
    /// Default animation interval.
    pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

    /// Defaults overridden by `NO_COLOR`, `SPINDLE_COLOR`, `SPINDLE_PLAIN`
    /// and `SPINDLE_TICK_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup("SPINDLE_COLOR") {
            if let Some(choice) = ColorChoice::parse(&value) {
                config.color = choice;
            } else {
                warn!(value, "ignoring invalid SPINDLE_COLOR");
            }
        }
        // https://no-color.org: any non-empty value disables color
        if lookup("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            config.color = ColorChoice::Never;
        }

        config.force_plain = lookup("SPINDLE_PLAIN").is_some_and(|v| flag(&v));

        if let Some(value) = lookup("SPINDLE_TICK_MS") {
            match value.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.tick = Duration::from_millis(ms),
                _ => warn!(value, "ignoring invalid SPINDLE_TICK_MS"),
            }
        }

        debug!(
            color = ?config.color,
            force_plain = config.force_plain,
            tick_ms = config.tick.as_millis() as u64,
            "display configuration"
        );
        config
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            color: ColorChoice::Auto,
            tick: Self::DEFAULT_TICK,
            force_plain: false,
            catch_interrupts: true,
        }
    }
}

fn flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_term::StaticCapabilities;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> DisplayConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        DisplayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_with(&[]);
        assert_eq!(config.color, ColorChoice::Auto);
        assert_eq!(config.tick, Duration::from_millis(50));
        assert!(!config.force_plain);
        assert!(config.catch_interrupts);
    }

    #[test]
    fn test_no_color_wins() {
        let config = config_with(&[("SPINDLE_COLOR", "always"), ("NO_COLOR", "1")]);
        assert_eq!(config.color, ColorChoice::Never);

        let config = config_with(&[("NO_COLOR", "")]);
        assert_eq!(config.color, ColorChoice::Auto);
    }

    #[test]
    fn test_color_choice_parse() {
        assert_eq!(config_with(&[("SPINDLE_COLOR", "Always")]).color, ColorChoice::Always);
        assert_eq!(config_with(&[("SPINDLE_COLOR", "bogus")]).color, ColorChoice::Auto);
    }

    #[test]
    fn test_plain_and_tick() {
        let config = config_with(&[("SPINDLE_PLAIN", "yes"), ("SPINDLE_TICK_MS", "120")]);
        assert!(config.force_plain);
        assert_eq!(config.tick, Duration::from_millis(120));

        let config = config_with(&[("SPINDLE_PLAIN", "0"), ("SPINDLE_TICK_MS", "0")]);
        assert!(!config.force_plain);
        assert_eq!(config.tick, DisplayConfig::DEFAULT_TICK);
    }

    #[test]
    fn test_color_resolution() {
        let tty = StaticCapabilities::interactive(80, 24);
        let pipe = StaticCapabilities::plain();
        assert!(ColorChoice::Auto.resolve(&tty));
        assert!(!ColorChoice::Auto.resolve(&pipe));
        assert!(ColorChoice::Always.resolve(&pipe));
        assert!(!ColorChoice::Never.resolve(&tty));
    }
}
