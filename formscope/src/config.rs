//! Runtime configuration for the instrumentation
//!
//! Read once from the environment at install time:
//!
//! | Variable            | Effect                                              |
//! |---------------------|-----------------------------------------------------|
//! | `FORMSCOPE_DEBUG`   | log contained interception failures                 |
//! | `FORMSCOPE_VERBOSE` | log installation progress at info level             |
//! | `FORMSCOPE_CAPTURE` | comma list of `forms`, `references`, `units`, or `none` |

use log::warn;

use crate::bridge::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentationConfig {
    pub debug: bool,
    pub verbose: bool,
    pub capture_forms: bool,
    pub capture_references: bool,
    pub capture_units: bool,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            debug: false,
            verbose: false,
            capture_forms: true,
            capture_references: true,
            capture_units: true,
        }
    }
}

impl InstrumentationConfig {
    pub const DEBUG_VAR: &'static str = "FORMSCOPE_DEBUG";
    pub const VERBOSE_VAR: &'static str = "FORMSCOPE_VERBOSE";
    pub const CAPTURE_VAR: &'static str = "FORMSCOPE_CAPTURE";

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup(Self::DEBUG_VAR) {
            config.debug = parse_flag(&value);
        }
        if let Some(value) = lookup(Self::VERBOSE_VAR) {
            config.verbose = parse_flag(&value);
        }
        if let Some(value) = lookup(Self::CAPTURE_VAR) {
            config.set_capture_list(&value);
        }
        config
    }

    fn set_capture_list(&mut self, list: &str) {
        self.capture_forms = false;
        self.capture_references = false;
        self.capture_units = false;
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.to_ascii_lowercase().as_str() {
                "forms" => self.capture_forms = true,
                "references" | "refs" => self.capture_references = true,
                "units" => self.capture_units = true,
                "all" => {
                    self.capture_forms = true;
                    self.capture_references = true;
                    self.capture_units = true;
                }
                "none" => {}
                other => warn!("Ignoring unknown capture category '{other}' in {}", Self::CAPTURE_VAR),
            }
        }
    }

    /// Push the capture toggles into `session`'s bridges.
    pub fn apply(&self, session: &Session) {
        session.set_forms_enabled(self.capture_forms);
        session.set_references_enabled(self.capture_references);
        session.set_units_enabled(self.capture_units);
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_capture_everything() {
        let config = InstrumentationConfig::from_lookup(|_| None);
        assert_eq!(config, InstrumentationConfig::default());
        assert!(config.capture_forms && config.capture_references && config.capture_units);
    }

    #[test]
    fn test_flags() {
        let config = InstrumentationConfig::from_lookup(lookup(&[
            ("FORMSCOPE_DEBUG", "true"),
            ("FORMSCOPE_VERBOSE", "0"),
        ]));
        assert!(config.debug);
        assert!(!config.verbose);
    }

    #[test]
    fn test_capture_list() {
        let config = InstrumentationConfig::from_lookup(lookup(&[("FORMSCOPE_CAPTURE", "forms, Units")]));
        assert!(config.capture_forms);
        assert!(!config.capture_references);
        assert!(config.capture_units);

        let none = InstrumentationConfig::from_lookup(lookup(&[("FORMSCOPE_CAPTURE", "none")]));
        assert!(!none.capture_forms && !none.capture_references && !none.capture_units);
    }

    #[test]
    fn test_apply_toggles_bridges() {
        let session = Session::new();
        let config = InstrumentationConfig { capture_units: false, ..InstrumentationConfig::default() };
        config.apply(&session);
        assert!(session.forms().is_enabled());
        assert!(!session.units().is_enabled());
    }
}
