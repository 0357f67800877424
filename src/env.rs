use crate::command::Params;
use std::collections::BTreeMap;

/// Named string variables owned by a dispatcher.
///
/// Variables are set by commands (e.g. `setvar`) and read back when parameters
/// are substituted before a command runs.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    vars: BTreeMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value of a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override a variable.
    pub fn set(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Variable names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Replace every value written as `[name]` with the value of variable `name`.
    ///
    /// Unknown names keep the bracketed literal. Substitution is a single pass: a
    /// variable whose value itself looks like `[other]` is not expanded again.
    /// Keys are never touched.
    pub fn substitute(&self, mut params: Params) -> Params {
        for value in params.values_mut() {
            let replacement = value
                .strip_prefix('[')
                .and_then(|v| v.strip_suffix(']'))
                .and_then(|name| self.vars.get(name));
            if let Some(replacement) = replacement {
                *value = replacement.clone();
            }
        }
        params
    }
}
