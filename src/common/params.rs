//! Named parameter lists for control operations.
//!
//! Control calls across component boundaries (router <-> management
//! <-> layer 3) carry an operation token plus free-form key/value
//! pairs, matching the `control` contract of the external interfaces.

#[derive(Clone, Debug, Default)]
pub struct CtlParams {
    operation: Option<String>,
    pairs: Vec<(String, String)>,
}

impl CtlParams {
    pub fn new(operation: &str) -> Self {
        Self { operation: Some(operation.to_string()), pairs: Vec::new() }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        for (k, v) in self.pairs.iter_mut() {
            if k == key {
                *v = value;
                return;
            }
        }
        self.pairs.push((key.to_string(), value));
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim()) {
            Some("true") | Some("yes") | Some("on") | Some("1") => true,
            Some("false") | Some("no") | Some("off") | Some("0") => false,
            _ => default,
        }
    }

    /// Copy every pair of `other` into this list, overwriting existing
    /// keys.
    pub fn copy_from(&mut self, other: &CtlParams) {
        for (k, v) in &other.pairs {
            self.set(k, v.clone());
        }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}
