use serde_json::Value;

use crate::config::Config;

/// The execution context handed to every task body.
///
/// It borrows the executor's configuration as it stands for the current call.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    config: &'a Config,
}

impl<'a> Context<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Context { config }
    }

    #[must_use]
    pub fn config(&self) -> &'a Config {
        self.config
    }

    /// Value at a dotted configuration path
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&'a Value> {
        self.config.get(path)
    }
}
