use std::collections::HashMap;
use std::time::Duration;

use crate::contracts::ConfigError;
use crate::storage::format::CounterTemplate;
use crate::storage::retry::RetryConfig;

/// Configuration for [`StoreSequenceGenerator`](crate::storage::StoreSequenceGenerator).
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Retry policy applied around the whole transactional attempt.
    pub retry: RetryConfig,
    /// Upper bound for a single `next` call, including retries.
    /// `None` disables the deadline.
    pub operation_timeout: Option<Duration>,
    /// Explicit templates for counters created on first use. Names without
    /// an entry get a derived prefix.
    pub templates: HashMap<String, CounterTemplate>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            operation_timeout: Some(Duration::from_secs(30)),
            templates: HashMap::new(),
        }
    }
}

impl GeneratorConfig {
    /// Creates a GeneratorConfig from environment variables.
    ///
    /// Environment variables:
    /// - `DOCSEQ_MAX_RETRIES`, `DOCSEQ_RETRY_INITIAL_MS`, `DOCSEQ_RETRY_MAX_MS`:
    ///   see [`RetryConfig::from_env`]
    /// - `DOCSEQ_TIMEOUT_MS`: per-call deadline in ms, `0` disables (default: 30000)
    /// - `DOCSEQ_TEMPLATES`: JSON object mapping sequence names to templates,
    ///   e.g. `{"SalesInvoice": {"prefix": "S", "pad_width": 6}}`
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();

        let operation_timeout = match var("DOCSEQ_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => default.operation_timeout,
        };

        let templates = var("DOCSEQ_TEMPLATES")
            .and_then(|raw| {
                serde_json::from_str::<HashMap<String, CounterTemplate>>(&raw)
                    .map_err(|e| {
                        tracing::warn!(error = %e, "Ignoring malformed DOCSEQ_TEMPLATES");
                    })
                    .ok()
            })
            .unwrap_or_default()
            .into_iter()
            .filter(|(name, template)| match template_problem(name, template) {
                Some(reason) => {
                    tracing::warn!(sequence = %name, reason, "Ignoring invalid template");
                    false
                }
                None => true,
            })
            .collect();

        Self {
            retry: RetryConfig::from_vars(&var),
            operation_timeout,
            templates,
        }
    }

    /// Registers an explicit template for `name`.
    pub fn with_template(mut self, name: impl Into<String>, template: CounterTemplate) -> Self {
        self.templates.insert(name.into(), template);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Template for a counter created on first use of `name`.
    pub fn template_for(&self, name: &str) -> CounterTemplate {
        self.templates
            .get(name)
            .cloned()
            .unwrap_or_else(|| CounterTemplate::derived(name))
    }

    /// Rejects templates with `pad_width == 0` or a blank sequence name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, template) in &self.templates {
            if let Some(reason) = template_problem(name, template) {
                return Err(ConfigError::InvalidTemplate {
                    name: name.clone(),
                    reason: reason.into(),
                });
            }
        }
        Ok(())
    }
}

fn template_problem(name: &str, template: &CounterTemplate) -> Option<&'static str> {
    if name.trim().is_empty() {
        Some("sequence name must not be blank")
    } else if template.pad_width == 0 {
        Some("pad_width must be at least 1")
    } else {
        None
    }
}
