use crate::config::parser::ScoutConfig;

/// TTLs beyond this mostly serve stale desktop membership
const LONG_TTL_MS: u64 = 60_000;
/// Budgets beyond this make a discovery pass noticeably slow
const LONG_AX_BUDGET_MS: u64 = 500;
const HIGH_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub severity: ValidationSeverity,
    pub field: &'static str,
    pub message: String,
}

impl ValidationResult {
    fn error(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Error,
            field,
            message: message.into(),
        }
    }

    fn warning(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Warning,
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_full_config(&self, config: &ScoutConfig) -> Vec<ValidationResult> {
        let mut results = Vec::new();

        let ttl = config.cache.ttl_ms;
        if ttl == 0 {
            results.push(ValidationResult::error(
                "cache.ttl_ms",
                "Cache TTL must be greater than zero",
            ));
        } else if ttl > LONG_TTL_MS {
            results.push(ValidationResult::warning(
                "cache.ttl_ms",
                format!("A TTL of {}ms will often return stale desktop data", ttl),
            ));
        }

        let discovery = &config.discovery;
        if discovery.ax_budget_ms == 0 {
            results.push(ValidationResult::error(
                "discovery.ax_budget_ms",
                "Accessibility budget must be greater than zero",
            ));
        } else if discovery.ax_budget_ms > LONG_AX_BUDGET_MS {
            results.push(ValidationResult::warning(
                "discovery.ax_budget_ms",
                format!(
                    "Per-process budget of {}ms may stall discovery",
                    discovery.ax_budget_ms
                ),
            ));
        }
        if discovery.auxiliary_min_width == 0 || discovery.auxiliary_min_height == 0 {
            results.push(ValidationResult::error(
                "discovery.auxiliary_min_*",
                "Auxiliary window thresholds must be positive",
            ));
        }
        if discovery.title_cache_capacity == 0 {
            results.push(ValidationResult::error(
                "discovery.title_cache_capacity",
                "Title cache needs room for at least one entry",
            ));
        }

        let concurrency = config.activation.max_concurrent;
        if concurrency == 0 {
            results.push(ValidationResult::error(
                "activation.max_concurrent",
                "At least one activation must be allowed to run",
            ));
        } else if concurrency > HIGH_CONCURRENCY {
            results.push(ValidationResult::warning(
                "activation.max_concurrent",
                format!("{} concurrent activations will fight over focus", concurrency),
            ));
        }

        if let Some(dir) = &config.diagnostics.dump_dir {
            if dir.is_relative() {
                results.push(ValidationResult::warning(
                    "diagnostics.dump_dir",
                    format!("'{}' is relative to the working directory", dir.display()),
                ));
            }
        }

        results
    }
}
