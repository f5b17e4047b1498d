//! Core configuration loaded from environment variables.

/// Business parameters of the core, with defaults.
///
/// Reads from environment variables:
/// - `POS_MANDATORY_INTEREST`: installment interest must equal the method's rate (default: `false`)
/// - `POS_MAX_INSTALLMENTS`: default max installments for non-money methods (default: `12`)
/// - `POS_ALLOW_OUTDATED_OPERATIONS`: allow till entries on a till opened on a previous day (default: `false`)
/// - `POS_PAY_REFUNDS_THROUGH_TILL`: pay sale-return refunds from the sale's open till (default: `true`)
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub mandatory_interest: bool,
    pub default_max_installments: u32,
    pub allow_outdated_operations: bool,
    pub pay_refunds_through_till: bool,
}

impl CoreConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            mandatory_interest: env_flag("POS_MANDATORY_INTEREST")
                .unwrap_or(defaults.mandatory_interest),
            default_max_installments: std::env::var("POS_MAX_INSTALLMENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.default_max_installments),
            allow_outdated_operations: env_flag("POS_ALLOW_OUTDATED_OPERATIONS")
                .unwrap_or(defaults.allow_outdated_operations),
            pay_refunds_through_till: env_flag("POS_PAY_REFUNDS_THROUGH_TILL")
                .unwrap_or(defaults.pay_refunds_through_till),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            mandatory_interest: false,
            default_max_installments: 12,
            allow_outdated_operations: false,
            pay_refunds_through_till: true,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| parse_flag(&v))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = CoreConfig::default();
        assert!(!config.mandatory_interest);
        assert_eq!(config.default_max_installments, 12);
        assert!(!config.allow_outdated_operations);
        assert!(config.pay_refunds_through_till);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" YES "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
