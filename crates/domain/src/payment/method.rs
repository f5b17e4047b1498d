//! Payment methods and their installment policies.

use common::{Money, PaymentMethodId};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::error::{DomainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethodKind {
    Money,
    Bill,
    Check,
    Card,
    Finance,
    StoreCredit,
    Deposit,
}

impl PaymentMethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodKind::Money => "money",
            PaymentMethodKind::Bill => "bill",
            PaymentMethodKind::Check => "check",
            PaymentMethodKind::Card => "card",
            PaymentMethodKind::Finance => "finance",
            PaymentMethodKind::StoreCredit => "store_credit",
            PaymentMethodKind::Deposit => "deposit",
        }
    }

    /// Incoming payments with this method need a known payer.
    pub fn requires_payer(&self) -> bool {
        matches!(self, PaymentMethodKind::Bill | PaymentMethodKind::StoreCredit)
    }
}

impl std::fmt::Display for PaymentMethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A configured way of paying.
///
/// Rates are percentages: `interest` is monthly, `daily_interest` accrues
/// per day late and `penalty` applies once a payment is overdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub kind: PaymentMethodKind,
    pub description: String,
    pub is_active: bool,
    /// Overrides the configured default for non-money methods.
    pub max_installments: Option<u32>,
    pub interest: Decimal,
    pub daily_interest: Decimal,
    pub penalty: Decimal,
}

impl PaymentMethod {
    pub fn new(kind: PaymentMethodKind, description: impl Into<String>) -> Self {
        Self {
            id: PaymentMethodId::new(),
            kind,
            description: description.into(),
            is_active: true,
            max_installments: None,
            interest: Decimal::ZERO,
            daily_interest: Decimal::ZERO,
            penalty: Decimal::ZERO,
        }
    }

    pub fn with_interest(mut self, monthly: Decimal) -> Self {
        self.interest = monthly;
        self
    }

    pub fn with_late_fees(mut self, penalty: Decimal, daily_interest: Decimal) -> Self {
        self.penalty = penalty;
        self.daily_interest = daily_interest;
        self
    }

    pub fn with_max_installments(mut self, max: u32) -> Self {
        self.max_installments = Some(max);
        self
    }

    /// Money is always paid at once.
    pub fn max_installments(&self, config: &CoreConfig) -> u32 {
        match self.kind {
            PaymentMethodKind::Money => 1,
            _ => self
                .max_installments
                .unwrap_or(config.default_max_installments),
        }
    }

    pub fn validate_installment_count(&self, count: usize, config: &CoreConfig) -> Result<()> {
        let max = self.max_installments(config);
        if count == 0 || count > max as usize {
            return Err(DomainError::InvalidInstallmentCount { count, max });
        }
        Ok(())
    }

    /// Accepts a monthly interest percentage in `0..=100`.
    ///
    /// With mandatory interest configured it must also equal this method's rate.
    pub fn validate_interest(&self, value: Decimal, config: &CoreConfig) -> Result<()> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(DomainError::InvalidInterest {
                value,
                reason: "interest must be between 0 and 100".to_string(),
            });
        }
        if config.mandatory_interest && value != self.interest {
            return Err(DomainError::InvalidInterest {
                value,
                reason: format!("interest is mandatory at {}", self.interest),
            });
        }
        Ok(())
    }
}

/// Value of one of `installments` equal payments of `total`.
///
/// Without interest this is `total / n`; with a monthly rate `i` (as a
/// fraction) it is the annuity `total · i / (1 − (1 + i)^−n)`. The result is
/// not rounded.
pub fn calculate_installment_value(
    total: Money,
    installments: u32,
    monthly_interest: Decimal,
) -> Result<Money> {
    if installments == 0 {
        return Err(DomainError::InvalidInstallmentCount {
            count: 0,
            max: u32::MAX,
        });
    }
    let n = Decimal::from(installments);
    if monthly_interest.is_zero() {
        return total
            .divide(n)
            .ok_or_else(|| DomainError::InvalidValue("installment division".to_string()));
    }

    let rate = monthly_interest / Decimal::ONE_HUNDRED;
    // i / (1 - (1 + i)^-n) == i * f / (f - 1) with f = (1 + i)^n
    let factor = (Decimal::ONE + rate)
        .checked_powi(i64::from(installments))
        .ok_or_else(|| DomainError::InvalidInterest {
            value: monthly_interest,
            reason: "interest factor overflows".to_string(),
        })?;
    let denominator = factor - Decimal::ONE;
    if denominator.is_zero() {
        return Err(DomainError::InvalidInterest {
            value: monthly_interest,
            reason: "interest too small".to_string(),
        });
    }
    Ok(total.multiply(rate * factor / denominator).round_internal())
}

/// Cent values of `installments` payments of `total`.
///
/// The values sum exactly to `total` without interest, or to the rounded
/// interest-adjusted total with it. Every installment is truncated to the
/// cent and the first absorbs the residual, so none is below the others.
pub fn installment_values(
    total: Money,
    installments: u32,
    monthly_interest: Decimal,
) -> Result<Vec<Money>> {
    let raw = calculate_installment_value(total, installments, monthly_interest)?;
    let n = Decimal::from(installments);

    let adjusted_total = if monthly_interest.is_zero() {
        total.round()
    } else {
        raw.multiply(n).round()
    };
    let each = raw.truncate();

    let rest = each.multiply(n - Decimal::ONE);
    let mut values = vec![each; installments as usize];
    values[0] = adjusted_total - rest;
    Ok(values)
}
