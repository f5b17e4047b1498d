//! Card and check metadata attached to payments.

use common::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardType {
    Credit,
    Debit,
    CreditInstallmentsStore,
    CreditInstallmentsProvider,
    DebitPreDated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardData {
    pub provider: String,
    pub card_type: CardType,
    pub auth: Option<String>,
    pub device: Option<String>,
    /// Percentage the provider keeps.
    pub fee: Decimal,
    /// Fixed amount charged per operation.
    pub fare: Money,
}

impl CardData {
    pub fn new(provider: impl Into<String>, card_type: CardType) -> Self {
        Self {
            provider: provider.into(),
            card_type,
            auth: None,
            device: None,
            fee: Decimal::ZERO,
            fare: Money::zero(),
        }
    }

    /// Amount the provider keeps from a payment of `value`.
    pub fn fee_value(&self, value: Money) -> Money {
        (value.multiply(self.fee / Decimal::ONE_HUNDRED) + self.fare).round()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckData {
    pub bank_number: String,
    pub branch: String,
    pub account: String,
    pub check_number: String,
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn card_data_survives_serialization() {
        let mut data = CardData::new("Cielo", CardType::CreditInstallmentsProvider);
        data.auth = Some("A1B2".to_string());
        data.device = Some("POS-3".to_string());
        data.fee = dec!(2.5);
        data.fare = Money::from_cents(35);

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["card_type"], "CREDIT_INSTALLMENTS_PROVIDER");
        let back: CardData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn fee_value_adds_fare() {
        let mut data = CardData::new("Rede", CardType::Debit);
        data.fee = dec!(2);
        data.fare = Money::from_cents(50);
        assert_eq!(data.fee_value(Money::from_cents(10000)), Money::from_cents(250));
    }
}
