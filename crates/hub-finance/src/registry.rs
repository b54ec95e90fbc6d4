use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    FinanceError,
    method::{BankTransfer, Cash, PaymentMethod, PaymentMethodKind, Sepa},
};

/// Persisted shape of a payment method: common columns plus per-kind details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodRecord {
    pub id: Uuid,
    pub owner: Uuid,
    pub name: String,
    pub kind: String,
    pub details: serde_json::Value,
    pub currency: String,
    pub is_prepayment: bool,
    pub fee_absolute_value: Decimal,
    pub fee_relative_value: Decimal,
    pub fee_tax_rate: Decimal,
}

impl From<&PaymentMethod> for PaymentMethodRecord {
    fn from(method: &PaymentMethod) -> Self {
        Self {
            id: method.id,
            owner: method.owner,
            name: method.name.clone(),
            kind: method.kind.key().to_string(),
            details: method.kind.details(),
            currency: method.currency.clone(),
            is_prepayment: method.is_prepayment,
            fee_absolute_value: method.fee_absolute_value,
            fee_relative_value: method.fee_relative_value,
            fee_tax_rate: method.fee_tax_rate,
        }
    }
}

pub type Decoder = fn(&serde_json::Value) -> Result<PaymentMethodKind, serde_json::Error>;

/// Resolves stored payment methods to their concrete variant by kind key.
#[derive(Debug, Clone, Default)]
pub struct PaymentMethodRegistry {
    decoders: BTreeMap<&'static str, Decoder>,
}

impl PaymentMethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register("bank_transfer", |details| {
                BankTransfer::deserialize(details).map(PaymentMethodKind::BankTransfer)
            })
            .register("cash", |_| Ok(PaymentMethodKind::Cash(Cash)))
            .register("sepa", |details| {
                Sepa::deserialize(details).map(PaymentMethodKind::Sepa)
            });
        registry
    }

    pub fn register(&mut self, kind: &'static str, decoder: Decoder) -> &mut Self {
        self.decoders.insert(kind, decoder);
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    pub fn resolve(&self, record: &PaymentMethodRecord) -> Result<PaymentMethod, FinanceError> {
        let decode = self
            .decoders
            .get(record.kind.as_str())
            .ok_or_else(|| FinanceError::UnknownPaymentMethodKind(record.kind.clone()))?;
        let kind = decode(&record.details).map_err(|source| {
            FinanceError::InvalidPaymentMethodDetails {
                kind: record.kind.clone(),
                source,
            }
        })?;

        Ok(PaymentMethod {
            id: record.id,
            owner: record.owner,
            name: record.name.clone(),
            currency: record.currency.clone(),
            is_prepayment: record.is_prepayment,
            fee_absolute_value: record.fee_absolute_value,
            fee_relative_value: record.fee_relative_value,
            fee_tax_rate: record.fee_tax_rate,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use hub_core::BankAccount;
    use serde_json::json;

    use super::*;

    fn record(kind: &str, details: serde_json::Value) -> PaymentMethodRecord {
        PaymentMethodRecord {
            id: Uuid::new_v4(),
            owner: Uuid::new_v4(),
            name: "Default".to_string(),
            kind: kind.to_string(),
            details,
            currency: "EUR".to_string(),
            is_prepayment: false,
            fee_absolute_value: Decimal::ZERO,
            fee_relative_value: Decimal::ZERO,
            fee_tax_rate: Decimal::ZERO,
        }
    }

    #[test]
    fn resolves_builtin_kinds() {
        let registry = PaymentMethodRegistry::with_builtin();
        assert_eq!(
            registry.kinds().collect::<Vec<_>>(),
            vec!["bank_transfer", "cash", "sepa"]
        );

        let method = registry
            .resolve(&record(
                "sepa",
                json!({
                    "creditor_identifier": "DE98ZZZ09999999999",
                    "bank_account": {
                        "account_holder": "Coop",
                        "iban": "DE02120300000000202051",
                        "bic": "BYLADEM1001"
                    }
                }),
            ))
            .unwrap();
        let PaymentMethodKind::Sepa(sepa) = &method.kind else {
            panic!("expected sepa");
        };
        assert_eq!(sepa.creditor_identifier, "DE98ZZZ09999999999");
        assert_eq!(method.provider().verbose_name(), "SEPA direct debit");
    }

    #[test]
    fn record_round_trips_through_registry() {
        let registry = PaymentMethodRegistry::with_builtin();
        let method = registry
            .resolve(&record(
                "bank_transfer",
                serde_json::to_value(BankTransfer {
                    bank_account: BankAccount {
                        account_holder: "Coop".to_string(),
                        iban: "DE02120300000000202051".to_string(),
                        bic: "BYLADEM1001".to_string(),
                    },
                })
                .unwrap(),
            ))
            .unwrap();
        let again = registry.resolve(&PaymentMethodRecord::from(&method)).unwrap();
        assert_eq!(again, method);
    }

    #[test]
    fn unknown_kind_and_bad_details_are_errors() {
        let registry = PaymentMethodRegistry::with_builtin();
        assert!(matches!(
            registry.resolve(&record("paypal", json!({}))),
            Err(FinanceError::UnknownPaymentMethodKind(kind)) if kind == "paypal"
        ));
        assert!(matches!(
            registry.resolve(&record("sepa", json!({"creditor_identifier": 5}))),
            Err(FinanceError::InvalidPaymentMethodDetails { .. })
        ));
    }
}
