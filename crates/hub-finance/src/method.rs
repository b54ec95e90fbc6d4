//! Payment methods and the providers that settle claims through them.

use chrono::{DateTime, Utc};
use hub_core::{
    Actor, BankAccount,
    money::{MONEY_SCALE, apply_discount, apply_tax, percent_of, round_to_cents},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    FinanceError,
    claim::{Claim, ClaimEntry, FeeBasis},
    invoice::Invoice,
    payment::Payment,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransfer {
    pub bank_account: BankAccount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sepa {
    pub creditor_identifier: String,
    pub bank_account: BankAccount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMethodKind {
    BankTransfer(BankTransfer),
    Cash(Cash),
    Sepa(Sepa),
}

impl PaymentMethodKind {
    pub fn key(&self) -> &'static str {
        self.provider().key()
    }

    pub fn provider(&self) -> &dyn PaymentProvider {
        match self {
            Self::BankTransfer(p) => p,
            Self::Cash(p) => p,
            Self::Sepa(p) => p,
        }
    }

    pub fn details(&self) -> serde_json::Value {
        let details = match self {
            Self::BankTransfer(p) => serde_json::to_value(p),
            Self::Cash(p) => serde_json::to_value(p),
            Self::Sepa(p) => serde_json::to_value(p),
        };
        details.unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMethod {
    pub id: Uuid,
    pub owner: Uuid,
    pub name: String,
    pub currency: String,
    pub is_prepayment: bool,
    pub fee_absolute_value: Decimal,
    /// Percent of the net total.
    pub fee_relative_value: Decimal,
    pub fee_tax_rate: Decimal,
    pub kind: PaymentMethodKind,
}

impl PaymentMethod {
    pub fn provider(&self) -> &dyn PaymentProvider {
        self.kind.provider()
    }

    pub fn has_fee(&self) -> bool {
        !self.fee_absolute_value.is_zero() || !self.fee_relative_value.is_zero()
    }

    /// `fee_absolute + net_total * fee_relative / 100`
    pub fn apply_fee(&self, net_total: Decimal) -> Decimal {
        (self.fee_absolute_value + percent_of(net_total, self.fee_relative_value))
            .round_dp(MONEY_SCALE)
    }

    pub fn apply_fee_tax(&self, net: Decimal) -> Decimal {
        apply_tax(net, self.fee_tax_rate)
    }

    /// Claim charging the fee for the given basis, or `None` when the method is free.
    pub fn fee_claim(&self, basis: &FeeBasis, discount: Decimal) -> Option<ClaimEntry> {
        if !self.has_fee() {
            return None;
        }
        let net = self.apply_fee(basis.net_total);
        let discounted_net = apply_discount(net, discount);
        Some(ClaimEntry {
            item: format!("Payment fee ({})", self.name),
            quantity: Decimal::ONE,
            unit: "u".to_string(),
            price: net,
            currency: basis.currency.clone(),
            net,
            discount,
            discounted_net,
            tax_rate: self.fee_tax_rate,
            gross: self.apply_fee_tax(discounted_net),
            period_start: basis.period_start,
            period_end: basis.period_end,
        })
    }
}

/// The contract a settlement runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRef {
    pub id: i64,
    pub uuid: Uuid,
    pub creditor: Uuid,
    pub debitor: Uuid,
    pub label: String,
}

/// Running SEPA mandate between a contract's creditor and debitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MandateRef {
    pub contract_id: i64,
    pub has_prior_debits: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebitSequence {
    #[serde(rename = "FRST")]
    First,
    #[serde(rename = "RCUR")]
    Recurring,
}

impl DebitSequence {
    pub fn code(self) -> &'static str {
        match self {
            Self::First => "FRST",
            Self::Recurring => "RCUR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectDebit {
    pub id: Uuid,
    pub end_to_end_id: Uuid,
    pub mandate_contract_id: i64,
    pub contract_id: i64,
    pub creditor: Uuid,
    pub debitor: Uuid,
    pub account: BankAccount,
    pub amount: Decimal,
    pub currency: String,
    pub sequence: DebitSequence,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

pub struct SettlementRequest<'a> {
    pub contract: &'a ContractRef,
    pub claims: &'a [Claim],
    pub invoice: Option<&'a Invoice>,
    pub debitor: &'a Actor,
    pub mandate: Option<MandateRef>,
    pub at: DateTime<Utc>,
}

impl SettlementRequest<'_> {
    /// Gross per currency over the claims, in order of first appearance.
    pub fn gross_by_currency(&self) -> Vec<(String, Decimal)> {
        let mut sums: Vec<(String, Decimal)> = Vec::new();
        for claim in self.claims {
            match sums.iter_mut().find(|(c, _)| *c == claim.entry.currency) {
                Some((_, sum)) => *sum += claim.entry.gross,
                None => sums.push((claim.entry.currency.clone(), claim.entry.gross)),
            }
        }
        sums
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettlementEffect {
    Payment(Payment),
    DirectDebit(DirectDebit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initialization {
    Proceed,
    /// The debitor has to sign a mandate before the contract can move on.
    MandateRequired,
}

pub trait PaymentProvider: Send + Sync {
    fn key(&self) -> &'static str;

    fn verbose_name(&self) -> &'static str;

    fn initialize(
        &self,
        method: &PaymentMethod,
        mandate: Option<&MandateRef>,
    ) -> Result<Initialization, FinanceError>;

    fn settle(
        &self,
        method: &PaymentMethod,
        request: &SettlementRequest<'_>,
    ) -> Result<Vec<SettlementEffect>, FinanceError>;

    fn invoice_text(&self) -> String;
}

impl PaymentProvider for BankTransfer {
    fn key(&self) -> &'static str {
        "bank_transfer"
    }

    fn verbose_name(&self) -> &'static str {
        "Bank transfer"
    }

    fn initialize(&self, _: &PaymentMethod, _: Option<&MandateRef>) -> Result<Initialization, FinanceError> {
        Ok(Initialization::Proceed)
    }

    fn settle(&self, _: &PaymentMethod, _: &SettlementRequest<'_>) -> Result<Vec<SettlementEffect>, FinanceError> {
        Ok(Vec::new())
    }

    fn invoice_text(&self) -> String {
        format!(
            "Please transfer the amount within 14 days to {}, IBAN {}, BIC {}.",
            self.bank_account.account_holder, self.bank_account.iban, self.bank_account.bic
        )
    }
}

impl PaymentProvider for Cash {
    fn key(&self) -> &'static str {
        "cash"
    }

    fn verbose_name(&self) -> &'static str {
        "Cash"
    }

    fn initialize(&self, method: &PaymentMethod, _: Option<&MandateRef>) -> Result<Initialization, FinanceError> {
        if !method.is_prepayment {
            return Err(FinanceError::CashRequiresPrepayment);
        }
        Ok(Initialization::Proceed)
    }

    fn settle(
        &self,
        method: &PaymentMethod,
        request: &SettlementRequest<'_>,
    ) -> Result<Vec<SettlementEffect>, FinanceError> {
        let mut effects = Vec::new();
        for (currency, gross) in request.gross_by_currency() {
            let payment = Payment::finalized(
                method.id,
                Some(request.contract.id),
                request.contract.debitor,
                request.contract.creditor,
                gross,
                currency,
                request.at,
            )?;
            effects.push(SettlementEffect::Payment(payment));
        }
        Ok(effects)
    }

    fn invoice_text(&self) -> String {
        "The amount has been paid in cash.".to_string()
    }
}

impl PaymentProvider for Sepa {
    fn key(&self) -> &'static str {
        "sepa"
    }

    fn verbose_name(&self) -> &'static str {
        "SEPA direct debit"
    }

    fn initialize(&self, _: &PaymentMethod, mandate: Option<&MandateRef>) -> Result<Initialization, FinanceError> {
        Ok(match mandate {
            Some(_) => Initialization::Proceed,
            None => Initialization::MandateRequired,
        })
    }

    fn settle(
        &self,
        _: &PaymentMethod,
        request: &SettlementRequest<'_>,
    ) -> Result<Vec<SettlementEffect>, FinanceError> {
        let contract = request.contract;
        if let Some(foreign) = request.claims.iter().find(|c| c.contract_id != contract.id) {
            return Err(FinanceError::ForeignClaim {
                claim_id: foreign.id,
                contract_id: contract.id,
            });
        }
        if request.claims.is_empty() {
            return Ok(Vec::new());
        }

        let mandate = request.mandate.ok_or(FinanceError::MissingSepaMandate {
            creditor: contract.creditor,
            debitor: contract.debitor,
        })?;
        let account = request
            .debitor
            .bank_account
            .clone()
            .ok_or(FinanceError::MissingBankAccount(request.debitor.id))?;

        let description = match request.invoice {
            Some(invoice) => format!("{}: {}", contract.label, invoice.full_invoice_no),
            None => contract.label.clone(),
        };

        let mut sequence = if mandate.has_prior_debits {
            DebitSequence::Recurring
        } else {
            DebitSequence::First
        };
        let mut debits = Vec::new();
        for (currency, gross) in request.gross_by_currency() {
            debits.push(SettlementEffect::DirectDebit(DirectDebit {
                id: Uuid::new_v4(),
                end_to_end_id: Uuid::new_v4(),
                mandate_contract_id: mandate.contract_id,
                contract_id: contract.id,
                creditor: contract.creditor,
                debitor: contract.debitor,
                account: account.clone(),
                amount: round_to_cents(gross),
                currency,
                sequence,
                description: description.clone(),
                created_at: request.at,
            }));
            sequence = DebitSequence::Recurring;
        }
        Ok(debits)
    }

    fn invoice_text(&self) -> String {
        format!(
            "The amount will be collected by SEPA direct debit (creditor identifier {}).",
            self.creditor_identifier
        )
    }
}
