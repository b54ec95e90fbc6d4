use std::net::IpAddr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActorKind {
    Person,
    Organization,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub street: String,
    pub street_number: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
}

impl Address {
    pub fn street_line(&self) -> String {
        format!("{} {}", self.street, self.street_number)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BankAccount {
    pub account_holder: String,
    pub iban: String,
    pub bic: String,
}

/// Per-actor invoice numbering and boilerplate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvoiceSettings {
    pub numbers_prefix: String,
    pub numbers_prefix_cancellations: Option<String>,
    pub introductory_text: String,
    pub additional_text: String,
    pub footer_text: String,
}

/// A person or organization capable of entering contracts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub kind: ActorKind,
    pub name: String,
    pub slug: String,
    pub address: Address,
    pub bank_account: Option<BankAccount>,
    pub telephone_public: Option<String>,
    pub website: Option<String>,
    pub tax_id: Option<String>,
    pub vat_id: Option<String>,
    pub language: String,
    pub invoice: InvoiceSettings,
}

impl Actor {
    /// Prefix used when numbering invoices issued by this actor.
    pub fn invoice_prefix(&self, is_cancellation: bool) -> &str {
        if is_cancellation
            && let Some(prefix) = self
                .invoice
                .numbers_prefix_cancellations
                .as_deref()
                .filter(|prefix| !prefix.is_empty())
        {
            return prefix;
        }
        &self.invoice.numbers_prefix
    }
}

/// Identity of whoever triggers a contract operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorContext {
    /// The actor the user is acting as (themself or an organization).
    pub actor: Uuid,
    pub user: Uuid,
    pub client_ip: Option<IpAddr>,
}

/// Evidence of a party's consent at a lifecycle step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeclarationOfIntent {
    pub id: Uuid,
    pub user: Uuid,
    pub ip: Option<IpAddr>,
    pub ip_routable: bool,
    pub timestamp: DateTime<Utc>,
}

impl DeclarationOfIntent {
    pub fn capture(context: &ActorContext, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: context.user,
            ip: context.client_ip,
            ip_routable: context.client_ip.is_some_and(is_routable),
            timestamp: at,
        }
    }
}

fn is_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation())
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            let unique_local = (first & 0xfe00) == 0xfc00;
            let link_local = (first & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SettlementInterval {
    Weekly,
    Biweekly,
    Monthly,
}

impl SettlementInterval {
    pub fn days(self) -> i64 {
        match self {
            Self::Weekly => 7,
            Self::Biweekly => 14,
            Self::Monthly => 30,
        }
    }

    pub fn from_days(days: i64) -> Option<Self> {
        match days {
            7 => Some(Self::Weekly),
            14 => Some(Self::Biweekly),
            30 => Some(Self::Monthly),
            _ => None,
        }
    }
}

/// Reusable booking configuration attached to contracts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractProcedure {
    pub id: Uuid,
    pub owner: Uuid,
    pub name: String,
    pub auto_accept: bool,
    pub is_invoicing: bool,
    pub terms_and_conditions: Option<String>,
    /// Days before a termination takes effect for already booked periods.
    pub termination_period: i64,
    /// Appended to the notification sent when a contract starts running.
    pub notes: Option<String>,
    pub payment_methods: Vec<Uuid>,
    pub tax_rate: Decimal,
    pub settlement_interval: SettlementInterval,
    pub created_at: DateTime<Utc>,
}

/// Discount granted to a group of debitors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceProfile {
    pub id: Uuid,
    pub contract_procedure: Uuid,
    pub addressee: Option<Uuid>,
    pub description: String,
    pub discount: Decimal,
}
