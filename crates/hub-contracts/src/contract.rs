use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use hub_bookings::{
    BookingError, ClaimFactory, ItemBookings, VenueBooking, WorkshopBooking,
};
use hub_core::{DeclarationOfIntent, Lifecycle, StateCodeError, StateGraph, TransitionError};
use hub_finance::{ClaimLine, ContractRef, FeeBasis};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minutes a contract may stay PENDING before the expiry scan removes it.
pub const EXPIRATION_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractState {
    Pending,
    Waiting,
    Running,
    Disputing,
    Finalized,
    Expired,
    Canceled,
    Declined,
    Terminated,
}

impl StateGraph for ContractState {
    const ENTITY: &'static str = "contract";

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Waiting, Self::Canceled, Self::Expired],
            Self::Waiting => &[Self::Running, Self::Declined],
            Self::Running => &[Self::Disputing, Self::Finalized, Self::Terminated],
            Self::Disputing => &[Self::Running, Self::Finalized],
            Self::Finalized | Self::Expired | Self::Canceled | Self::Declined | Self::Terminated => &[],
        }
    }
}

impl ContractState {
    pub const ALL: [Self; 9] = [
        Self::Pending,
        Self::Waiting,
        Self::Running,
        Self::Disputing,
        Self::Finalized,
        Self::Expired,
        Self::Canceled,
        Self::Declined,
        Self::Terminated,
    ];
}

impl fmt::Display for ContractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Waiting => "WAITING",
            Self::Running => "RUNNING",
            Self::Disputing => "DISPUTING",
            Self::Finalized => "FINALIZED",
            Self::Expired => "EXPIRED",
            Self::Canceled => "CANCELED",
            Self::Declined => "DECLINED",
            Self::Terminated => "TERMINATED",
        })
    }
}

impl FromStr for ContractState {
    type Err = StateCodeError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.to_string() == code)
            .ok_or_else(|| StateCodeError {
                entity: Self::ENTITY,
                code: code.to_string(),
            })
    }
}

/// What a contract is about. Each variant knows how to accrue its claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "terms", rename_all = "snake_case")]
pub enum ContractKind {
    Item(ItemBookings),
    Workshop(WorkshopBooking),
    Venue(VenueBooking),
    SepaMandate,
}

impl ContractKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Item(_) => "item",
            Self::Workshop(_) => "workshop",
            Self::Venue(_) => "venue",
            Self::SepaMandate => "sepa_mandate",
        }
    }

    pub fn verbose_name(&self) -> &'static str {
        match self {
            Self::Item(_) => "Item booking",
            Self::Workshop(_) => "Workshop booking",
            Self::Venue(_) => "Venue booking",
            Self::SepaMandate => "SEPA direct debit mandate",
        }
    }

    fn factory(&self) -> Option<&dyn ClaimFactory> {
        match self {
            Self::Item(bookings) => Some(bookings),
            Self::Workshop(booking) => Some(booking),
            Self::Venue(booking) => Some(booking),
            Self::SepaMandate => None,
        }
    }

    pub fn claim_lines(&self) -> Result<Vec<ClaimLine>, BookingError> {
        match self.factory() {
            Some(factory) => factory.claim_lines(),
            None => Ok(Vec::new()),
        }
    }

    pub fn fee_basis(&self, lines: &[ClaimLine]) -> Option<FeeBasis> {
        self.factory().and_then(|factory| factory.fee_basis(lines))
    }

    pub fn grants_self_pickup(&self, debitor: Uuid) -> bool {
        match self {
            Self::Item(bookings) => bookings.grants_self_pickup(debitor),
            _ => false,
        }
    }

    /// Message for the creditor when the debitor confirms.
    pub fn waiting_message(&self) -> String {
        match self {
            Self::Item(bookings) => bookings.note.clone().unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Message for the debitor once the contract runs.
    pub fn running_message(&self, notes: Option<&str>) -> String {
        let notes = notes.unwrap_or_default();
        match self {
            Self::Item(bookings) => {
                let instructions = bookings.instructions();
                if instructions.is_empty() {
                    notes.to_string()
                } else {
                    format!("{notes}\n{instructions}").trim().to_string()
                }
            }
            _ => notes.to_string(),
        }
    }

    /// Releases every booked resource.
    pub fn release_all(&mut self) {
        match self {
            Self::Item(bookings) => bookings.release_all(),
            Self::Workshop(booking) => booking.is_deleted = true,
            Self::Venue(_) | Self::SepaMandate => {}
        }
    }

    /// Releases resources booked for periods that have not ended at `now`.
    pub fn release_from(&mut self, now: DateTime<Utc>) {
        if let Self::Item(bookings) = self {
            bookings.release_from(now);
        }
    }
}

/// Everything a client supplies to open a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDraft {
    pub kind: ContractKind,
    pub creditor: Uuid,
    pub debitor: Uuid,
    pub contract_procedure: Uuid,
    pub payment_method: Option<Uuid>,
    pub price_profile: Option<Uuid>,
    pub is_fixed_term: bool,
}

/// A draft ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContract {
    pub uuid: Uuid,
    pub draft: ContractDraft,
    pub terms_and_conditions: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: i64,
    pub uuid: Uuid,
    pub kind: ContractKind,
    pub creditor: Uuid,
    pub debitor: Uuid,
    pub contract_procedure: Uuid,
    pub payment_method: Option<Uuid>,
    pub price_profile: Option<Uuid>,
    pub terms_and_conditions: Option<String>,
    pub is_fixed_term: bool,
    pub confirmation: Option<DeclarationOfIntent>,
    pub acceptance: Option<DeclarationOfIntent>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
    lifecycle: Lifecycle<ContractState>,
}

impl Contract {
    pub fn create(id: i64, new: NewContract) -> Self {
        let NewContract {
            uuid,
            draft,
            terms_and_conditions,
            created_by,
            created_at,
        } = new;
        Self {
            id,
            uuid,
            kind: draft.kind,
            creditor: draft.creditor,
            debitor: draft.debitor,
            contract_procedure: draft.contract_procedure,
            payment_method: draft.payment_method,
            price_profile: draft.price_profile,
            terms_and_conditions,
            is_fixed_term: draft.is_fixed_term,
            confirmation: None,
            acceptance: None,
            created_by,
            created_at,
            is_deleted: false,
            lifecycle: Lifecycle::new(ContractState::Pending, created_at),
        }
    }

    pub fn restore(mut self, lifecycle: Lifecycle<ContractState>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn state(&self) -> ContractState {
        self.lifecycle.state()
    }

    pub fn state_changed(&self) -> DateTime<Utc> {
        self.lifecycle.state_changed()
    }

    pub fn lifecycle(&self) -> &Lifecycle<ContractState> {
        &self.lifecycle
    }

    pub(crate) fn move_to(&mut self, target: ContractState, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.lifecycle.move_to(target, at)
    }

    /// Creditor and debitor are the same actor.
    pub fn is_self_dealing(&self) -> bool {
        self.creditor == self.debitor
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at >= Duration::minutes(EXPIRATION_MINUTES)
    }

    /// The party on the other side of `actor`.
    pub fn counterparty(&self, actor: Uuid) -> Uuid {
        if actor == self.creditor {
            self.debitor
        } else {
            self.creditor
        }
    }

    pub fn reference(&self) -> ContractRef {
        ContractRef {
            id: self.id,
            uuid: self.uuid,
            creditor: self.creditor,
            debitor: self.debitor,
            label: self.kind.verbose_name().to_string(),
        }
    }

    pub fn link(&self) -> String {
        format!("/control/finance/contracts/{}", self.id)
    }
}

/// Marks one settlement pass over a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementLog {
    pub id: i64,
    pub contract_id: i64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(creditor: Uuid, debitor: Uuid, created_at: DateTime<Utc>) -> Contract {
        Contract::create(
            1,
            NewContract {
                uuid: Uuid::new_v4(),
                draft: ContractDraft {
                    kind: ContractKind::SepaMandate,
                    creditor,
                    debitor,
                    contract_procedure: Uuid::new_v4(),
                    payment_method: None,
                    price_profile: None,
                    is_fixed_term: true,
                },
                terms_and_conditions: None,
                created_by: Uuid::new_v4(),
                created_at,
            },
        )
    }

    #[test]
    fn every_edge_of_the_graph_is_legal() {
        let now = Utc::now();
        for from in ContractState::ALL {
            for to in ContractState::ALL {
                let mut lifecycle = Lifecycle::restore(from, now);
                let result = lifecycle.move_to(to, now);
                if from.successors().contains(&to) {
                    assert!(result.is_ok(), "{from} -> {to}");
                    assert_eq!(lifecycle.state(), to);
                } else {
                    assert!(result.is_err(), "{from} -> {to}");
                    assert_eq!(lifecycle.state(), from);
                }
            }
        }
    }

    #[test]
    fn illegal_moves_are_rejected() {
        let now = Utc::now();
        for (from, to) in [
            (ContractState::Pending, ContractState::Finalized),
            (ContractState::Pending, ContractState::Terminated),
            (ContractState::Running, ContractState::Canceled),
            (ContractState::Canceled, ContractState::Pending),
        ] {
            let mut lifecycle = Lifecycle::restore(from, now);
            let err = lifecycle.move_to(to, now).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("cannot move contract from state {from} to state {to}")
            );
        }
    }

    #[test]
    fn terminal_states() {
        let terminal: Vec<ContractState> = ContractState::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                ContractState::Finalized,
                ContractState::Expired,
                ContractState::Canceled,
                ContractState::Declined,
                ContractState::Terminated,
            ]
        );
    }

    #[test]
    fn state_codes_round_trip() {
        for state in ContractState::ALL {
            assert_eq!(state.to_string().parse::<ContractState>().unwrap(), state);
        }
        assert!("CONFIRMED".parse::<ContractState>().is_err());
    }

    #[test]
    fn expires_after_thirty_minutes() {
        let created = Utc::now();
        let c = contract(Uuid::new_v4(), Uuid::new_v4(), created);
        assert!(!c.is_expired(created + Duration::minutes(29)));
        assert!(c.is_expired(created + Duration::minutes(31)));
    }

    #[test]
    fn counterparty_and_self_dealing() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let c = contract(a, b, Utc::now());
        assert_eq!(c.counterparty(a), b);
        assert_eq!(c.counterparty(b), a);
        assert!(!c.is_self_dealing());
        assert!(contract(a, a, Utc::now()).is_self_dealing());
    }

    #[test]
    fn kind_serializes_with_tag_and_terms() {
        let json = serde_json::to_value(ContractKind::SepaMandate).unwrap();
        assert_eq!(json["kind"], "sepa_mandate");
        let back: ContractKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, ContractKind::SepaMandate);
    }
}
