#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use hub_bookings::{Item, ItemBooking, ItemBookings, ItemUnit, SelfPickup};
use hub_contracts::{ContractDraft, ContractEngine, ContractKind};
use hub_core::{
    Actor, ActorContext, ActorKind, Address, BankAccount, ContractProcedure, InvoiceSettings,
    ManualClock, SettlementInterval,
};
use hub_finance::{
    BankTransfer, Cash, PaymentMethod, PaymentMethodKind, PaymentMethodRecord,
    PaymentMethodRegistry, Sepa,
};
use hub_store::InMemoryStore;
use hub_tools::{DocumentRenderer, MemoryNotificationSink, TextInvoiceRenderer};
use rust_decimal::Decimal;
use uuid::Uuid;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn account(holder: &str) -> BankAccount {
    BankAccount {
        account_holder: holder.to_string(),
        iban: "DE02120300000000202051".to_string(),
        bic: "BYLADEM1001".to_string(),
    }
}

pub fn actor(name: &str, prefix: &str) -> Actor {
    Actor {
        id: Uuid::new_v4(),
        kind: ActorKind::Organization,
        name: name.to_string(),
        slug: name.to_lowercase().replace(' ', "-"),
        address: Address {
            street: "Marktplatz".to_string(),
            street_number: "3".to_string(),
            postal_code: "04109".to_string(),
            city: "Leipzig".to_string(),
            country: "DE".to_string(),
        },
        bank_account: Some(account(name)),
        telephone_public: None,
        website: None,
        tax_id: None,
        vat_id: None,
        language: "de".to_string(),
        invoice: InvoiceSettings {
            numbers_prefix: prefix.to_string(),
            ..InvoiceSettings::default()
        },
    }
}

pub fn ctx(actor: &Actor) -> ActorContext {
    ActorContext {
        actor: actor.id,
        user: actor.id,
        client_ip: None,
    }
}

fn method(owner: Uuid, name: &str, kind: PaymentMethodKind, is_prepayment: bool) -> PaymentMethod {
    PaymentMethod {
        id: Uuid::new_v4(),
        owner,
        name: name.to_string(),
        currency: "EUR".to_string(),
        is_prepayment,
        fee_absolute_value: Decimal::ZERO,
        fee_relative_value: Decimal::ZERO,
        fee_tax_rate: Decimal::ZERO,
        kind,
    }
}

pub struct Harness {
    pub engine: ContractEngine<InMemoryStore>,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<MemoryNotificationSink>,
    pub lender: Actor,
    pub borrower: Actor,
    pub procedure: ContractProcedure,
    pub transfer: PaymentMethod,
    pub cash: PaymentMethod,
    pub cash_on_account: PaymentMethod,
    pub sepa: PaymentMethod,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(|_| {}, Arc::new(TextInvoiceRenderer)).await
    }

    pub async fn configured(configure: impl FnOnce(&mut ContractProcedure)) -> Self {
        Self::with(configure, Arc::new(TextInvoiceRenderer)).await
    }

    pub async fn with(
        configure: impl FnOnce(&mut ContractProcedure),
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let sink = Arc::new(MemoryNotificationSink::default());

        let lender = actor("Tool Library", "TL");
        let borrower = actor("Garden Club", "GC");
        let transfer = method(
            lender.id,
            "Transfer",
            PaymentMethodKind::BankTransfer(BankTransfer {
                bank_account: account("Tool Library"),
            }),
            false,
        );
        let cash = method(lender.id, "Cash", PaymentMethodKind::Cash(Cash), true);
        let cash_on_account = method(lender.id, "Cash later", PaymentMethodKind::Cash(Cash), false);
        let sepa = method(
            lender.id,
            "Direct debit",
            PaymentMethodKind::Sepa(Sepa {
                creditor_identifier: "DE98ZZZ09999999999".to_string(),
                bank_account: account("Tool Library"),
            }),
            false,
        );

        let mut procedure = ContractProcedure {
            id: Uuid::new_v4(),
            owner: lender.id,
            name: "Lending".to_string(),
            auto_accept: true,
            is_invoicing: true,
            terms_and_conditions: Some("Return items clean.".to_string()),
            termination_period: 0,
            notes: None,
            payment_methods: vec![transfer.id, cash.id, cash_on_account.id, sepa.id],
            tax_rate: Decimal::new(19, 0),
            settlement_interval: SettlementInterval::Weekly,
            created_at: start(),
        };
        configure(&mut procedure);

        store.put_actor(lender.clone()).await;
        store.put_actor(borrower.clone()).await;
        store.put_procedure(procedure.clone()).await;
        for m in [&transfer, &cash, &cash_on_account, &sepa] {
            store.put_payment_method(PaymentMethodRecord::from(m)).await;
        }

        let engine = ContractEngine::new(
            Arc::clone(&store),
            Arc::new(PaymentMethodRegistry::with_builtin()),
            sink.clone(),
            renderer,
            clock.clone(),
        );

        Self {
            engine,
            store,
            clock,
            sink,
            lender,
            borrower,
            procedure,
            transfer,
            cash,
            cash_on_account,
            sepa,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        hub_core::Clock::now(self.clock.as_ref())
    }

    /// A hourly item booked for 5h at each given offset from now.
    pub fn item_bookings(&self, offsets: &[Duration]) -> ContractKind {
        let item = Item::new(
            self.lender.id,
            "Cargo bike",
            ItemUnit::Hours,
            Decimal::new(250, 2),
            "EUR",
            SelfPickup::NotAllowed,
            start(),
        );
        let now = self.now();
        let bookings = offsets
            .iter()
            .map(|offset| {
                let from = now + *offset;
                ItemBooking::new(&item, from, from + Duration::hours(5)).unwrap()
            })
            .collect();
        ContractKind::Item(ItemBookings {
            bookings,
            note: None,
        })
    }

    pub fn draft(&self, kind: ContractKind, method: &PaymentMethod) -> ContractDraft {
        ContractDraft {
            kind,
            creditor: self.lender.id,
            debitor: self.borrower.id,
            contract_procedure: self.procedure.id,
            payment_method: Some(method.id),
            price_profile: None,
            is_fixed_term: true,
        }
    }
}

/// Five bookings a week ago and five a week ahead.
pub fn past_and_future() -> Vec<Duration> {
    let mut offsets: Vec<_> = (0..5).map(|i| Duration::days(-7) + Duration::hours(6 * i)).collect();
    offsets.extend((0..5).map(|i| Duration::days(7) + Duration::hours(6 * i)));
    offsets
}
