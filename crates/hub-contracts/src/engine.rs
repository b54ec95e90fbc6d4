use std::sync::Arc;

use chrono::Duration;
use hub_core::{
    ActorContext, Clock, ContractProcedure, DeclarationOfIntent, Notification,
    NotificationLevel, NotificationTarget, NotificationType,
};
use hub_finance::{
    ClaimEntry, ClaimState, Initialization, PaymentMethod, PaymentMethodKind,
    PaymentMethodRegistry, Pricing,
};
use hub_tools::{DocumentRenderer, NotificationSink};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    ContractError,
    contract::{Contract, ContractDraft, ContractKind, ContractState, NewContract},
    store::ContractStore,
};

/// Notifications collected during a unit of work, dispatched after commit.
pub(crate) type Outbox = Vec<Notification>;

pub struct ContractEngine<S: ContractStore> {
    pub(crate) store: Arc<S>,
    pub(crate) registry: Arc<PaymentMethodRegistry>,
    pub(crate) notifications: Arc<dyn NotificationSink>,
    pub(crate) renderer: Arc<dyn DocumentRenderer>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl<S: ContractStore> Clone for ContractEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            notifications: Arc::clone(&self.notifications),
            renderer: Arc::clone(&self.renderer),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: ContractStore> ContractEngine<S> {
    pub fn new(
        store: Arc<S>,
        registry: Arc<PaymentMethodRegistry>,
        notifications: Arc<dyn NotificationSink>,
        renderer: Arc<dyn DocumentRenderer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            notifications,
            renderer,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Creates the contract in PENDING and accrues its claims.
    pub async fn set_pending(&self, draft: ContractDraft, ctx: &ActorContext) -> Result<Contract, ContractError> {
        let procedure = self.store.contract_procedure(draft.contract_procedure).await?;
        if let Some(method) = draft.payment_method
            && !procedure.payment_methods.contains(&method)
        {
            return Err(ContractError::PaymentMethodNotOffered {
                payment_method: method,
                contract_procedure: procedure.id,
            });
        }
        let discount = match draft.price_profile {
            Some(id) => self.store.price_profile(id).await?.discount,
            None => Decimal::ZERO,
        };
        let payment_method = match draft.payment_method {
            Some(id) => Some(self.resolve_payment_method(id).await?),
            None => None,
        };

        let self_dealing = draft.creditor == draft.debitor;
        let entries = if self_dealing {
            Vec::new()
        } else {
            accrue(&draft.kind, &procedure, discount, payment_method.as_ref())?
        };

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let contract = self
                .store
                .insert_contract(
                    &mut tx,
                    NewContract {
                        uuid: Uuid::new_v4(),
                        draft,
                        terms_and_conditions: procedure.terms_and_conditions.clone(),
                        created_by: ctx.user,
                        created_at: now,
                    },
                )
                .await?;
            let claims = self.store.insert_claims(&mut tx, contract.id, entries, now).await?;
            info!(
                contract_id = contract.id,
                kind = contract.kind.key(),
                claims = claims.len(),
                "contract pending"
            );
            Ok::<_, ContractError>(contract)
        }
        .await;
        self.finish(tx, result, Outbox::new()).await
    }

    /// Runs the payment method's pre-processing and, if it allows, confirms the contract.
    pub async fn initialize(&self, contract_id: i64, ctx: &ActorContext) -> Result<Initialization, ContractError> {
        let mut tx = self.store.begin().await?;
        let mut outbox = Outbox::new();
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            let method = self.contract_payment_method(&contract).await?;
            let mandate = match method.kind {
                PaymentMethodKind::Sepa(_) => {
                    self.store
                        .running_mandate(&mut tx, contract.creditor, contract.debitor)
                        .await?
                }
                _ => None,
            };
            let step = method.provider().initialize(&method, mandate.as_ref())?;
            match step {
                Initialization::Proceed => {
                    self.waiting_in(&mut tx, &mut contract, ctx, &mut outbox).await?;
                }
                Initialization::MandateRequired => {
                    info!(contract_id, "waiting for SEPA mandate");
                }
            }
            Ok::<_, ContractError>(step)
        }
        .await;
        self.finish(tx, result, outbox).await
    }

    pub async fn set_waiting(&self, contract_id: i64, ctx: &ActorContext) -> Result<Contract, ContractError> {
        let mut tx = self.store.begin().await?;
        let mut outbox = Outbox::new();
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            self.waiting_in(&mut tx, &mut contract, ctx, &mut outbox).await?;
            Ok::<_, ContractError>(contract)
        }
        .await;
        self.finish(tx, result, outbox).await
    }

    pub async fn set_running(&self, contract_id: i64, ctx: &ActorContext) -> Result<Contract, ContractError> {
        let mut tx = self.store.begin().await?;
        let mut outbox = Outbox::new();
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            let procedure = self.store.contract_procedure(contract.contract_procedure).await?;
            self.running_in(&mut tx, &mut contract, &procedure, ctx, &mut outbox)
                .await?;
            Ok::<_, ContractError>(contract)
        }
        .await;
        self.finish(tx, result, outbox).await
    }

    pub async fn set_finalized(&self, contract_id: i64) -> Result<Contract, ContractError> {
        self.simple_move(contract_id, ContractState::Finalized).await
    }

    pub async fn set_expired(&self, contract_id: i64) -> Result<Contract, ContractError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            self.purge_in(&mut tx, &mut contract, ContractState::Expired).await?;
            Ok::<_, ContractError>(contract)
        }
        .await;
        self.finish(tx, result, Outbox::new()).await
    }

    pub async fn set_cancelled(&self, contract_id: i64) -> Result<Contract, ContractError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            self.purge_in(&mut tx, &mut contract, ContractState::Canceled).await?;
            Ok::<_, ContractError>(contract)
        }
        .await;
        self.finish(tx, result, Outbox::new()).await
    }

    pub async fn set_declined(&self, contract_id: i64) -> Result<Contract, ContractError> {
        let mut tx = self.store.begin().await?;
        let mut outbox = Outbox::new();
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            let now = self.clock.now();
            contract.move_to(ContractState::Declined, now)?;
            self.store.update_contract(&mut tx, &contract).await?;
            let creditor = self.store.actor(contract.creditor).await?;
            self.notify(
                &mut outbox,
                &contract,
                contract.creditor,
                contract.debitor,
                format!("{} declined {}", creditor.name, contract.kind.verbose_name()),
                String::new(),
                NotificationLevel::Medium,
            );
            info!(contract_id, "contract declined");
            Ok::<_, ContractError>(contract)
        }
        .await;
        self.finish(tx, result, outbox).await
    }

    /// Ends a running contract. Claims starting inside the termination period stay billable.
    pub async fn set_terminated(&self, contract_id: i64, initiator: Uuid) -> Result<Contract, ContractError> {
        let mut tx = self.store.begin().await?;
        let mut outbox = Outbox::new();
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            let procedure = self.store.contract_procedure(contract.contract_procedure).await?;
            let now = self.clock.now();
            contract.move_to(ContractState::Terminated, now)?;

            let grace = now + Duration::days(procedure.termination_period);
            let mut terminated = Vec::new();
            for mut claim in self.store.live_claims(&mut tx, contract.id).await? {
                if claim.state() == ClaimState::Pending && claim.entry.period_start >= grace {
                    claim.terminate(now)?;
                    terminated.push(claim);
                }
            }
            self.store.update_claims(&mut tx, &terminated).await?;
            contract.kind.release_from(now);
            self.store.update_contract(&mut tx, &contract).await?;

            let sender = self.store.actor(initiator).await?;
            self.notify(
                &mut outbox,
                &contract,
                initiator,
                contract.counterparty(initiator),
                format!("{} terminated {}", sender.name, contract.kind.verbose_name()),
                String::new(),
                NotificationLevel::High,
            );
            info!(
                contract_id,
                terminated = terminated.len(),
                grace_until = %grace,
                "contract terminated"
            );
            Ok::<_, ContractError>(contract)
        }
        .await;
        self.finish(tx, result, outbox).await
    }

    pub async fn set_disputing(&self, contract_id: i64, initiator: Uuid) -> Result<Contract, ContractError> {
        let mut tx = self.store.begin().await?;
        let mut outbox = Outbox::new();
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            contract.move_to(ContractState::Disputing, self.clock.now())?;
            self.store.update_contract(&mut tx, &contract).await?;
            let sender = self.store.actor(initiator).await?;
            self.notify(
                &mut outbox,
                &contract,
                initiator,
                contract.counterparty(initiator),
                format!("{} disputes {}", sender.name, contract.kind.verbose_name()),
                String::new(),
                NotificationLevel::High,
            );
            warn!(contract_id, %initiator, "contract disputed");
            Ok::<_, ContractError>(contract)
        }
        .await;
        self.finish(tx, result, outbox).await
    }

    pub async fn resolve_dispute(&self, contract_id: i64) -> Result<Contract, ContractError> {
        let mut tx = self.store.begin().await?;
        let mut outbox = Outbox::new();
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            contract.move_to(ContractState::Running, self.clock.now())?;
            self.store.update_contract(&mut tx, &contract).await?;
            self.notify(
                &mut outbox,
                &contract,
                contract.creditor,
                contract.debitor,
                format!("Dispute about {} resolved", contract.kind.verbose_name()),
                String::new(),
                NotificationLevel::Medium,
            );
            info!(contract_id, "dispute resolved");
            Ok::<_, ContractError>(contract)
        }
        .await;
        self.finish(tx, result, outbox).await
    }

    /// Signs a SEPA mandate: confirmation and activation in one step.
    pub async fn sign_sepa_mandate(&self, contract_id: i64, ctx: &ActorContext) -> Result<Contract, ContractError> {
        let mut tx = self.store.begin().await?;
        let mut outbox = Outbox::new();
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            if contract.kind != ContractKind::SepaMandate {
                return Err(ContractError::NotAMandate(contract_id));
            }
            let now = self.clock.now();
            contract.move_to(ContractState::Waiting, now)?;
            contract.confirmation = Some(DeclarationOfIntent::capture(ctx, now));
            contract.move_to(ContractState::Running, now)?;
            self.store.update_contract(&mut tx, &contract).await?;

            let debitor = self.store.actor(contract.debitor).await?;
            self.notify(
                &mut outbox,
                &contract,
                contract.debitor,
                contract.creditor,
                format!("{} signed a SEPA direct debit mandate", debitor.name),
                String::new(),
                NotificationLevel::Medium,
            );
            info!(contract_id, "SEPA mandate signed");
            Ok::<_, ContractError>(contract)
        }
        .await;
        self.finish(tx, result, outbox).await
    }

    pub(crate) async fn waiting_in(
        &self,
        tx: &mut S::Tx,
        contract: &mut Contract,
        ctx: &ActorContext,
        outbox: &mut Outbox,
    ) -> Result<(), ContractError> {
        let now = self.clock.now();
        contract.move_to(ContractState::Waiting, now)?;
        contract.confirmation = Some(DeclarationOfIntent::capture(ctx, now));
        self.store.update_contract(tx, contract).await?;

        let debitor = self.store.actor(contract.debitor).await?;
        self.notify(
            outbox,
            contract,
            contract.debitor,
            contract.creditor,
            format!("{} created {}", debitor.name, contract.kind.verbose_name()),
            contract.kind.waiting_message(),
            NotificationLevel::Medium,
        );
        info!(contract_id = contract.id, "contract waiting");

        let procedure = self.store.contract_procedure(contract.contract_procedure).await?;
        if procedure.auto_accept
            || contract.is_self_dealing()
            || contract.kind.grants_self_pickup(contract.debitor)
        {
            self.running_in(tx, contract, &procedure, ctx, outbox).await?;
        }
        Ok(())
    }

    pub(crate) async fn running_in(
        &self,
        tx: &mut S::Tx,
        contract: &mut Contract,
        procedure: &ContractProcedure,
        ctx: &ActorContext,
        outbox: &mut Outbox,
    ) -> Result<(), ContractError> {
        let now = self.clock.now();
        contract.move_to(ContractState::Running, now)?;
        if !(procedure.auto_accept || contract.is_self_dealing()) {
            contract.acceptance = Some(DeclarationOfIntent::capture(ctx, now));
        }
        self.store.update_contract(tx, contract).await?;
        info!(contract_id = contract.id, "contract running");

        if contract.is_self_dealing() {
            self.settle_in(tx, contract, procedure, outbox).await?;
        } else {
            let method = self.contract_payment_method(contract).await?;
            if method.is_prepayment {
                self.settle_in(tx, contract, procedure, outbox).await?;
            } else {
                self.initial_log_in(tx, contract, Some(&method)).await?;
            }
        }

        let creditor = self.store.actor(contract.creditor).await?;
        self.notify(
            outbox,
            contract,
            contract.creditor,
            contract.debitor,
            format!("{} accepted {}", creditor.name, contract.kind.verbose_name()),
            contract.kind.running_message(procedure.notes.as_deref()),
            NotificationLevel::Medium,
        );
        Ok(())
    }

    /// Moves a contract that never ran into a terminal state and drops its pending claims.
    pub(crate) async fn purge_in(
        &self,
        tx: &mut S::Tx,
        contract: &mut Contract,
        target: ContractState,
    ) -> Result<(), ContractError> {
        contract.move_to(target, self.clock.now())?;
        let mut purged = Vec::new();
        for mut claim in self.store.live_claims(tx, contract.id).await? {
            if claim.state() == ClaimState::Pending {
                claim.soft_delete();
                purged.push(claim);
            }
        }
        self.store.update_claims(tx, &purged).await?;
        contract.kind.release_all();
        self.store.update_contract(tx, contract).await?;
        info!(
            contract_id = contract.id,
            state = %target,
            purged = purged.len(),
            "contract closed before running"
        );
        Ok(())
    }

    async fn simple_move(&self, contract_id: i64, target: ContractState) -> Result<Contract, ContractError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            contract.move_to(target, self.clock.now())?;
            self.store.update_contract(&mut tx, &contract).await?;
            info!(contract_id, state = %target, "contract moved");
            Ok::<_, ContractError>(contract)
        }
        .await;
        self.finish(tx, result, Outbox::new()).await
    }

    pub(crate) async fn resolve_payment_method(&self, id: Uuid) -> Result<PaymentMethod, ContractError> {
        let record = self.store.payment_method(id).await?;
        Ok(self.registry.resolve(&record)?)
    }

    pub(crate) async fn contract_payment_method(&self, contract: &Contract) -> Result<PaymentMethod, ContractError> {
        let id = contract
            .payment_method
            .ok_or(ContractError::MissingPaymentMethod(contract.id))?;
        self.resolve_payment_method(id).await
    }

    /// Queues a notification unless the contract is self-dealing.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn notify(
        &self,
        outbox: &mut Outbox,
        contract: &Contract,
        sender: Uuid,
        recipient: Uuid,
        header: String,
        message: String,
        level: NotificationLevel,
    ) {
        if contract.is_self_dealing() {
            return;
        }
        outbox.push(Notification::build(
            NotificationType::Contract,
            sender,
            recipient,
            header,
            message,
            contract.link(),
            level,
            NotificationTarget::Contract {
                id: contract.id,
                uuid: contract.uuid,
            },
            self.clock.now(),
        ));
    }

    /// Commits on success and then dispatches the outbox; rolls back on failure.
    pub(crate) async fn finish<T>(
        &self,
        tx: S::Tx,
        result: Result<T, ContractError>,
        outbox: Outbox,
    ) -> Result<T, ContractError> {
        match result {
            Ok(value) => {
                self.store.commit(tx).await?;
                self.dispatch(outbox).await;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.store.rollback(tx).await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn dispatch(&self, outbox: Outbox) {
        for notification in outbox {
            let id = notification.id;
            if let Err(err) = self.notifications.build(notification).await {
                warn!(notification = %id, error = %err, "notification dispatch failed");
            }
        }
    }
}

/// Prices the booking's claim lines and, if the booking opts in, adds the payment fee.
fn accrue(
    kind: &ContractKind,
    procedure: &ContractProcedure,
    discount: Decimal,
    payment_method: Option<&PaymentMethod>,
) -> Result<Vec<ClaimEntry>, ContractError> {
    let lines = kind.claim_lines()?;
    let fee = kind
        .fee_basis(&lines)
        .zip(payment_method)
        .and_then(|(basis, method)| method.fee_claim(&basis, discount));

    let pricing = Pricing {
        discount,
        tax_rate: procedure.tax_rate,
    };
    let mut entries: Vec<ClaimEntry> = lines
        .into_iter()
        .map(|line| ClaimEntry::priced(line, pricing))
        .collect();
    entries.extend(fee);
    Ok(entries)
}
