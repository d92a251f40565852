// src/db/memory_store.rs
//
// Adaptador em memória de todas as portas de armazenamento. Usado pelos
// testes e quando o serviço sobe sem DATABASE_URL. Um único Mutex faz o
// papel do SELECT ... FOR UPDATE: cada método é uma "transação".

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{
        ensure_owner, AppointmentRepository, CustomerRepository, FinanceRepository, InventoryRepository,
        LoyaltyRepository, NotificationRepository, ProposalChange, ProposalRepository, SubscriptionChange,
        SubscriptionRepository, TaskRepository,
    },
    models::{
        appointment::{Appointment, AppointmentPaymentStatus, AppointmentStatus, CompletionUpdate, NewAppointment},
        crm::{Customer, NewCustomer},
        finance::{
            FinancialTransaction, NewFinancialTransaction, NewPixCharge, PixCharge, PixChargeStatus, TransactionStatus,
        },
        inventory::{InventoryItem, NewInventoryItem, NewStockMovement, StockMovement},
        loyalty::{LoyaltyCard, VisitOutcome},
        notification::{NewTask, NotificationChannel, NotificationKey, Task, TaskStatus},
        proposal::{NewProposal, Proposal, ProposalStatus, ScheduleOutcome},
        subscription::{NewSubscription, RenewalEntry, Subscription, SubscriptionStatus},
    },
};

#[derive(Default)]
struct State {
    customers: HashMap<Uuid, Customer>,
    items: HashMap<Uuid, InventoryItem>,
    // Ordem de inserção = ordem de aplicação
    movements: Vec<StockMovement>,
    cards: HashMap<(Uuid, Uuid), LoyaltyCard>,
    appointments: HashMap<Uuid, Appointment>,
    transactions: Vec<FinancialTransaction>,
    charges: HashMap<Uuid, PixCharge>,
    proposals: HashMap<Uuid, Proposal>,
    subscriptions: HashMap<Uuid, Subscription>,
    tasks: Vec<Task>,
    views: HashSet<(Uuid, NotificationKey)>,
    deliveries: HashMap<(Uuid, String), NotificationChannel>,
}

impl State {
    fn owned<'a, T>(
        rows: &'a HashMap<Uuid, T>,
        entity: &str,
        id: Uuid,
        owner: Uuid,
        business_of: impl Fn(&T) -> Uuid,
    ) -> Result<&'a T, AppError> {
        let row = rows.get(&id).ok_or_else(|| AppError::not_found(entity, id))?;
        ensure_owner(entity, id, business_of(row), owner)?;
        Ok(row)
    }

    fn insert_transaction(&mut self, owner: Uuid, new_tx: &NewFinancialTransaction) -> Result<FinancialTransaction, AppError> {
        new_tx.validate_amount()?;
        let transaction = FinancialTransaction {
            id: Uuid::new_v4(),
            business_id: owner,
            transaction_type: new_tx.transaction_type,
            amount: new_tx.amount,
            description: new_tx.description.clone(),
            payment_method: new_tx.payment_method,
            status: new_tx.status,
            transaction_date: new_tx.transaction_date,
            appointment_id: new_tx.appointment_id,
            category_id: new_tx.category_id,
            pix_charge_id: new_tx.pix_charge_id,
            subscription_id: new_tx.subscription_id,
            created_at: Utc::now(),
        };
        self.transactions.push(transaction.clone());
        Ok(transaction)
    }

    fn insert_appointment(&mut self, owner: Uuid, new_appointment: &NewAppointment) -> Result<Appointment, AppError> {
        new_appointment.validate()?;
        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            business_id: owner,
            customer_id: new_appointment.customer_id,
            title: new_appointment.title.clone(),
            start_at: new_appointment.start_at,
            end_at: new_appointment.end_at,
            status: AppointmentStatus::Scheduled,
            payment_status: AppointmentPaymentStatus::Pending,
            price: new_appointment.price,
            deposit_amount: new_appointment.deposit_amount,
            payment_method: None,
            proposal_id: new_appointment.proposal_id,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    fn insert_pix_charge(
        &mut self,
        owner: Uuid,
        charge: NewPixCharge,
        pending_income: Option<NewFinancialTransaction>,
    ) -> Result<(PixCharge, Option<FinancialTransaction>), AppError> {
        if self.charges.values().any(|c| c.external_id == charge.external_id) {
            return Err(AppError::InvalidState("Cobrança PIX já existe".to_string()));
        }
        if let Some(income) = &pending_income {
            income.validate_amount()?;
        }

        let mut created = PixCharge {
            id: Uuid::new_v4(),
            business_id: owner,
            external_id: charge.external_id,
            amount: charge.amount,
            customer_name: charge.customer_name,
            customer_phone: charge.customer_phone,
            status: PixChargeStatus::Pending,
            qr_payload: charge.qr_payload,
            qr_svg: charge.qr_svg,
            expires_at: charge.expires_at,
            paid_at: None,
            transaction_id: None,
            appointment_id: charge.appointment_id,
            subscription_id: charge.subscription_id,
            reminders_sent: 0,
            created_at: Utc::now(),
        };

        let transaction = match pending_income {
            Some(mut income) => {
                income.pix_charge_id = Some(created.id);
                let inserted = self.insert_transaction(owner, &income)?;
                created.transaction_id = Some(inserted.id);
                Some(inserted)
            }
            None => None,
        };

        self.charges.insert(created.id, created.clone());
        Ok((created, transaction))
    }

    fn card_entry(&mut self, owner: Uuid, customer_id: Uuid, stamps_required: i32) -> &mut LoyaltyCard {
        self.cards
            .entry((owner, customer_id))
            .or_insert_with(|| LoyaltyCard::fresh(owner, customer_id, stamps_required, Utc::now()))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerRepository for MemoryStore {
    async fn create(&self, owner: Uuid, customer: NewCustomer) -> Result<Customer, AppError> {
        let mut state = self.state.lock().await;
        let created = Customer {
            id: Uuid::new_v4(),
            business_id: owner,
            name: customer.name,
            email: customer.email,
            phone: customer.phone,
            created_at: Utc::now(),
        };
        state.customers.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find(&self, owner: Uuid, customer_id: Uuid) -> Result<Customer, AppError> {
        let state = self.state.lock().await;
        State::owned(&state.customers, "Cliente", customer_id, owner, |c| c.business_id).cloned()
    }
}

#[async_trait]
impl InventoryRepository for MemoryStore {
    async fn create_item(&self, owner: Uuid, item: NewInventoryItem) -> Result<InventoryItem, AppError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let created = InventoryItem {
            id: Uuid::new_v4(),
            business_id: owner,
            name: item.name,
            unit: item.unit,
            current_stock: item.initial_stock,
            minimum_stock: item.minimum_stock,
            cost_price: item.cost_price,
            sale_price: item.sale_price,
            created_at: now,
            updated_at: now,
        };
        state.items.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_item(&self, owner: Uuid, item_id: Uuid) -> Result<InventoryItem, AppError> {
        let state = self.state.lock().await;
        State::owned(&state.items, "Item de estoque", item_id, owner, |i| i.business_id).cloned()
    }

    async fn list_items(&self, owner: Uuid) -> Result<Vec<InventoryItem>, AppError> {
        let state = self.state.lock().await;
        let mut items: Vec<InventoryItem> = state.items.values().filter(|i| i.business_id == owner).cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn apply_movement(&self, owner: Uuid, movement: NewStockMovement) -> Result<StockMovement, AppError> {
        let mut state = self.state.lock().await;

        let item = State::owned(&state.items, "Item de estoque", movement.item_id, owner, |i| i.business_id)?;
        let previous_stock = item.current_stock;
        let new_stock = movement.movement_type.next_stock(previous_stock, movement.quantity)?;

        let now = Utc::now();
        let recorded = StockMovement {
            id: Uuid::new_v4(),
            business_id: owner,
            item_id: movement.item_id,
            movement_type: movement.movement_type,
            quantity: movement.quantity,
            previous_stock,
            new_stock,
            reason: movement.reason,
            reference_type: movement.reference.as_ref().map(|r| r.reference_type.clone()),
            reference_id: movement.reference.as_ref().map(|r| r.reference_id),
            created_at: now,
        };

        if let Some(item) = state.items.get_mut(&movement.item_id) {
            item.current_stock = new_stock;
            item.updated_at = now;
        }
        state.movements.push(recorded.clone());
        Ok(recorded)
    }

    async fn list_movements(&self, owner: Uuid, item_id: Uuid) -> Result<Vec<StockMovement>, AppError> {
        let state = self.state.lock().await;
        State::owned(&state.items, "Item de estoque", item_id, owner, |i| i.business_id)?;
        Ok(state.movements.iter().filter(|m| m.item_id == item_id).cloned().collect())
    }
}

#[async_trait]
impl LoyaltyRepository for MemoryStore {
    async fn find_card(&self, owner: Uuid, customer_id: Uuid) -> Result<Option<LoyaltyCard>, AppError> {
        let state = self.state.lock().await;
        Ok(state.cards.get(&(owner, customer_id)).cloned())
    }

    async fn register_visit(
        &self,
        owner: Uuid,
        customer_id: Uuid,
        default_stamps_required: i32,
        at: DateTime<Utc>,
    ) -> Result<VisitOutcome, AppError> {
        let mut state = self.state.lock().await;
        let card = state.card_entry(owner, customer_id, default_stamps_required);
        let before = card.clone();
        let (after, reward_earned) = before.with_visit(at);
        *card = after.clone();
        Ok(VisitOutcome { before, after, reward_earned })
    }

    async fn set_stamps_required(
        &self,
        owner: Uuid,
        customer_id: Uuid,
        stamps_required: i32,
    ) -> Result<VisitOutcome, AppError> {
        let mut state = self.state.lock().await;
        let card = state.card_entry(owner, customer_id, stamps_required);
        let before = card.clone();
        let (after, reward_earned) = before.with_stamps_required(stamps_required);
        *card = after.clone();
        Ok(VisitOutcome { before, after, reward_earned })
    }
}

#[async_trait]
impl AppointmentRepository for MemoryStore {
    async fn create(&self, owner: Uuid, appointment: NewAppointment) -> Result<Appointment, AppError> {
        let mut state = self.state.lock().await;
        state.insert_appointment(owner, &appointment)
    }

    async fn find(&self, owner: Uuid, appointment_id: Uuid) -> Result<Appointment, AppError> {
        let state = self.state.lock().await;
        State::owned(&state.appointments, "Agendamento", appointment_id, owner, |a| a.business_id).cloned()
    }

    async fn complete(
        &self,
        owner: Uuid,
        appointment_id: Uuid,
        update: CompletionUpdate,
        income: Option<NewFinancialTransaction>,
    ) -> Result<(Appointment, Option<FinancialTransaction>), AppError> {
        let mut state = self.state.lock().await;

        let current = State::owned(&state.appointments, "Agendamento", appointment_id, owner, |a| a.business_id)?;
        current.ensure_scheduled()?;

        let mut completed = current.clone();
        completed.status = AppointmentStatus::Completed;
        completed.payment_status = AppointmentPaymentStatus::Paid;
        completed.price = update.price.or(completed.price);
        completed.payment_method = update.payment_method.or(completed.payment_method);
        completed.completed_at = Some(update.completed_at);
        completed.updated_at = update.completed_at;

        // Receita primeiro: se falhar, o agendamento continua intacto
        let transaction = match &income {
            Some(new_tx) => Some(state.insert_transaction(owner, new_tx)?),
            None => None,
        };
        state.appointments.insert(appointment_id, completed.clone());
        Ok((completed, transaction))
    }

    async fn cancel(&self, owner: Uuid, appointment_id: Uuid, at: DateTime<Utc>) -> Result<Appointment, AppError> {
        let mut state = self.state.lock().await;

        let current = State::owned(&state.appointments, "Agendamento", appointment_id, owner, |a| a.business_id)?;
        current.ensure_scheduled()?;

        let mut cancelled = current.clone();
        cancelled.status = AppointmentStatus::Cancelled;
        cancelled.payment_status = AppointmentPaymentStatus::Cancelled;
        cancelled.updated_at = at;
        state.appointments.insert(appointment_id, cancelled.clone());
        Ok(cancelled)
    }

    async fn list_scheduled_for_day(&self, owner: Uuid, day: NaiveDate) -> Result<Vec<Appointment>, AppError> {
        let state = self.state.lock().await;
        let mut appointments: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| a.business_id == owner && a.status == AppointmentStatus::Scheduled)
            .filter(|a| a.start_at.date_naive() == day)
            .cloned()
            .collect();
        appointments.sort_by_key(|a| a.start_at);
        Ok(appointments)
    }
}

#[async_trait]
impl FinanceRepository for MemoryStore {
    async fn insert_transaction(
        &self,
        owner: Uuid,
        transaction: NewFinancialTransaction,
    ) -> Result<FinancialTransaction, AppError> {
        let mut state = self.state.lock().await;
        state.insert_transaction(owner, &transaction)
    }

    async fn list_for_appointment(&self, owner: Uuid, appointment_id: Uuid) -> Result<Vec<FinancialTransaction>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.business_id == owner && t.appointment_id == Some(appointment_id))
            .cloned()
            .collect())
    }

    async fn list_for_subscription(&self, owner: Uuid, subscription_id: Uuid) -> Result<Vec<FinancialTransaction>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.business_id == owner && t.subscription_id == Some(subscription_id))
            .cloned()
            .collect())
    }

    async fn create_pix_charge(
        &self,
        owner: Uuid,
        charge: NewPixCharge,
        pending_income: Option<NewFinancialTransaction>,
    ) -> Result<(PixCharge, Option<FinancialTransaction>), AppError> {
        let mut state = self.state.lock().await;
        state.insert_pix_charge(owner, charge, pending_income)
    }

    async fn find_pix_charge(&self, owner: Uuid, charge_id: Uuid) -> Result<PixCharge, AppError> {
        let state = self.state.lock().await;
        State::owned(&state.charges, "Cobrança PIX", charge_id, owner, |c| c.business_id).cloned()
    }

    async fn find_pix_charge_by_external(&self, external_id: &str) -> Result<Option<PixCharge>, AppError> {
        let state = self.state.lock().await;
        Ok(state.charges.values().find(|c| c.external_id == external_id).cloned())
    }

    async fn settle_pix_charge(
        &self,
        charge_id: Uuid,
        status: PixChargeStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<PixCharge>, AppError> {
        let mut state = self.state.lock().await;

        let charge = state
            .charges
            .get_mut(&charge_id)
            .ok_or_else(|| AppError::not_found("Cobrança PIX", charge_id))?;

        if !charge.status.can_settle_to(status) {
            return Ok(None);
        }
        charge.status = status;
        charge.paid_at = (status == PixChargeStatus::Paid).then_some(at);
        let settled = charge.clone();

        if let Some(transaction_id) = settled.transaction_id {
            let tx_status = if status == PixChargeStatus::Paid {
                TransactionStatus::Completed
            } else {
                TransactionStatus::Cancelled
            };
            if let Some(line) = state
                .transactions
                .iter_mut()
                .find(|t| t.id == transaction_id && t.status == TransactionStatus::Pending)
            {
                line.status = tx_status;
            }
        }
        Ok(Some(settled))
    }

    async fn list_overdue_charges(&self, owner: Uuid, now: DateTime<Utc>) -> Result<Vec<PixCharge>, AppError> {
        let state = self.state.lock().await;
        let mut charges: Vec<PixCharge> = state
            .charges
            .values()
            .filter(|c| c.business_id == owner && c.status == PixChargeStatus::Pending && c.expires_at < now)
            .cloned()
            .collect();
        charges.sort_by_key(|c| c.expires_at);
        Ok(charges)
    }

    async fn record_charge_reminder(&self, owner: Uuid, charge_id: Uuid) -> Result<PixCharge, AppError> {
        let mut state = self.state.lock().await;
        State::owned(&state.charges, "Cobrança PIX", charge_id, owner, |c| c.business_id)?;

        let charge = state
            .charges
            .get_mut(&charge_id)
            .ok_or_else(|| AppError::not_found("Cobrança PIX", charge_id))?;
        if charge.status != PixChargeStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Cobrança {} não está pendente ({:?})",
                charge_id, charge.status
            )));
        }
        charge.reminders_sent += 1;
        Ok(charge.clone())
    }
}

#[async_trait]
impl ProposalRepository for MemoryStore {
    async fn create(&self, owner: Uuid, proposal: NewProposal) -> Result<Proposal, AppError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let created = Proposal {
            id: Uuid::new_v4(),
            business_id: owner,
            customer_id: proposal.customer_id,
            title: proposal.title,
            services: Json(proposal.services),
            discount_percentage: proposal.discount_percentage,
            total_amount: proposal.amounts.total_amount,
            final_amount: proposal.amounts.final_amount,
            deposit_percentage: proposal.deposit_percentage,
            deposit_amount: proposal.amounts.deposit_amount,
            status: ProposalStatus::Pending,
            valid_until: proposal.valid_until,
            sent_at: None,
            last_sent_at: None,
            viewed_at: None,
            accepted_at: None,
            appointment_id: None,
            created_at: now,
            updated_at: now,
        };
        state.proposals.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find(&self, owner: Uuid, proposal_id: Uuid) -> Result<Proposal, AppError> {
        let state = self.state.lock().await;
        State::owned(&state.proposals, "Proposta", proposal_id, owner, |p| p.business_id).cloned()
    }

    async fn list(&self, owner: Uuid) -> Result<Vec<Proposal>, AppError> {
        let state = self.state.lock().await;
        let mut proposals: Vec<Proposal> = state.proposals.values().filter(|p| p.business_id == owner).cloned().collect();
        proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(proposals)
    }

    async fn update_with(&self, owner: Uuid, proposal_id: Uuid, change: ProposalChange) -> Result<Proposal, AppError> {
        let mut state = self.state.lock().await;
        let current = State::owned(&state.proposals, "Proposta", proposal_id, owner, |p| p.business_id)?;
        let next = change(current)?;
        state.proposals.insert(proposal_id, next.clone());
        Ok(next)
    }

    async fn schedule(
        &self,
        owner: Uuid,
        proposal_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, AppError> {
        let mut state = self.state.lock().await;
        let current = State::owned(&state.proposals, "Proposta", proposal_id, owner, |p| p.business_id)?.clone();

        if let Some(appointment_id) = current.appointment_id {
            let appointment = state
                .appointments
                .get(&appointment_id)
                .cloned()
                .ok_or_else(|| AppError::not_found("Agendamento", appointment_id))?;
            return Ok(ScheduleOutcome { proposal: current, appointment, created: false });
        }

        current.ensure_schedulable()?;

        let appointment = state.insert_appointment(owner, &current.appointment_seed(start_at, end_at))?;
        let mut proposal = current;
        proposal.appointment_id = Some(appointment.id);
        proposal.updated_at = at;
        state.proposals.insert(proposal_id, proposal.clone());
        Ok(ScheduleOutcome { proposal, appointment, created: true })
    }

    async fn delete(&self, owner: Uuid, proposal_id: Uuid) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        State::owned(&state.proposals, "Proposta", proposal_id, owner, |p| p.business_id)?.ensure_deletable()?;
        state.proposals.remove(&proposal_id);
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn create(&self, owner: Uuid, subscription: NewSubscription) -> Result<Subscription, AppError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let created = Subscription {
            id: Uuid::new_v4(),
            business_id: owner,
            customer_id: subscription.customer_id,
            plan_name: subscription.plan_name,
            amount: subscription.amount,
            billing_period: subscription.billing_period,
            status: SubscriptionStatus::Active,
            next_billing_date: subscription.next_billing_date,
            failed_payments_count: 0,
            last_payment_method: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };
        state.subscriptions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find(&self, owner: Uuid, subscription_id: Uuid) -> Result<Subscription, AppError> {
        let state = self.state.lock().await;
        State::owned(&state.subscriptions, "Assinatura", subscription_id, owner, |s| s.business_id).cloned()
    }

    async fn update_with(
        &self,
        owner: Uuid,
        subscription_id: Uuid,
        change: SubscriptionChange,
    ) -> Result<Subscription, AppError> {
        let mut state = self.state.lock().await;
        let current = State::owned(&state.subscriptions, "Assinatura", subscription_id, owner, |s| s.business_id)?;
        let next = change(current)?;
        state.subscriptions.insert(subscription_id, next.clone());
        Ok(next)
    }

    async fn renew(
        &self,
        owner: Uuid,
        subscription_id: Uuid,
        change: SubscriptionChange,
        entry: RenewalEntry,
    ) -> Result<(Subscription, FinancialTransaction, Option<PixCharge>), AppError> {
        let mut state = self.state.lock().await;
        let current = State::owned(&state.subscriptions, "Assinatura", subscription_id, owner, |s| s.business_id)?;
        let next = change(current)?;

        let (transaction, charge) = match entry {
            RenewalEntry::Settled(income) => (state.insert_transaction(owner, &income)?, None),
            RenewalEntry::Pending { charge, income } => match state.insert_pix_charge(owner, charge, Some(income))? {
                (charge, Some(transaction)) => (transaction, Some(charge)),
                (charge, None) => {
                    return Err(anyhow::anyhow!("Cobrança PIX {} sem lançamento vinculado", charge.id).into());
                }
            },
        };

        state.subscriptions.insert(subscription_id, next.clone());
        Ok((next, transaction, charge))
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn create_once(&self, owner: Uuid, task: NewTask) -> Result<Option<Task>, AppError> {
        let mut state = self.state.lock().await;

        if let Some(key) = &task.source_key {
            let duplicated = state
                .tasks
                .iter()
                .any(|t| t.business_id == owner && t.source_key.as_deref() == Some(key.as_str()));
            if duplicated {
                return Ok(None);
            }
        }

        let created = Task {
            id: Uuid::new_v4(),
            business_id: owner,
            title: task.title,
            status: TaskStatus::Pending,
            due_date: task.due_date,
            appointment_id: task.appointment_id,
            source_key: task.source_key,
            created_at: Utc::now(),
        };
        state.tasks.push(created.clone());
        Ok(Some(created))
    }

    async fn list_pending(&self, owner: Uuid) -> Result<Vec<Task>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.business_id == owner && t.status == TaskStatus::Pending)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn seen_among(&self, user_id: Uuid, keys: &[NotificationKey]) -> Result<HashSet<NotificationKey>, AppError> {
        let state = self.state.lock().await;
        Ok(keys.iter().filter(|k| state.views.contains(&(user_id, **k))).copied().collect())
    }

    async fn mark_seen(&self, user_id: Uuid, keys: &[NotificationKey], _at: DateTime<Utc>) -> Result<u64, AppError> {
        let mut state = self.state.lock().await;
        let inserted = keys.iter().filter(|k| state.views.insert((user_id, **k))).count();
        Ok(inserted as u64)
    }

    async fn claim_delivery(
        &self,
        owner: Uuid,
        dedup_key: &str,
        channel: NotificationChannel,
        _at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        let key = (owner, dedup_key.to_string());
        if state.deliveries.contains_key(&key) {
            return Ok(false);
        }
        state.deliveries.insert(key, channel);
        Ok(true)
    }

    async fn release_delivery(&self, owner: Uuid, dedup_key: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        state.deliveries.remove(&(owner, dedup_key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::inventory::{MovementReference, StockMovementType};
    use rust_decimal::Decimal;

    fn item(stock: i64) -> NewInventoryItem {
        NewInventoryItem {
            name: "Shampoo".into(),
            unit: "ml".into(),
            initial_stock: Decimal::from(stock),
            minimum_stock: Decimal::ZERO,
            cost_price: None,
            sale_price: None,
        }
    }

    #[tokio::test]
    async fn movements_chain_previous_and_new_stock() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let created = store.create_item(owner, item(10)).await.unwrap();

        for (kind, qty) in [(StockMovementType::Out, 3), (StockMovementType::In, 5), (StockMovementType::Adjustment, -2)] {
            store
                .apply_movement(
                    owner,
                    NewStockMovement {
                        item_id: created.id,
                        movement_type: kind,
                        quantity: Decimal::from(qty),
                        reason: None,
                        reference: Some(MovementReference::appointment(Uuid::new_v4())),
                    },
                )
                .await
                .unwrap();
        }

        let history = store.list_movements(owner, created.id).await.unwrap();
        assert_eq!(history.len(), 3);
        for pair in history.windows(2) {
            assert_eq!(pair[0].new_stock, pair[1].previous_stock);
        }
        let current = store.find_item(owner, created.id).await.unwrap();
        assert_eq!(current.current_stock, Decimal::from(10));
    }

    #[tokio::test]
    async fn other_owner_gets_forbidden() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let created = store.create_item(owner, item(1)).await.unwrap();

        let err = store.find_item(Uuid::new_v4(), created.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = store.find_item(owner, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delivery_claim_is_exclusive_until_released() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let now = Utc::now();

        assert!(store.claim_delivery(owner, "k", NotificationChannel::Email, now).await.unwrap());
        assert!(!store.claim_delivery(owner, "k", NotificationChannel::Email, now).await.unwrap());
        store.release_delivery(owner, "k").await.unwrap();
        assert!(store.claim_delivery(owner, "k", NotificationChannel::Whatsapp, now).await.unwrap());
    }
}
