use uuid::Uuid;

use crate::common::error::AppError;

pub mod appointment_repo;
pub use appointment_repo::{AppointmentRepository, PgAppointmentRepository};
pub mod crm_repo;
pub use crm_repo::{CustomerRepository, PgCustomerRepository};
pub mod finance_repo;
pub use finance_repo::{FinanceRepository, PgFinanceRepository};
pub mod inventory_repo;
pub use inventory_repo::{InventoryRepository, PgInventoryRepository};
pub mod loyalty_repo;
pub use loyalty_repo::{LoyaltyRepository, PgLoyaltyRepository};
pub mod notification_repo;
pub use notification_repo::{NotificationRepository, PgNotificationRepository};
pub mod proposal_repo;
pub use proposal_repo::{PgProposalRepository, ProposalChange, ProposalRepository};
pub mod subscription_repo;
pub use subscription_repo::{PgSubscriptionRepository, SubscriptionChange, SubscriptionRepository};
pub mod task_repo;
pub use task_repo::{PgTaskRepository, TaskRepository};

pub mod memory_store;
pub use memory_store::MemoryStore;

/// Linha de outro negócio: Forbidden (a linha existe, mas não é sua).
pub(crate) fn ensure_owner(entity: &str, id: Uuid, row_owner: Uuid, owner: Uuid) -> Result<(), AppError> {
    if row_owner != owner {
        return Err(AppError::forbidden(entity, id));
    }
    Ok(())
}
