pub mod appointments;
pub mod crm;
pub mod inventory;
pub mod notifications;
pub mod payments;
pub mod proposals;
pub mod subscriptions;
