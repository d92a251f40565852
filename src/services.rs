pub mod appointment_service;
pub mod auth;
pub mod crm_service;
pub mod events;
pub mod inventory_service;
pub mod loyalty_service;
pub mod notification_service;
pub mod payment_service;
pub mod proposal_service;
pub mod subscription_service;
