pub mod appointment;
pub mod auth;
pub mod crm;
pub mod finance;
pub mod inventory;
pub mod loyalty;
pub mod notification;
pub mod proposal;
pub mod subscription;
