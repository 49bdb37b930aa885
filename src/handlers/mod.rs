pub mod appointments;
pub mod common;
pub mod customers;
pub mod dashboard;
pub mod inventory;
pub mod invoices;
pub mod technicians;
pub mod vehicles;
pub mod work_orders;
