pub mod appointment;
pub mod customer;
pub mod inventory_item;
pub mod inventory_transaction;
pub mod invoice;
pub mod payment;
pub mod technician;
pub mod vehicle;
pub mod work_order;
pub mod work_order_line_item;

pub use appointment::AppointmentStatus;
pub use inventory_transaction::TransactionType;
pub use invoice::InvoiceStatus;
pub use payment::PaymentMethod;
pub use work_order::WorkOrderStatus;
