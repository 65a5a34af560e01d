pub mod notification;
pub mod repository;

pub use notification::NotificationPort;
pub use repository::{
    InterventionRepository, InvoiceRepository, MechanicRepository, RequestRepository,
};
