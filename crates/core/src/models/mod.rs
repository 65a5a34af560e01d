pub mod invoice;
pub mod mechanic;
pub mod request;

pub use invoice::{Intervention, Invoice, PaymentMethod, PaymentStatus};
pub use mechanic::{Mechanic, MechanicFilter, Station};
pub use request::{
    BreakdownType, GeoPoint, Request, RequestDraft, RequestFilter, RequestStatus, VehicleInfo,
};
