pub mod allocator;
pub mod ledger;

pub use allocator::{SeatAllocator, SeatRequest};
pub use ledger::ReservationLedger;
