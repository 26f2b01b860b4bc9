pub mod seat;
pub mod venue;

pub use seat::{
    now_micros, ExpectedState, PaymentOutcome, PaymentStatus, Seat, SeatId, SeatStatus,
    SeatUpdate,
};
pub use venue::{LayoutError, VenueLayout};
