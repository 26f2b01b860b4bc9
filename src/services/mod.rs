pub mod cleanup;
pub mod initializer;
pub mod reservation;

pub use cleanup::HoldSweeper;
pub use initializer::{initialize_grid, GridSummary};
pub use reservation::{ConfirmReport, HoldReceipt, ReservationEngine};
