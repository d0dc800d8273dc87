pub mod account;
pub mod booking;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod error;
pub mod flight;
pub mod io;
pub mod layout;
pub mod paths;
pub mod reservation;
pub mod scheduler;
pub mod task;
pub mod types;
pub mod upstream;
pub mod watchdog;
pub mod window;

#[cfg(test)]
mod testing;

pub use error::{Result, SeatError};
