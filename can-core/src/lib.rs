//! **`can-core`**, adapter independent CAN abstractions shared by the driver crates.

mod constants;
pub use constants::*;
mod device;
pub use device::*;
mod frame;
pub use frame::*;

pub mod error;
pub use error::CanError;
pub mod utils;
