//! Type definitions

pub mod accrual;
pub mod import;
pub mod market;

pub use accrual::*;
pub use import::*;
pub use market::*;
