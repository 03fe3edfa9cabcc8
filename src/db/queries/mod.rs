//! Database queries

pub mod accrual;
pub mod location;
pub mod market;
pub mod schema;
pub mod space;
pub mod tenant;
