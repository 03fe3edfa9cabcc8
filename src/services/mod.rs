//! Business logic services

pub mod accrual_import;
