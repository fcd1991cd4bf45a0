//! Core data types for Peerfund

pub mod contribution;
pub mod entity;
pub mod loan_request;
pub mod money;
pub mod repayment;
pub mod user;
