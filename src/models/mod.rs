// src/models/mod.rs

pub mod account;
pub mod attempt;
pub mod exam;
pub mod payment;
pub mod user;
