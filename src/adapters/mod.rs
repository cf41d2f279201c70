// src/adapters/mod.rs

pub mod mailer;
pub mod memory;
pub mod postgres;
pub mod razorpay;
