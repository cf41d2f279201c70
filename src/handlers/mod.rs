// src/handlers/mod.rs

pub mod auth;
pub mod coins;
pub mod exams;
pub mod portal;
pub mod profile;
pub mod webhook;
