// src/services/mod.rs

pub mod attempts;
pub mod catalog;
pub mod ledger;
pub mod randomizer;
pub mod sessions;
pub mod settlement;
