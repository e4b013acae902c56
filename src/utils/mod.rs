// src/utils/mod.rs

pub mod retry;
