// src/models/mod.rs

pub mod analytics;
pub mod response;
pub mod survey;
pub mod token;
