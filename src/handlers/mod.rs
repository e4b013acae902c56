// src/handlers/mod.rs

pub mod respondent;
pub mod survey;
