// src/services/mod.rs
pub mod pdf_processor;
