pub mod broadcast;
pub mod models;
