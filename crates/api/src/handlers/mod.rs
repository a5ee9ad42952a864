pub mod models;
pub mod predict;
pub mod progress;
