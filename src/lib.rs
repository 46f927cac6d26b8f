pub mod config;
pub mod history;
pub mod plot;
pub mod process;
