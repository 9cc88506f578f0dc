pub mod config;
pub mod news;
pub mod program;
pub mod state;
