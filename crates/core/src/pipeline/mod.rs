pub mod config;
pub mod pipeline_controller;
pub mod pipeline_error;
pub mod pipeline_logger;
pub mod pipeline_state;
