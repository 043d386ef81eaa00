pub mod api;
pub mod app;
pub mod codec;
pub mod config;
pub mod image_pipeline;
pub mod message;
pub mod model;
pub mod views;
