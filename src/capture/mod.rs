// Capture module - the image -> OCR -> analysis pipeline

pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod routes;


pub use routes::capture_routes;
