mod error;
mod image;
mod json;

pub use error::OutputError;
pub use image::KeyframeWriter;
pub use json::RecordsOutput;
