pub mod cli;
pub mod output;
pub mod pipeline;
pub mod selector;
pub mod settings;
