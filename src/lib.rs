pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod postprocess;
pub mod prompt;
pub mod quiz;
pub mod report;
pub mod util;
