pub mod processor;
pub mod stats;
pub mod watermark;
