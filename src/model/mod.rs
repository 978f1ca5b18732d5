pub mod common;
pub mod period;
pub mod record;
