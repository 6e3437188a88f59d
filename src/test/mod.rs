mod lifecycle;
pub mod utils;
