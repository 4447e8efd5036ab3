pub mod common_options;
pub mod flash;
pub mod logging;
