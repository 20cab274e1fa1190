pub mod classifier;
pub mod config;
pub mod io_struct;
pub mod logging;
pub mod server;
pub mod storage;
