pub mod configure;
pub mod logger;
pub mod logging;
pub mod record_store;
pub mod transfer;
