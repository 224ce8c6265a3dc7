pub mod clean;
pub mod packages;
pub mod resolve;
pub mod serve;
