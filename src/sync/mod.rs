pub mod join;
pub mod prediction;
pub mod scheduler;
pub mod session;
pub mod status;
