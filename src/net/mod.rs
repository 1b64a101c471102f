pub mod peers;
pub mod protocol;
pub mod transport;
