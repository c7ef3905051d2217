pub mod detection;
pub mod hedge;
