pub mod databases;
pub mod servers;
