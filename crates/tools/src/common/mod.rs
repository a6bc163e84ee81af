pub mod chunks;
pub mod io;
