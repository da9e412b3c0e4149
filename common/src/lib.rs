pub mod bck;
pub mod bmd;
pub mod constants;
pub mod error;
pub mod msg;
pub mod owner;
pub mod persist;
pub mod smap;
pub mod telemetry;
pub mod time_utils;
