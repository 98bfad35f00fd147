pub mod ancs;
pub mod device;
pub mod device_comm;
pub mod reassembler;
pub mod reconnect;
pub mod registry;
pub mod server;
