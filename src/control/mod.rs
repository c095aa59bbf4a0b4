pub mod rpc;
pub mod surface;

pub use surface::ControlSurface;
