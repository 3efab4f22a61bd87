mod comm;
mod device;
mod group;
mod stream;

pub use comm::Comm;
pub use device::Device;
pub use group::DeviceGroup;
pub use stream::Stream;
