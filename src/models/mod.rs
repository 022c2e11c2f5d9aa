pub mod alarm;
pub mod device;
pub mod message;
pub mod monitoring;
pub mod subscriber;

pub use alarm::*;
pub use device::*;
pub use message::*;
pub use monitoring::*;
pub use subscriber::*;
