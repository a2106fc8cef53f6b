pub mod error;
pub mod matrix;
pub mod scratch;
pub mod stream;

pub use error::DeviceError;
pub use matrix::{DeviceMatrix, DeviceScalar, DeviceVector};
pub use scratch::{ScratchBuf, ScratchPool};
pub use stream::DeviceStream;

/// Element type for device-resident buffers.
pub type Real = f64;
