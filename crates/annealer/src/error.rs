use device::DeviceError;
use rng::RngError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnnealError {
    /// State-machine precondition violated; names the missing flag.
    #[error("not ready: {missing} is not set")]
    NotReady { missing: &'static str },

    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}
