use thiserror::Error;

use crate::audio::capture::DeviceError;
use crate::live::transport::ConnectionError;

/// Failures surfaced to the caller of the session controller.
///
/// Only device and connection problems cross this boundary; codec and
/// tool-call problems are absorbed inside the dispatch path.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
