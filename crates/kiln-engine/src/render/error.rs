use core::fmt;
use std::panic::Location;
use std::path::PathBuf;

use super::GpuHandle;

/// Error code raised by the emulated graphics context after a call.
///
/// Names mirror the classic GL error enumerants so logs read the same on
/// every backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ApiError {
    InvalidEnum,
    InvalidValue,
    InvalidOperation,
    OutOfMemory,
    InvalidFramebufferOperation,
}

impl ApiError {
    pub const fn name(self) -> &'static str {
        match self {
            ApiError::InvalidEnum => "INVALID_ENUM",
            ApiError::InvalidValue => "INVALID_VALUE",
            ApiError::InvalidOperation => "INVALID_OPERATION",
            ApiError::OutOfMemory => "OUT_OF_MEMORY",
            ApiError::InvalidFramebufferOperation => "INVALID_FRAMEBUFFER_OPERATION",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every error drained from the queue after one checked call.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ApiErrors(pub Vec<ApiError>);

impl ApiErrors {
    pub fn contains(&self, err: ApiError) -> bool {
        self.0.contains(&err)
    }
}

impl fmt::Display for ApiErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(e.name())?;
        }
        Ok(())
    }
}

/// Recoverable rendering errors.
///
/// Programmer errors (null handles, out-of-range buffer writes) are not represented
/// here; they abort through [`precondition!`].
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("graphics call `{call}` failed with [{errors}] at {location}")]
    Api {
        call: &'static str,
        errors: ApiErrors,
        location: &'static Location<'static>,
    },

    #[error("could not find uniform `{name}` in shader program {program}")]
    UnknownUniform { name: String, program: GpuHandle },

    #[error("failed to read shader source `{}`", path.display())]
    ShaderSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    /// Returns the drained API errors when this is a failed checked call.
    pub fn api_errors(&self) -> Option<&ApiErrors> {
        match self {
            RenderError::Api { errors, .. } => Some(errors),
            _ => None,
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Aborts on a violated programmer contract after logging it.
///
/// Continuing past one of these would operate on corrupt GPU state, so the
/// failure is never turned into a `Result`.
macro_rules! precondition {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            let msg = format!($($arg)+);
            log::error!(target: "kiln::render", "precondition violated: {msg}");
            panic!("precondition violated: {msg}");
        }
    };
}

pub(crate) use precondition;
