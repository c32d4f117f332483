//! Error types for the in-memory loader.
//!
//! Every pipeline stage maps its native failure into exactly one variant
//! here, keeping the raw [`HResult`] and the name of the native call that
//! produced it. Nothing is recovered locally: the loader tears down and
//! the binary reports a single diagnostic line built from
//! [`Error::operation`] and [`Error::status`].

use crate::hresult::HResult;
use std::path::PathBuf;

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while hosting the runtime and running an image.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Runtime Discovery / Bootstrap Errors
    // =========================================================================
    /// No installed runtime matches the requested version tag, or the
    /// metadata host could not be created.
    #[error("runtime {version} not found ({operation} returned {status})")]
    RuntimeNotFound {
        version: String,
        operation: &'static str,
        status: HResult,
    },

    /// The located runtime cannot be loaded into this process.
    #[error("runtime {version} is not loadable into this process ({operation} returned {status})")]
    RuntimeUnloadable {
        version: String,
        operation: &'static str,
        status: HResult,
    },

    /// Binding, host acquisition or start failed.
    #[error("failed to bootstrap runtime: {operation} returned {status}")]
    BootstrapFailed {
        operation: &'static str,
        status: HResult,
    },

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// The default domain could not be obtained or upgraded.
    #[error("default domain unavailable: {operation} returned {status}")]
    DomainUnavailable {
        operation: &'static str,
        status: HResult,
    },

    // =========================================================================
    // Assembly Errors
    // =========================================================================
    /// The domain refused to materialize the image.
    #[error("failed to load assembly from memory: {operation} returned {status}")]
    AssemblyLoadFailed {
        operation: &'static str,
        status: HResult,
    },

    /// The assembly has no entry point (library image) or it could not be read.
    #[error("assembly has no entry point: {operation} returned {status}")]
    NoEntryPoint {
        operation: &'static str,
        status: HResult,
    },

    /// The host reported a failure while invoking the entry point.
    #[error("entry point invocation failed: {operation} returned {status}")]
    InvocationFailed {
        operation: &'static str,
        status: HResult,
    },

    // =========================================================================
    // Input Errors
    // =========================================================================
    /// The version tag is not a valid runtime version.
    #[error("invalid runtime version tag '{tag}': {reason}")]
    InvalidVersionTag { tag: String, reason: &'static str },

    /// The image file could not be read.
    #[error("failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image contains no bytes.
    #[error("image {path} is empty")]
    ImageEmpty { path: PathBuf },

    /// The image exceeds the configured size limit.
    #[error("image exceeds size limit: {size} > {limit} bytes")]
    ImageTooLarge { size: u64, limit: u64 },

    /// Invalid command-line or configuration input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Report serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Name of the native operation that failed, if this is a hosting error.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::RuntimeNotFound { operation, .. }
            | Self::RuntimeUnloadable { operation, .. }
            | Self::BootstrapFailed { operation, .. }
            | Self::DomainUnavailable { operation, .. }
            | Self::AssemblyLoadFailed { operation, .. }
            | Self::NoEntryPoint { operation, .. }
            | Self::InvocationFailed { operation, .. } => Some(*operation),
            _ => None,
        }
    }

    /// Raw native status carried by hosting errors.
    pub fn status(&self) -> Option<HResult> {
        match self {
            Self::RuntimeNotFound { status, .. }
            | Self::RuntimeUnloadable { status, .. }
            | Self::BootstrapFailed { status, .. }
            | Self::DomainUnavailable { status, .. }
            | Self::AssemblyLoadFailed { status, .. }
            | Self::NoEntryPoint { status, .. }
            | Self::InvocationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short name of the pipeline stage this error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::RuntimeNotFound { .. } => "locate",
            Self::RuntimeUnloadable { .. } | Self::BootstrapFailed { .. } => "bootstrap",
            Self::DomainUnavailable { .. } => "domain",
            Self::AssemblyLoadFailed { .. } => "load",
            Self::NoEntryPoint { .. } => "entry-point",
            Self::InvocationFailed { .. } => "invoke",
            Self::InvalidVersionTag { .. } | Self::InvalidArgument(_) => "config",
            Self::ImageRead { .. } | Self::ImageEmpty { .. } | Self::ImageTooLarge { .. } => {
                "input"
            }
            Self::Serialization(_) => "report",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
