//! Hosting backends.
//!
//! [`ComBackend`] drives the real hosting interfaces and exists on
//! Windows only. Everywhere else [`UnsupportedBackend`] takes its place so
//! the crate, the binary and the loader tests build on every platform.

#[cfg(windows)]
pub mod com;
pub mod unsupported;

#[cfg(windows)]
pub use self::com::ComBackend;
pub use self::unsupported::UnsupportedBackend;

/// Backend used by the binary on this platform.
#[cfg(windows)]
pub type DefaultBackend = ComBackend;

/// Backend used by the binary on this platform.
#[cfg(not(windows))]
pub type DefaultBackend = UnsupportedBackend;

/// Creates the platform's default backend.
pub fn default_backend() -> DefaultBackend {
    DefaultBackend::new()
}
