//! # clrload
//!
//! **In-Process CLR Host for In-Memory Executables**
//!
//! This crate loads the managed runtime into the current process, hands
//! it an executable image that exists only as a byte buffer, resolves the
//! image's entry point and runs it synchronously, returning its exit code.
//! The image is never written to disk.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            clrload                                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                      Loader Pipeline                        │    │
//! │  │  locate → check → bind → start → domain → load → entry →    │    │
//! │  │                         invoke                              │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │                              │                                      │
//! │  ┌───────────────────────────┼───────────────────────────────┐      │
//! │  │                    Session (lifecycle)                    │      │
//! │  │   runtime → host → domain acquired; released in reverse   │      │
//! │  └───────────────────────────┼───────────────────────────────┘      │
//! │                              │                                      │
//! │  ┌───────────────────────────┼───────────────────────────────┐      │
//! │  │                   ClrBackend traits                       │      │
//! │  │  RuntimeInfo │ RuntimeHost │ Capability │ AppDomain │ ... │      │
//! │  └───────────────────────────────────────────────────────────┘      │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                          Backends                                   │
//! │  ┌──────────────────────┐            ┌──────────────────────┐       │
//! │  │      ComBackend      │            │  UnsupportedBackend  │       │
//! │  │      (Windows)       │            │   (everything else)  │       │
//! │  │  mscoree + mscorlib  │            │  fails at locate     │       │
//! │  └──────────────────────┘            └──────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Failure Model
//!
//! Every stage either produces the handle the next one needs or ends the
//! run. There is no retry and no partial success. Whatever was acquired is
//! released exactly once, in reverse order, and the error names the native
//! operation and its raw status code.
//!
//! # Security Model
//!
//! The invoked program runs with the full privileges of the host process.
//! The runtime applies its own policy checks while loading the image; this
//! crate neither adds nor bypasses any.
//!
//! # Example
//!
//! ```rust,ignore
//! use clrload::{ByteImage, Loader, RuntimeVersion, default_backend};
//!
//! fn main() -> clrload::Result<()> {
//!     let bytes = clrload::read_image("TestEXE.exe".as_ref(), clrload::MAX_IMAGE_SIZE)?;
//!     let loader = Loader::new(default_backend());
//!     let report = loader.execute(&RuntimeVersion::default(), ByteImage::new(&bytes))?;
//!     println!("returned {}", report.return_code);
//!     Ok(())
//! }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod error;
pub mod host;
pub mod hresult;
pub mod image;
pub mod lifecycle;
pub mod loader;

// Re-exports
pub use backends::{DefaultBackend, UnsupportedBackend, default_backend};
pub use config::{LoaderConfig, RuntimeVersion};
pub use constants::*;
pub use error::{Error, Result};
pub use host::{ClrBackend, InvocationArgument, NativeError, ReturnCode, ReturnValue};
pub use hresult::HResult;
pub use image::{ByteImage, NativeArrayView, read_image};
pub use lifecycle::{HandleKind, Session};
pub use loader::{Loader, RunReport, execute};

#[cfg(windows)]
pub use backends::ComBackend;
