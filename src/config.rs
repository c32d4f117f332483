//! Loader configuration.
//!
//! The only hosting input is the runtime version tag. The image path and
//! size limit configure the file reader that feeds the pipeline.

use crate::constants::{
    DEFAULT_RUNTIME_VERSION, MAX_IMAGE_SIZE, RUNTIME_VERSION_ENV, validate_version_tag,
};
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A validated runtime version tag such as `v4.0.30319`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RuntimeVersion(String);

impl RuntimeVersion {
    /// Parses and validates a version tag.
    pub fn parse(tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        match validate_version_tag(&tag) {
            Ok(()) => Ok(Self(tag)),
            Err(reason) => Err(Error::InvalidVersionTag { tag, reason }),
        }
    }

    /// Returns the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the tag as a NUL-terminated UTF-16 string for native calls.
    pub fn to_wide(&self) -> Vec<u16> {
        self.0.encode_utf16().chain(std::iter::once(0)).collect()
    }
}

impl Default for RuntimeVersion {
    fn default() -> Self {
        Self(DEFAULT_RUNTIME_VERSION.to_string())
    }
}

impl FromStr for RuntimeVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration for one loader run.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Runtime version to bind against.
    pub runtime_version: RuntimeVersion,
    /// Executable image to read.
    pub image_path: PathBuf,
    /// Upper bound on the image size in bytes.
    pub max_image_size: usize,
}

impl LoaderConfig {
    /// Creates a configuration with the default runtime version and size limit.
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            runtime_version: RuntimeVersion::default(),
            image_path: image_path.into(),
            max_image_size: MAX_IMAGE_SIZE,
        }
    }

    /// Overrides the runtime version.
    pub fn with_runtime_version(mut self, version: RuntimeVersion) -> Self {
        self.runtime_version = version;
        self
    }

    /// Overrides the image size limit.
    pub fn with_max_image_size(mut self, limit: usize) -> Self {
        self.max_image_size = limit;
        self
    }

    /// Resolves the version tag: explicit flag, then environment, then default.
    pub fn resolve_version(flag: Option<&str>, env: Option<&str>) -> Result<RuntimeVersion> {
        match flag.or(env) {
            Some(tag) => RuntimeVersion::parse(tag),
            None => Ok(RuntimeVersion::default()),
        }
    }

    /// Builds a configuration, consulting `CLRLOAD_RUNTIME_VERSION` when
    /// no version flag was given.
    pub fn from_env(image_path: impl Into<PathBuf>, flag: Option<&str>) -> Result<Self> {
        let env = std::env::var(RUNTIME_VERSION_ENV).ok();
        let version = Self::resolve_version(flag, env.as_deref())?;
        Ok(Self::new(image_path).with_runtime_version(version))
    }
}
