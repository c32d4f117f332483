//! # Loader Constants
//!
//! Version tags, input bounds and the native tag values shared by the
//! loader and its backends. Values that mirror platform headers
//! (`VARTYPE` tags, `SAFEARRAY` feature flags) must not be changed.
//!
//! ## Cross-References
//!
//! - [`crate::config`]: default version tag and image size limit
//! - [`crate::image`]: `SAFEARRAY` descriptor flags
//! - [`crate::host`]: variant tags for invocation arguments and results

// =============================================================================
// Runtime Versions
// =============================================================================

/// Runtime version bound to when none is configured.
///
/// The 4.x runtime is the only one present on current Windows installs.
pub const DEFAULT_RUNTIME_VERSION: &str = "v4.0.30319";

/// The 2.0/3.5 runtime tag, for images built against the old framework.
pub const LEGACY_RUNTIME_VERSION: &str = "v2.0.50727";

/// Environment variable consulted when no version flag is given.
pub const RUNTIME_VERSION_ENV: &str = "CLRLOAD_RUNTIME_VERSION";

/// Maximum accepted version tag length.
pub const MAX_VERSION_TAG_LEN: usize = 32;

// =============================================================================
// Image Limits
// =============================================================================

/// Maximum image size read into memory (256 MiB).
///
/// **Rationale**: The whole image is held in memory and mapped by the
/// runtime a second time; managed executables are rarely above a few MiB.
pub const MAX_IMAGE_SIZE: usize = 256 * 1024 * 1024;

// =============================================================================
// Native Tags
// =============================================================================

/// `VT_EMPTY`: no value (void return).
pub const VT_EMPTY: u16 = 0;

/// `VT_NULL`: explicit null, used as the invocation target of a static entry point.
pub const VT_NULL: u16 = 1;

/// `VT_I4`: 32-bit signed integer.
pub const VT_I4: u16 = 3;

/// `VT_UI1`: unsigned byte, the element type of the image array.
pub const VT_UI1: u16 = 17;

/// `VT_INT`: machine integer.
pub const VT_INT: u16 = 22;

/// `FADF_AUTO`: array storage is owned by the caller, never freed by the callee.
pub const FADF_AUTO: u16 = 0x0001;

/// `FADF_FIXEDSIZE`: array may not be resized.
pub const FADF_FIXEDSIZE: u16 = 0x0010;

// =============================================================================
// Version Tag Validation Helper
// =============================================================================

/// Validates a runtime version tag.
///
/// A tag is a `v` followed by three or four dot-separated decimal
/// components, e.g. `v4.0.30319`.
///
/// # Returns
///
/// `Ok(())` if valid, `Err(reason)` with a description of the failure.
#[inline]
#[must_use = "validation result must be checked before binding a runtime"]
pub fn validate_version_tag(tag: &str) -> std::result::Result<(), &'static str> {
    if tag.is_empty() {
        return Err("version tag cannot be empty");
    }
    if tag.len() > MAX_VERSION_TAG_LEN {
        return Err("version tag exceeds maximum length");
    }
    let Some(digits) = tag.strip_prefix('v') else {
        return Err("version tag must start with 'v'");
    };
    let parts: Vec<&str> = digits.split('.').collect();
    if !(3..=4).contains(&parts.len()) {
        return Err("version tag must have three or four components");
    }
    if parts
        .iter()
        .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err("version components must be decimal numbers");
    }
    Ok(())
}
