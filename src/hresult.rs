//! Native status codes.
//!
//! Every call across the hosting boundary reports a 32-bit `HRESULT`.
//! Zero is the only success value this crate accepts: `S_FALSE` and any
//! other non-zero status abort the run, matching how the hosting
//! interfaces are driven in practice.

use serde::Serialize;
use std::fmt;

/// A raw 32-bit native status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct HResult(pub i32);

impl HResult {
    /// Operation succeeded.
    pub const S_OK: Self = Self(0);
    /// Operation succeeded with a negative answer.
    pub const S_FALSE: Self = Self(1);
    /// Not implemented.
    pub const E_NOTIMPL: Self = Self::from_bits(0x8000_4001);
    /// The object does not support the requested interface.
    pub const E_NOINTERFACE: Self = Self::from_bits(0x8000_4002);
    /// Invalid pointer.
    pub const E_POINTER: Self = Self::from_bits(0x8000_4003);
    /// Unspecified failure.
    pub const E_FAIL: Self = Self::from_bits(0x8000_4005);
    /// Invalid argument.
    pub const E_INVALIDARG: Self = Self::from_bits(0x8007_0057);
    /// Image is not a valid executable (`BadImageFormatException`).
    pub const COR_E_BADIMAGEFORMAT: Self = Self::from_bits(0x8007_000B);
    /// Invoked code threw (`TargetInvocationException`).
    pub const COR_E_TARGETINVOCATION: Self = Self::from_bits(0x8013_1604);
    /// Argument count mismatch (`TargetParameterCountException`).
    pub const COR_E_TARGETPARAMCOUNT: Self = Self::from_bits(0x8013_8002);
    /// The requested runtime version is not installed.
    pub const CLR_E_SHIM_RUNTIME: Self = Self::from_bits(0x8013_1700);
    /// Operation is not supported on this host platform.
    pub const E_PLATFORM_UNSUPPORTED: Self = Self::from_bits(0x8013_1539);

    /// Builds a status from its unsigned bit pattern.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits as i32)
    }

    /// Returns the unsigned bit pattern.
    pub const fn bits(self) -> u32 {
        self.0 as u32
    }

    /// Returns true for `S_OK` only.
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Converts the status into a `Result`, treating any non-zero value as failure.
    pub fn ok(self) -> std::result::Result<(), HResult> {
        if self.is_ok() { Ok(()) } else { Err(self) }
    }

    /// Symbolic name for well-known codes.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::S_OK => "S_OK",
            Self::S_FALSE => "S_FALSE",
            Self::E_NOTIMPL => "E_NOTIMPL",
            Self::E_NOINTERFACE => "E_NOINTERFACE",
            Self::E_POINTER => "E_POINTER",
            Self::E_FAIL => "E_FAIL",
            Self::E_INVALIDARG => "E_INVALIDARG",
            Self::COR_E_BADIMAGEFORMAT => "COR_E_BADIMAGEFORMAT",
            Self::COR_E_TARGETINVOCATION => "COR_E_TARGETINVOCATION",
            Self::COR_E_TARGETPARAMCOUNT => "COR_E_TARGETPARAMCOUNT",
            Self::CLR_E_SHIM_RUNTIME => "CLR_E_SHIM_RUNTIME",
            Self::E_PLATFORM_UNSUPPORTED => "E_PLATFORM_UNSUPPORTED",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.bits())
    }
}

impl From<i32> for HResult {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

#[cfg(windows)]
impl From<windows::core::HRESULT> for HResult {
    fn from(hr: windows::core::HRESULT) -> Self {
        Self(hr.0)
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for HResult {
    fn from(err: windows::core::Error) -> Self {
        Self(err.code().0)
    }
}
