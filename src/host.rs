//! Hosting interface chain - the seams between the loader and a backend.
//!
//! Each trait mirrors one interface in the native hosting chain:
//!
//! ```text
//!   ClrBackend ──locate──► RuntimeInfo ──host──► RuntimeHost ──default_domain──► Unknown
//!                                                                                   │
//!                                                      Capability::query (upgrade) ◄┘
//!                                                                │
//!   EntryPoint ◄──entry_point── Assembly ◄──load_raw── AppDomain ◄┘
//! ```
//!
//! Backends report raw [`HResult`]s tagged with the native operation name
//! ([`NativeError`]); the loader decides which error class a failure
//! belongs to. Handle types own their native reference and release it
//! when dropped. The three top-level handles additionally implement
//! [`Release`] so the session can release them explicitly and in order.

use crate::config::RuntimeVersion;
use crate::constants::{VT_EMPTY, VT_NULL};
use crate::hresult::HResult;
use crate::image::NativeArrayView;
use serde::Serialize;
use std::fmt;

/// Native operation names reported in diagnostics.
pub mod ops {
    pub const CREATE_META_HOST: &str = "CLRCreateInstance";
    pub const ENUMERATE_RUNTIMES: &str = "ICLRMetaHost::EnumerateInstalledRuntimes";
    pub const GET_RUNTIME: &str = "ICLRMetaHost::GetRuntime";
    pub const GET_VERSION_STRING: &str = "ICLRRuntimeInfo::GetVersionString";
    pub const IS_LOADABLE: &str = "ICLRRuntimeInfo::IsLoadable";
    pub const BIND_AS_LEGACY_V2: &str = "ICLRRuntimeInfo::BindAsLegacyV2Runtime";
    pub const GET_INTERFACE: &str = "ICLRRuntimeInfo::GetInterface";
    pub const START: &str = "ICorRuntimeHost::Start";
    pub const GET_DEFAULT_DOMAIN: &str = "ICorRuntimeHost::GetDefaultDomain";
    pub const QUERY_INTERFACE: &str = "IUnknown::QueryInterface";
    pub const LOAD_3: &str = "_AppDomain::Load_3";
    pub const GET_ENTRY_POINT: &str = "_Assembly::get_EntryPoint";
    pub const GET_NAME: &str = "_MethodInfo::get_name";
    pub const INVOKE_3: &str = "_MethodInfo::Invoke_3";
    pub const RELEASE: &str = "IUnknown::Release";
}

// =============================================================================
// Native Results
// =============================================================================

/// A failed native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeError {
    /// Name of the native operation.
    pub operation: &'static str,
    /// Status it returned.
    pub status: HResult,
}

impl NativeError {
    pub fn new(operation: &'static str, status: HResult) -> Self {
        Self { operation, status }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} returned {}", self.operation, self.status)
    }
}

/// Result of a native call.
pub type NativeResult<T> = std::result::Result<T, NativeError>;

// =============================================================================
// Invocation Values
// =============================================================================

/// Target argument passed to the entry point.
///
/// Entry points are static, so the target is always the null marker.
/// Entry points declared with a `string[]` parameter are not supported:
/// no parameter array is passed and the runtime rejects the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvocationArgument {
    /// Tagged empty value (`VT_NULL`).
    #[default]
    Null,
}

impl InvocationArgument {
    /// Variant tag for this argument.
    pub fn vartype(&self) -> u16 {
        match self {
            Self::Null => VT_NULL,
        }
    }
}

/// Decoded return value of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnValue {
    /// `VT_EMPTY`: the entry point returns void.
    Empty,
    /// A 32-bit integer exit code.
    Int(i32),
    /// A value of some other variant type.
    Unsupported(u16),
}

impl ReturnValue {
    /// Variant tag of the value.
    pub fn vartype(&self) -> u16 {
        match self {
            Self::Empty => VT_EMPTY,
            Self::Int(_) => crate::constants::VT_I4,
            Self::Unsupported(vt) => *vt,
        }
    }
}

/// Exit code produced by the invoked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReturnCode(pub i32);

impl ReturnCode {
    /// Low eight bits, as used for a process exit status.
    pub fn as_exit_status(self) -> u8 {
        (self.0 & 0xff) as u8
    }
}

impl From<ReturnValue> for ReturnCode {
    fn from(value: ReturnValue) -> Self {
        match value {
            ReturnValue::Int(code) => Self(code),
            ReturnValue::Empty | ReturnValue::Unsupported(_) => Self(0),
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Interface Traits
// =============================================================================

/// Explicit release of a top-level handle.
///
/// Consumes the handle; a release failure is reported but the handle is
/// gone either way.
pub trait Release: Sized {
    fn release(self) -> NativeResult<()>;
}

/// A hosting backend: entry to the interface chain.
pub trait ClrBackend {
    /// Located runtime (`ICLRRuntimeInfo`).
    type Runtime: RuntimeInfo<Host = Self::Host> + Release;
    /// Hosting interface (`ICorRuntimeHost`).
    type Host: RuntimeHost<Unknown = Self::Unknown> + Release;
    /// Generic handle to the default domain (`IUnknown`).
    type Unknown;
    /// Typed domain interface (`_AppDomain`).
    type Domain: AppDomain<Assembly = Self::Assembly> + Capability<Self::Unknown> + Release;
    /// Loaded assembly (`_Assembly`).
    type Assembly: Assembly<EntryPoint = Self::EntryPoint>;
    /// Entry method (`_MethodInfo`).
    type EntryPoint: EntryPoint;

    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Returns true if the backend can host a runtime on this platform.
    fn is_available(&self) -> bool;

    /// Returns why the backend is unavailable.
    fn unavailable_reason(&self) -> Option<&str>;

    /// Version strings of every runtime installed on the host.
    fn installed_runtimes(&self) -> NativeResult<Vec<String>>;

    /// Locates the runtime matching `version` exactly.
    fn get_runtime(&self, version: &RuntimeVersion) -> NativeResult<Self::Runtime>;
}

/// A located runtime.
pub trait RuntimeInfo {
    type Host;

    /// The runtime's own version string.
    fn version_string(&self) -> NativeResult<String>;

    /// Whether the runtime can be loaded into the current process.
    fn is_loadable(&self) -> NativeResult<bool>;

    /// Binds the legacy activation surface to this runtime.
    fn bind_as_legacy_v2(&self) -> NativeResult<()>;

    /// Acquires the hosting interface. Does not start the runtime.
    fn runtime_host(&self) -> NativeResult<Self::Host>;
}

/// The hosting interface of a runtime.
pub trait RuntimeHost {
    type Unknown;

    /// Starts the runtime in this process.
    fn start(&self) -> NativeResult<()>;

    /// Generic handle to the default domain.
    fn default_domain(&self) -> NativeResult<Self::Unknown>;
}

/// Upgrade from a generic handle `U` to a richer interface.
pub trait Capability<U>: Sized {
    /// Interface name for diagnostics.
    const INTERFACE: &'static str;

    /// Queries `from` for this interface. Fails if the object does not
    /// support it.
    fn query(from: &U) -> NativeResult<Self>;
}

/// An execution domain.
pub trait AppDomain {
    type Assembly;

    /// Materializes an assembly from an in-memory image.
    ///
    /// The view, and the bytes it aliases, must stay valid until this
    /// returns; the borrow enforces it.
    fn load_raw(&self, image: &mut NativeArrayView<'_>) -> NativeResult<Self::Assembly>;
}

/// A loaded assembly.
pub trait Assembly {
    type EntryPoint;

    /// The designated entry method, or `None` for a library image.
    fn entry_point(&self) -> NativeResult<Option<Self::EntryPoint>>;
}

/// A resolved entry method.
pub trait EntryPoint {
    /// Method name.
    fn name(&self) -> NativeResult<String>;

    /// Invokes the method synchronously. Blocks until it returns.
    fn invoke(&self, target: InvocationArgument) -> NativeResult<ReturnValue>;
}
