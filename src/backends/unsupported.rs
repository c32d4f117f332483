//! Stand-in backend for hosts without the runtime hosting API.
//!
//! Every call fails at the first step with `E_PLATFORM_UNSUPPORTED`, so a
//! run reports `RuntimeNotFound` and exits through the normal error path.
//! The handle types are uninhabited: no handle can ever be produced.

use crate::config::RuntimeVersion;
use crate::hresult::HResult;
use crate::host::{
    AppDomain, Assembly, Capability, ClrBackend, EntryPoint, InvocationArgument, NativeError,
    NativeResult, Release, ReturnValue, RuntimeHost, RuntimeInfo, ops,
};
use crate::image::NativeArrayView;

/// A handle that cannot exist.
#[derive(Debug)]
pub enum NoHandle {}

/// Backend for platforms without CLR hosting.
#[derive(Debug)]
pub struct UnsupportedBackend {
    reason: String,
}

impl UnsupportedBackend {
    pub fn new() -> Self {
        Self {
            reason: format!(
                "CLR hosting only available on Windows (running on {})",
                std::env::consts::OS
            ),
        }
    }

    fn unsupported(operation: &'static str) -> NativeError {
        NativeError::new(operation, HResult::E_PLATFORM_UNSUPPORTED)
    }
}

impl Default for UnsupportedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ClrBackend for UnsupportedBackend {
    type Runtime = NoHandle;
    type Host = NoHandle;
    type Unknown = NoHandle;
    type Domain = NoHandle;
    type Assembly = NoHandle;
    type EntryPoint = NoHandle;

    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn unavailable_reason(&self) -> Option<&str> {
        Some(&self.reason)
    }

    fn installed_runtimes(&self) -> NativeResult<Vec<String>> {
        Err(Self::unsupported(ops::CREATE_META_HOST))
    }

    fn get_runtime(&self, _version: &RuntimeVersion) -> NativeResult<NoHandle> {
        Err(Self::unsupported(ops::CREATE_META_HOST))
    }
}

impl Release for NoHandle {
    fn release(self) -> NativeResult<()> {
        match self {}
    }
}

impl RuntimeInfo for NoHandle {
    type Host = NoHandle;

    fn version_string(&self) -> NativeResult<String> {
        match *self {}
    }

    fn is_loadable(&self) -> NativeResult<bool> {
        match *self {}
    }

    fn bind_as_legacy_v2(&self) -> NativeResult<()> {
        match *self {}
    }

    fn runtime_host(&self) -> NativeResult<NoHandle> {
        match *self {}
    }
}

impl RuntimeHost for NoHandle {
    type Unknown = NoHandle;

    fn start(&self) -> NativeResult<()> {
        match *self {}
    }

    fn default_domain(&self) -> NativeResult<NoHandle> {
        match *self {}
    }
}

impl Capability<NoHandle> for NoHandle {
    const INTERFACE: &'static str = "none";

    fn query(from: &NoHandle) -> NativeResult<Self> {
        match *from {}
    }
}

impl AppDomain for NoHandle {
    type Assembly = NoHandle;

    fn load_raw(&self, _image: &mut NativeArrayView<'_>) -> NativeResult<NoHandle> {
        match *self {}
    }
}

impl Assembly for NoHandle {
    type EntryPoint = NoHandle;

    fn entry_point(&self) -> NativeResult<Option<NoHandle>> {
        match *self {}
    }
}

impl EntryPoint for NoHandle {
    fn name(&self) -> NativeResult<String> {
        match *self {}
    }

    fn invoke(&self, _target: InvocationArgument) -> NativeResult<ReturnValue> {
        match *self {}
    }
}
