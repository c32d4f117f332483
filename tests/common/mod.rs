//! Recording test double for the hosting interface chain.
//!
//! Every native call is appended to a shared journal, and any call can be
//! made to fail by registering a fault for its operation name. Images use
//! a tiny fake format understood only by this double:
//!
//! ```text
//!   "MZ" 'E' <i32 LE>   executable returning the given code
//!   "MZ" 'V'            executable with a void entry point
//!   "MZ" 'S'            executable whose entry point returns a string
//!   "MZ" 'L'            library (no entry point)
//!   anything else       rejected with COR_E_BADIMAGEFORMAT
//! ```

#![allow(dead_code)]

use clrload::host::{
    AppDomain, Assembly, Capability, ClrBackend, EntryPoint, InvocationArgument, NativeError,
    NativeResult, Release, ReturnValue, RuntimeHost, RuntimeInfo, ops,
};
use clrload::image::NativeArrayView;
use clrload::{HResult, RuntimeVersion};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// `HOST_E_INVALIDOPERATION`, returned for a second start.
pub const HOST_E_INVALIDOPERATION: HResult = HResult::from_bits(0x8013_1022);

#[derive(Debug)]
pub struct State {
    journal: RefCell<Vec<String>>,
    faults: RefCell<HashMap<&'static str, HResult>>,
    installed: Vec<String>,
    loadable: Cell<bool>,
    supports_domain: Cell<bool>,
    started: Cell<bool>,
    last_view: Cell<Option<(usize, usize)>>,
}

impl State {
    fn record(&self, event: impl Into<String>) {
        self.journal.borrow_mut().push(event.into());
    }

    fn call(&self, operation: &'static str) -> NativeResult<()> {
        self.record(operation);
        match self.faults.borrow().get(operation) {
            Some(status) => Err(NativeError::new(operation, *status)),
            None => Ok(()),
        }
    }
}

/// Test double backend.
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Rc<State>,
}

impl MockBackend {
    /// A host with the 4.x runtime installed.
    pub fn new() -> Self {
        Self::with_installed(&["v2.0.50727", "v4.0.30319"])
    }

    pub fn with_installed(versions: &[&str]) -> Self {
        Self {
            state: Rc::new(State {
                journal: RefCell::new(Vec::new()),
                faults: RefCell::new(HashMap::new()),
                installed: versions.iter().map(|v| v.to_string()).collect(),
                loadable: Cell::new(true),
                supports_domain: Cell::new(true),
                started: Cell::new(false),
                last_view: Cell::new(None),
            }),
        }
    }

    /// Makes `operation` fail with `status`.
    pub fn fail(self, operation: &'static str, status: HResult) -> Self {
        self.state.faults.borrow_mut().insert(operation, status);
        self
    }

    /// Makes the runtime report itself as not loadable.
    pub fn unloadable(self) -> Self {
        self.state.loadable.set(false);
        self
    }

    /// Makes the default domain refuse the `_AppDomain` upgrade.
    pub fn without_domain_interface(self) -> Self {
        self.state.supports_domain.set(false);
        self
    }

    /// Every recorded call and release, in order.
    pub fn journal(&self) -> Vec<String> {
        self.state.journal.borrow().clone()
    }

    /// Release events only.
    pub fn releases(&self) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter(|e| e.starts_with("release:"))
            .collect()
    }

    /// Position of `event` in the journal.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.journal().iter().position(|e| e == event)
    }

    /// Data pointer and length of the last array handed to `load_raw`.
    pub fn last_view(&self) -> Option<(usize, usize)> {
        self.state.last_view.get()
    }
}

impl ClrBackend for MockBackend {
    type Runtime = MockRuntime;
    type Host = MockHost;
    type Unknown = MockUnknown;
    type Domain = MockDomain;
    type Assembly = MockAssembly;
    type EntryPoint = MockEntryPoint;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn unavailable_reason(&self) -> Option<&str> {
        None
    }

    fn installed_runtimes(&self) -> NativeResult<Vec<String>> {
        self.state.call(ops::ENUMERATE_RUNTIMES)?;
        Ok(self.state.installed.clone())
    }

    fn get_runtime(&self, version: &RuntimeVersion) -> NativeResult<MockRuntime> {
        self.state.call(ops::GET_RUNTIME)?;
        if !self.state.installed.iter().any(|v| v == version.as_str()) {
            return Err(NativeError::new(ops::GET_RUNTIME, HResult::CLR_E_SHIM_RUNTIME));
        }
        Ok(MockRuntime {
            state: Rc::clone(&self.state),
            version: version.to_string(),
        })
    }
}

// =============================================================================
// Handles
// =============================================================================

pub struct MockRuntime {
    state: Rc<State>,
    version: String,
}

impl RuntimeInfo for MockRuntime {
    type Host = MockHost;

    fn version_string(&self) -> NativeResult<String> {
        Ok(self.version.clone())
    }

    fn is_loadable(&self) -> NativeResult<bool> {
        self.state.call(ops::IS_LOADABLE)?;
        Ok(self.state.loadable.get())
    }

    fn bind_as_legacy_v2(&self) -> NativeResult<()> {
        self.state.call(ops::BIND_AS_LEGACY_V2)
    }

    fn runtime_host(&self) -> NativeResult<MockHost> {
        self.state.call(ops::GET_INTERFACE)?;
        Ok(MockHost {
            state: Rc::clone(&self.state),
        })
    }
}

impl Release for MockRuntime {
    fn release(self) -> NativeResult<()> {
        self.state.call("release:runtime")
    }
}

pub struct MockHost {
    state: Rc<State>,
}

impl RuntimeHost for MockHost {
    type Unknown = MockUnknown;

    fn start(&self) -> NativeResult<()> {
        self.state.call(ops::START)?;
        if self.state.started.replace(true) {
            return Err(NativeError::new(ops::START, HOST_E_INVALIDOPERATION));
        }
        Ok(())
    }

    fn default_domain(&self) -> NativeResult<MockUnknown> {
        self.state.call(ops::GET_DEFAULT_DOMAIN)?;
        Ok(MockUnknown {
            state: Rc::clone(&self.state),
        })
    }
}

impl Release for MockHost {
    fn release(self) -> NativeResult<()> {
        self.state.call("release:host")
    }
}

pub struct MockUnknown {
    state: Rc<State>,
}

pub struct MockDomain {
    state: Rc<State>,
}

impl Capability<MockUnknown> for MockDomain {
    const INTERFACE: &'static str = "_AppDomain";

    fn query(from: &MockUnknown) -> NativeResult<Self> {
        from.state.call(ops::QUERY_INTERFACE)?;
        if !from.state.supports_domain.get() {
            return Err(NativeError::new(ops::QUERY_INTERFACE, HResult::E_NOINTERFACE));
        }
        Ok(MockDomain {
            state: Rc::clone(&from.state),
        })
    }
}

impl AppDomain for MockDomain {
    type Assembly = MockAssembly;

    fn load_raw(&self, image: &mut NativeArrayView<'_>) -> NativeResult<MockAssembly> {
        self.state.call(ops::LOAD_3)?;
        let descriptor = image.descriptor();
        let (data, len) = (descriptor.data as *const u8, image.len());
        self.state.last_view.set(Some((data as usize, len)));

        // SAFETY: the view borrows a live slice of `len` bytes for this call.
        let bytes = unsafe { std::slice::from_raw_parts(data, len) };
        let kind = match bytes {
            [b'M', b'Z', b'E', code @ ..] if code.len() >= 4 => {
                let code = i32::from_le_bytes([code[0], code[1], code[2], code[3]]);
                ImageKind::Exe(ReturnValue::Int(code))
            }
            [b'M', b'Z', b'V', ..] => ImageKind::Exe(ReturnValue::Empty),
            [b'M', b'Z', b'S', ..] => ImageKind::Exe(ReturnValue::Unsupported(8)),
            [b'M', b'Z', b'L', ..] => ImageKind::Library,
            _ => {
                return Err(NativeError::new(
                    ops::LOAD_3,
                    HResult::COR_E_BADIMAGEFORMAT,
                ));
            }
        };
        Ok(MockAssembly {
            state: Rc::clone(&self.state),
            kind,
        })
    }
}

impl Release for MockDomain {
    fn release(self) -> NativeResult<()> {
        self.state.call("release:domain")
    }
}

#[derive(Debug, Clone, Copy)]
enum ImageKind {
    Exe(ReturnValue),
    Library,
}

pub struct MockAssembly {
    state: Rc<State>,
    kind: ImageKind,
}

impl Assembly for MockAssembly {
    type EntryPoint = MockEntryPoint;

    fn entry_point(&self) -> NativeResult<Option<MockEntryPoint>> {
        self.state.call(ops::GET_ENTRY_POINT)?;
        Ok(match self.kind {
            ImageKind::Exe(value) => Some(MockEntryPoint {
                state: Rc::clone(&self.state),
                value,
            }),
            ImageKind::Library => None,
        })
    }
}

pub struct MockEntryPoint {
    state: Rc<State>,
    value: ReturnValue,
}

impl EntryPoint for MockEntryPoint {
    fn name(&self) -> NativeResult<String> {
        Ok("Main".to_string())
    }

    fn invoke(&self, target: InvocationArgument) -> NativeResult<ReturnValue> {
        self.state.call(ops::INVOKE_3)?;
        assert_eq!(target, InvocationArgument::Null);
        Ok(self.value)
    }
}

// =============================================================================
// Image Builders
// =============================================================================

/// Executable image returning `code`.
pub fn exe_image(code: i32) -> Vec<u8> {
    let mut bytes = b"MZE".to_vec();
    bytes.extend_from_slice(&code.to_le_bytes());
    bytes
}

/// Executable image with a void entry point.
pub fn void_image() -> Vec<u8> {
    b"MZV".to_vec()
}

/// Executable image whose entry point returns a non-integer.
pub fn string_image() -> Vec<u8> {
    b"MZS".to_vec()
}

/// Library image without an entry point.
pub fn library_image() -> Vec<u8> {
    b"MZL".to_vec()
}
