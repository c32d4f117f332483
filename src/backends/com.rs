//! # COM Hosting Backend - In-Process CLR
//!
//! Implements [`ClrBackend`] on top of the CLR hosting interfaces.
//!
//! ## Interface Chain
//!
//! | Step | Interface          | Source                                   |
//! |------|--------------------|------------------------------------------|
//! | 1    | `ICLRMetaHost`     | `CLRCreateInstance(CLSID_CLRMetaHost)`   |
//! | 2    | `ICLRRuntimeInfo`  | `ICLRMetaHost::GetRuntime(version)`      |
//! | 3    | `ICorRuntimeHost`  | `ICLRRuntimeInfo::GetInterface`          |
//! | 4    | `IUnknown`         | `ICorRuntimeHost::GetDefaultDomain`      |
//! | 5    | `_AppDomain`       | `IUnknown::QueryInterface`               |
//! | 6    | `_Assembly`        | `_AppDomain::Load_3(SAFEARRAY)`          |
//! | 7    | `_MethodInfo`      | `_Assembly::get_EntryPoint`              |
//!
//! Steps 1-4 use the bindings from the `windows` crate. The mscorlib
//! interfaces (5-7) have no bindings, so they are called through
//! hand-declared vtables that reproduce the slot layout up to the last
//! method used.
//!
//! ## FFI Safety
//!
//! Every raw interface pointer is owned by a [`ComPtr`], which releases
//! its reference on drop. `windows` interface types do the same. All
//! unsafe blocks carry SAFETY comments stating the invariant relied on.

use crate::config::RuntimeVersion;
use crate::constants::{VT_EMPTY, VT_I4, VT_INT};
use crate::hresult::HResult;
use crate::host::{
    AppDomain, Assembly, Capability, ClrBackend, EntryPoint, InvocationArgument, NativeError,
    NativeResult, Release, ReturnValue, RuntimeHost, RuntimeInfo, ops,
};
use crate::image::{NativeArrayView, SafeArray};
use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr::NonNull;
use tracing::debug;
use windows::Win32::System::ClrHosting::{
    CLRCreateInstance, CLSID_CLRMetaHost, CLSID_CorRuntimeHost, ICLRMetaHost, ICLRRuntimeInfo,
    ICorRuntimeHost,
};
use windows::Win32::System::Variant::{VARIANT, VariantClear};
use windows::core::{BSTR, GUID, HRESULT, IUnknown, Interface, PCWSTR, PWSTR};

/// `IID__AppDomain` from mscorlib.
const IID_APP_DOMAIN: GUID = GUID::from_u128(0x05f696dc_2b29_3663_ad8b_c4389cf2a713);

/// Version strings are short (`v4.0.30319`); this leaves ample room.
const VERSION_BUFFER_LEN: usize = 64;

fn native(operation: &'static str) -> impl Fn(windows::core::Error) -> NativeError {
    move |e| NativeError::new(operation, e.code().into())
}

fn check(operation: &'static str, hr: HRESULT) -> NativeResult<()> {
    HResult::from(hr)
        .ok()
        .map_err(|status| NativeError::new(operation, status))
}

// =============================================================================
// Raw Interface Plumbing
// =============================================================================

#[repr(C)]
#[allow(dead_code)]
struct UnknownVtbl {
    query_interface:
        unsafe extern "system" fn(*mut c_void, *const GUID, *mut *mut c_void) -> HRESULT,
    add_ref: unsafe extern "system" fn(*mut c_void) -> u32,
    release: unsafe extern "system" fn(*mut c_void) -> u32,
}

/// `_AppDomain`: `Load_3` is slot 45.
#[repr(C)]
struct AppDomainVtbl {
    _base: UnknownVtbl,
    // IDispatch (4), object members (6), get_Evidence, event accessors (14),
    // DefineDynamicAssembly (9), CreateInstance* (6), Load, Load_2.
    _slots_3_to_44: [usize; 42],
    load_3: unsafe extern "system" fn(*mut c_void, *mut SafeArray, *mut *mut c_void) -> HRESULT,
}

/// `_Assembly`: `get_EntryPoint` is slot 16.
#[repr(C)]
struct AssemblyVtbl {
    _base: UnknownVtbl,
    // IDispatch (4), object members (4), CodeBase, EscapedCodeBase, GetName x2, FullName.
    _slots_3_to_15: [usize; 13],
    get_entry_point: unsafe extern "system" fn(*mut c_void, *mut *mut c_void) -> HRESULT,
}

/// `_MethodInfo`: `get_name` is slot 12, `Invoke_3` slot 37.
#[repr(C)]
struct MethodInfoVtbl {
    _base: UnknownVtbl,
    // IDispatch (4), object members (4), MemberType.
    _slots_3_to_11: [usize; 9],
    get_name: unsafe extern "system" fn(*mut c_void, *mut BSTR) -> HRESULT,
    // DeclaringType .. IsConstructor.
    _slots_13_to_36: [usize; 24],
    invoke_3:
        unsafe extern "system" fn(*mut c_void, Variant, *mut SafeArray, *mut Variant) -> HRESULT,
}

/// `VARIANT` layout: tag, three reserved words, then a two-pointer union.
#[repr(C)]
#[derive(Clone, Copy)]
struct Variant {
    vt: u16,
    reserved: [u16; 3],
    data: [usize; 2],
}

impl Variant {
    fn of_type(vt: u16) -> Self {
        Self {
            vt,
            reserved: [0; 3],
            data: [0; 2],
        }
    }

    fn decode(&self) -> ReturnValue {
        match self.vt {
            VT_EMPTY => ReturnValue::Empty,
            // The integer occupies the low four bytes of the union.
            VT_I4 | VT_INT => ReturnValue::Int(self.data[0] as i32),
            other => ReturnValue::Unsupported(other),
        }
    }
}

/// An owned reference to a COM object whose vtable starts with `V`.
struct ComPtr<V> {
    raw: NonNull<c_void>,
    _vtable: PhantomData<*const V>,
}

impl<V> ComPtr<V> {
    /// Takes ownership of `raw`.
    ///
    /// # Safety
    ///
    /// `raw` must be null or an owned interface reference whose vtable is
    /// laid out as `V`.
    unsafe fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self {
            raw,
            _vtable: PhantomData,
        })
    }

    fn as_raw(&self) -> *mut c_void {
        self.raw.as_ptr()
    }

    fn vtable(&self) -> &V {
        // SAFETY: a COM object pointer points at its vtable pointer, and
        // `from_raw` guarantees the vtable has layout `V`.
        unsafe { &**(self.raw.as_ptr() as *const *const V) }
    }
}

impl<V> Drop for ComPtr<V> {
    fn drop(&mut self) {
        // SAFETY: every COM vtable begins with the three IUnknown slots,
        // and this pointer holds exactly one reference.
        unsafe {
            let vtable = &**(self.raw.as_ptr() as *const *const UnknownVtbl);
            (vtable.release)(self.raw.as_ptr());
        }
    }
}

// =============================================================================
// ComBackend
// =============================================================================

/// CLR hosting through `mscoree`.
#[derive(Debug, Default)]
pub struct ComBackend;

impl ComBackend {
    pub fn new() -> Self {
        Self
    }

    fn meta_host(&self) -> NativeResult<ICLRMetaHost> {
        // SAFETY: CLSID_CLRMetaHost is a valid class id; the call has no
        // other preconditions.
        unsafe { CLRCreateInstance::<ICLRMetaHost>(&CLSID_CLRMetaHost) }
            .map_err(native(ops::CREATE_META_HOST))
    }
}

impl ClrBackend for ComBackend {
    type Runtime = ComRuntime;
    type Host = ComHost;
    type Unknown = IUnknown;
    type Domain = ComDomain;
    type Assembly = ComAssembly;
    type EntryPoint = ComEntryPoint;

    fn name(&self) -> &'static str {
        "com"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn unavailable_reason(&self) -> Option<&str> {
        None
    }

    fn installed_runtimes(&self) -> NativeResult<Vec<String>> {
        let meta_host = self.meta_host()?;
        // SAFETY: plain COM call on a live interface.
        let runtimes = unsafe { meta_host.EnumerateInstalledRuntimes() }
            .map_err(native(ops::ENUMERATE_RUNTIMES))?;

        let mut versions = Vec::new();
        loop {
            let mut items: [Option<IUnknown>; 1] = [None];
            let mut fetched = 0u32;
            // SAFETY: `items` and `fetched` are valid for one element.
            let hr = unsafe { runtimes.Next(&mut items, Some(&mut fetched as *mut u32)) };
            // S_FALSE signals the end of the enumeration.
            if hr.is_err() {
                return Err(NativeError::new(ops::ENUMERATE_RUNTIMES, hr.into()));
            }
            let Some(unknown) = items[0].take().filter(|_| fetched == 1) else {
                break;
            };
            let info: ICLRRuntimeInfo = unknown.cast().map_err(native(ops::QUERY_INTERFACE))?;
            versions.push(version_string(&info)?);
        }
        Ok(versions)
    }

    fn get_runtime(&self, version: &RuntimeVersion) -> NativeResult<ComRuntime> {
        let meta_host = self.meta_host()?;
        let wide = version.to_wide();
        // SAFETY: `wide` is NUL-terminated and outlives the call.
        let info: ICLRRuntimeInfo = unsafe { meta_host.GetRuntime(PCWSTR(wide.as_ptr())) }
            .map_err(native(ops::GET_RUNTIME))?;
        Ok(ComRuntime {
            info,
            _meta_host: meta_host,
        })
    }
}

fn version_string(info: &ICLRRuntimeInfo) -> NativeResult<String> {
    let mut buffer = [0u16; VERSION_BUFFER_LEN];
    let mut len = buffer.len() as u32;
    // SAFETY: `buffer` holds `len` UTF-16 units.
    unsafe { info.GetVersionString(PWSTR(buffer.as_mut_ptr()), &mut len) }
        .map_err(native(ops::GET_VERSION_STRING))?;
    let end = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    Ok(String::from_utf16_lossy(&buffer[..end]))
}

// =============================================================================
// Runtime / Host
// =============================================================================

/// A located runtime. Keeps the metadata host alive behind it.
pub struct ComRuntime {
    info: ICLRRuntimeInfo,
    _meta_host: ICLRMetaHost,
}

impl RuntimeInfo for ComRuntime {
    type Host = ComHost;

    fn version_string(&self) -> NativeResult<String> {
        version_string(&self.info)
    }

    fn is_loadable(&self) -> NativeResult<bool> {
        // SAFETY: plain COM call on a live interface.
        unsafe { self.info.IsLoadable() }
            .map(|loadable| loadable.as_bool())
            .map_err(native(ops::IS_LOADABLE))
    }

    fn bind_as_legacy_v2(&self) -> NativeResult<()> {
        // SAFETY: plain COM call on a live interface.
        unsafe { self.info.BindAsLegacyV2Runtime() }.map_err(native(ops::BIND_AS_LEGACY_V2))
    }

    fn runtime_host(&self) -> NativeResult<ComHost> {
        // SAFETY: CLSID_CorRuntimeHost is a valid class id for this interface.
        let host = unsafe { self.info.GetInterface::<ICorRuntimeHost>(&CLSID_CorRuntimeHost) }
            .map_err(native(ops::GET_INTERFACE))?;
        Ok(ComHost { host })
    }
}

impl Release for ComRuntime {
    fn release(self) -> NativeResult<()> {
        drop(self);
        Ok(())
    }
}

/// The `ICorRuntimeHost` interface of a runtime.
pub struct ComHost {
    host: ICorRuntimeHost,
}

impl RuntimeHost for ComHost {
    type Unknown = IUnknown;

    fn start(&self) -> NativeResult<()> {
        // SAFETY: plain COM call on a live interface.
        unsafe { self.host.Start() }.map_err(native(ops::START))
    }

    fn default_domain(&self) -> NativeResult<IUnknown> {
        // SAFETY: plain COM call on a live interface.
        unsafe { self.host.GetDefaultDomain() }.map_err(native(ops::GET_DEFAULT_DOMAIN))
    }
}

impl Release for ComHost {
    fn release(self) -> NativeResult<()> {
        drop(self);
        Ok(())
    }
}

// =============================================================================
// Domain / Assembly / Entry Point
// =============================================================================

/// The default domain as `_AppDomain`.
pub struct ComDomain {
    ptr: ComPtr<AppDomainVtbl>,
}

impl Capability<IUnknown> for ComDomain {
    const INTERFACE: &'static str = "_AppDomain";

    fn query(from: &IUnknown) -> NativeResult<Self> {
        let mut raw = std::ptr::null_mut();
        // SAFETY: `raw` is a valid out pointer; on success it receives an
        // owned `_AppDomain` reference.
        let hr = unsafe { from.query(&IID_APP_DOMAIN, &mut raw) };
        check(ops::QUERY_INTERFACE, hr)?;
        // SAFETY: QueryInterface returned the interface for IID__AppDomain.
        let ptr = unsafe { ComPtr::from_raw(raw) }
            .ok_or(NativeError::new(ops::QUERY_INTERFACE, HResult::E_POINTER))?;
        Ok(Self { ptr })
    }
}

impl AppDomain for ComDomain {
    type Assembly = ComAssembly;

    fn load_raw(&self, image: &mut NativeArrayView<'_>) -> NativeResult<ComAssembly> {
        let mut raw = std::ptr::null_mut();
        // SAFETY: the descriptor and the bytes it aliases are borrowed for
        // the whole call; the callee only reads them and may lock the array.
        let hr =
            unsafe { (self.ptr.vtable().load_3)(self.ptr.as_raw(), image.as_mut_ptr(), &mut raw) };
        check(ops::LOAD_3, hr)?;
        debug!(assembly = ?raw, "assembly materialized");
        // SAFETY: Load_3 returns an owned `_Assembly` reference.
        let ptr = unsafe { ComPtr::from_raw(raw) }
            .ok_or(NativeError::new(ops::LOAD_3, HResult::E_POINTER))?;
        Ok(ComAssembly { ptr })
    }
}

impl Release for ComDomain {
    fn release(self) -> NativeResult<()> {
        drop(self);
        Ok(())
    }
}

/// A loaded `_Assembly`.
pub struct ComAssembly {
    ptr: ComPtr<AssemblyVtbl>,
}

impl Assembly for ComAssembly {
    type EntryPoint = ComEntryPoint;

    fn entry_point(&self) -> NativeResult<Option<ComEntryPoint>> {
        let mut raw = std::ptr::null_mut();
        // SAFETY: `raw` is a valid out pointer.
        let hr = unsafe { (self.ptr.vtable().get_entry_point)(self.ptr.as_raw(), &mut raw) };
        check(ops::GET_ENTRY_POINT, hr)?;
        debug!(entry_point = ?raw, "entry point resolved");
        // SAFETY: get_EntryPoint returns an owned `_MethodInfo` or null.
        Ok(unsafe { ComPtr::from_raw(raw) }.map(|ptr| ComEntryPoint { ptr }))
    }
}

/// An entry method as `_MethodInfo`.
pub struct ComEntryPoint {
    ptr: ComPtr<MethodInfoVtbl>,
}

impl EntryPoint for ComEntryPoint {
    fn name(&self) -> NativeResult<String> {
        let mut name = BSTR::new();
        // SAFETY: `name` is a valid out BSTR; the callee allocates it and
        // `BSTR` frees it on drop.
        let hr = unsafe { (self.ptr.vtable().get_name)(self.ptr.as_raw(), &mut name) };
        check(ops::GET_NAME, hr)?;
        Ok(name.to_string())
    }

    fn invoke(&self, target: InvocationArgument) -> NativeResult<ReturnValue> {
        let mut result = Variant::of_type(VT_EMPTY);
        // SAFETY: a static entry point takes a null target and a null
        // parameter array; `result` is a valid out VARIANT.
        let hr = unsafe {
            (self.ptr.vtable().invoke_3)(
                self.ptr.as_raw(),
                Variant::of_type(target.vartype()),
                std::ptr::null_mut(),
                &mut result,
            )
        };
        check(ops::INVOKE_3, hr)?;
        let value = result.decode();
        // SAFETY: `Variant` has the `VARIANT` layout and `result` was
        // initialized by the callee. Clearing frees whatever it owns.
        if let Err(e) = unsafe { VariantClear(&mut result as *mut Variant as *mut VARIANT) } {
            debug!(error = %e, "failed to clear return value");
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vtable_slots() {
        let slot = std::mem::size_of::<usize>();
        assert_eq!(std::mem::offset_of!(AppDomainVtbl, load_3), 45 * slot);
        assert_eq!(std::mem::offset_of!(AssemblyVtbl, get_entry_point), 16 * slot);
        assert_eq!(std::mem::offset_of!(MethodInfoVtbl, get_name), 12 * slot);
        assert_eq!(std::mem::offset_of!(MethodInfoVtbl, invoke_3), 37 * slot);
    }

    #[test]
    fn test_variant_matches_system_layout() {
        assert_eq!(std::mem::size_of::<Variant>(), std::mem::size_of::<VARIANT>());
        assert_eq!(std::mem::align_of::<Variant>(), std::mem::align_of::<VARIANT>());
    }

    #[test]
    fn test_cleared_return_value_is_empty() {
        let mut result = Variant::of_type(VT_I4);
        result.data[0] = 42;
        assert_eq!(result.decode(), ReturnValue::Int(42));

        // SAFETY: `result` is a valid, initialized VARIANT that owns nothing.
        unsafe { VariantClear(&mut result as *mut Variant as *mut VARIANT) }.unwrap();
        assert_eq!(result.decode(), ReturnValue::Empty);
    }
}
