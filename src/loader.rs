//! # In-Memory Loader Pipeline
//!
//! Drives a [`ClrBackend`] through the fixed hosting sequence:
//!
//! | Step | Function                                  | Produces        | Error class            |
//! |------|-------------------------------------------|-----------------|------------------------|
//! | 1    | [`RuntimeLocator::locate`]                | runtime handle  | `RuntimeNotFound`      |
//! | 2    | [`RuntimeBootstrapper::check_loadable`]   | -               | `RuntimeUnloadable`    |
//! | 3    | [`RuntimeBootstrapper::bind_compatibility_mode`] | -        | `BootstrapFailed`      |
//! | 4    | [`RuntimeBootstrapper::start`]            | host handle     | `BootstrapFailed`      |
//! | 5    | [`default_domain`]                        | domain handle   | `DomainUnavailable`    |
//! | 6    | [`load_from_memory`]                      | assembly        | `AssemblyLoadFailed`   |
//! | 7    | [`resolve_entry_point`]                   | entry point     | `NoEntryPoint`         |
//! | 8    | [`invoke`]                                | return code     | `InvocationFailed`     |
//!
//! The first failure aborts the run. Whatever was acquired up to that
//! point is released by the [`Session`], exactly once, in reverse order.
//!
//! ## Ordering
//!
//! Steps 2-4 are a typestate chain: `start` only exists on a
//! bootstrapper that has passed `check_loadable` and
//! `bind_compatibility_mode`, so starting an unbound runtime does not
//! compile.
//!
//! ## Single Use
//!
//! Starting the runtime is process-wide. A second run in the same process
//! is not guaranteed to work; the platform typically rejects the second
//! start or hands back the already-running instance.

use crate::config::{LoaderConfig, RuntimeVersion};
use crate::error::{Error, Result};
use crate::hresult::HResult;
use crate::host::{
    AppDomain, Assembly, Capability, ClrBackend, EntryPoint, InvocationArgument, NativeError,
    ReturnCode, ReturnValue, RuntimeHost, RuntimeInfo, ops,
};
use crate::image::{ByteImage, NativeArrayView, read_image};
use crate::lifecycle::Session;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::{debug, info, warn};

// =============================================================================
// RuntimeLocator
// =============================================================================

/// Finds installed runtimes through a backend.
pub struct RuntimeLocator<'b, B> {
    backend: &'b B,
}

impl<'b, B: ClrBackend> RuntimeLocator<'b, B> {
    pub fn new(backend: &'b B) -> Self {
        Self { backend }
    }

    /// Locates the runtime matching `version` exactly.
    pub fn locate(&self, version: &RuntimeVersion) -> Result<B::Runtime> {
        if !self.backend.is_available() {
            warn!(
                backend = self.backend.name(),
                reason = self.backend.unavailable_reason().unwrap_or("unknown"),
                "hosting backend unavailable"
            );
        }

        let runtime = self
            .backend
            .get_runtime(version)
            .map_err(|e| Error::RuntimeNotFound {
                version: version.to_string(),
                operation: e.operation,
                status: e.status,
            })?;

        match runtime.version_string() {
            Ok(reported) => debug!(requested = %version, reported = %reported, "located runtime"),
            Err(e) => debug!(requested = %version, error = %e, "located runtime"),
        }
        Ok(runtime)
    }

    /// Version strings of every installed runtime.
    pub fn installed(&self) -> Result<Vec<String>> {
        self.backend
            .installed_runtimes()
            .map_err(|e| Error::RuntimeNotFound {
                version: "*".to_string(),
                operation: e.operation,
                status: e.status,
            })
    }
}

// =============================================================================
// RuntimeBootstrapper
// =============================================================================

/// Bootstrapper state: runtime located, loadability not yet checked.
pub struct Located;
/// Bootstrapper state: runtime is loadable, not yet bound.
pub struct Loadable;
/// Bootstrapper state: legacy binding applied, ready to start.
pub struct Bound;

/// Takes a located runtime through check, bind and start, in that order.
pub struct RuntimeBootstrapper<'r, R, S> {
    runtime: &'r R,
    version: &'r RuntimeVersion,
    _state: PhantomData<S>,
}

impl<'r, R: RuntimeInfo, S> RuntimeBootstrapper<'r, R, S> {
    fn advance<T>(self) -> RuntimeBootstrapper<'r, R, T> {
        RuntimeBootstrapper {
            runtime: self.runtime,
            version: self.version,
            _state: PhantomData,
        }
    }
}

impl<'r, R: RuntimeInfo> RuntimeBootstrapper<'r, R, Located> {
    pub fn new(runtime: &'r R, version: &'r RuntimeVersion) -> Self {
        Self {
            runtime,
            version,
            _state: PhantomData,
        }
    }

    /// Verifies the runtime can be loaded into this process.
    ///
    /// A negative answer is final; there is no retry.
    pub fn check_loadable(self) -> Result<RuntimeBootstrapper<'r, R, Loadable>> {
        let version = self.version;
        let unloadable = |status| Error::RuntimeUnloadable {
            version: version.to_string(),
            operation: ops::IS_LOADABLE,
            status,
        };
        match self.runtime.is_loadable() {
            Ok(true) => Ok(self.advance()),
            Ok(false) => Err(unloadable(HResult::S_FALSE)),
            Err(e) => Err(unloadable(e.status)),
        }
    }
}

impl<'r, R: RuntimeInfo> RuntimeBootstrapper<'r, R, Loadable> {
    /// Pins the legacy activation surface to this runtime.
    pub fn bind_compatibility_mode(self) -> Result<RuntimeBootstrapper<'r, R, Bound>> {
        self.runtime
            .bind_as_legacy_v2()
            .map_err(bootstrap_failed)?;
        debug!(version = %self.version, "bound as legacy runtime");
        Ok(self.advance())
    }
}

impl<'r, R: RuntimeInfo> RuntimeBootstrapper<'r, R, Bound>
where
    R::Host: RuntimeHost,
{
    /// Acquires the hosting interface into `slot` and starts the runtime.
    ///
    /// The host handle is stored before `Start` is called so that it is
    /// released with the rest of the session even if starting fails.
    pub fn start<'s>(self, slot: &'s mut Option<R::Host>) -> Result<&'s R::Host> {
        let host = slot.insert(self.runtime.runtime_host().map_err(bootstrap_failed)?);
        host.start().map_err(bootstrap_failed)?;
        info!(version = %self.version, "loaded runtime into this process");
        Ok(host)
    }
}

fn bootstrap_failed(e: NativeError) -> Error {
    Error::BootstrapFailed {
        operation: e.operation,
        status: e.status,
    }
}

// =============================================================================
// DomainResolver
// =============================================================================

/// Obtains the default domain and upgrades it to the typed interface `D`.
pub fn default_domain<H, D>(host: &H) -> Result<D>
where
    H: RuntimeHost,
    D: Capability<H::Unknown>,
{
    let domain_unavailable = |e: NativeError| Error::DomainUnavailable {
        operation: e.operation,
        status: e.status,
    };

    let unknown = host.default_domain().map_err(domain_unavailable)?;
    let domain = D::query(&unknown).map_err(domain_unavailable)?;
    info!(interface = D::INTERFACE, "acquired default domain");
    Ok(domain)
}

// =============================================================================
// ImageLoader
// =============================================================================

/// Materializes `image` as an assembly inside `domain`, without copying it.
///
/// The image is not validated here. A malformed image is rejected by the
/// runtime during this call or surfaces later as a missing entry point.
pub fn load_from_memory<D: AppDomain>(domain: &D, image: ByteImage<'_>) -> Result<D::Assembly> {
    let mut view = NativeArrayView::new(image)?;
    let assembly = domain
        .load_raw(&mut view)
        .map_err(|e| Error::AssemblyLoadFailed {
            operation: e.operation,
            status: e.status,
        })?;
    info!(size = image.len(), "loaded image into memory");
    Ok(assembly)
}

// =============================================================================
// EntryPointInvoker
// =============================================================================

/// Resolves the assembly's entry method.
///
/// A library image loads fine but has no entry point; that is reported
/// as [`Error::NoEntryPoint`] with an `S_OK` status.
pub fn resolve_entry_point<A: Assembly>(assembly: &A) -> Result<A::EntryPoint>
where
    A::EntryPoint: EntryPoint,
{
    let entry_point = match assembly.entry_point() {
        Ok(Some(entry_point)) => entry_point,
        Ok(None) => {
            return Err(Error::NoEntryPoint {
                operation: ops::GET_ENTRY_POINT,
                status: HResult::S_OK,
            });
        }
        Err(e) => {
            return Err(Error::NoEntryPoint {
                operation: e.operation,
                status: e.status,
            });
        }
    };

    match entry_point.name() {
        Ok(name) => info!(method = %name, "found entry point"),
        Err(e) => {
            debug!(error = %e, "entry point name unavailable");
            info!("found entry point");
        }
    }
    Ok(entry_point)
}

/// Invokes the entry point and decodes its return value.
///
/// Blocks until the invoked program returns. A non-zero return code is a
/// successful invocation; only a failing host status is an error.
pub fn invoke<E: EntryPoint>(entry_point: &E, target: InvocationArgument) -> Result<ReturnCode> {
    debug!(target_vartype = target.vartype(), "invoking entry point");
    let value = entry_point
        .invoke(target)
        .map_err(|e| Error::InvocationFailed {
            operation: e.operation,
            status: e.status,
        })?;

    if let ReturnValue::Unsupported(vartype) = value {
        warn!(vartype, "entry point returned a non-integer value, reporting 0");
    }
    let code = ReturnCode::from(value);
    info!(code = code.0, "entry point returned");
    Ok(code)
}

// =============================================================================
// Pipeline
// =============================================================================

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Backend that hosted the runtime.
    pub backend: &'static str,
    /// Runtime version bound to.
    pub runtime_version: RuntimeVersion,
    /// Image size in bytes.
    pub image_size: usize,
    /// Image digest (`sha256:<hex>`).
    pub image_digest: String,
    /// Value returned by the entry point.
    pub return_code: ReturnCode,
}

/// Runs the full sequence on `image`.
///
/// Handles are released exactly once, in reverse acquisition order,
/// whether the run succeeds or not.
pub fn execute<B: ClrBackend>(
    backend: &B,
    version: &RuntimeVersion,
    image: ByteImage<'_>,
) -> Result<ReturnCode> {
    let mut session = Session::<B>::new();
    let outcome = run_stages(backend, version, image, &mut session);
    session.release_all();
    outcome
}

fn run_stages<B: ClrBackend>(
    backend: &B,
    version: &RuntimeVersion,
    image: ByteImage<'_>,
    session: &mut Session<B>,
) -> Result<ReturnCode> {
    let runtime = session
        .runtime
        .insert(RuntimeLocator::new(backend).locate(version)?);

    let host = RuntimeBootstrapper::new(&*runtime, version)
        .check_loadable()?
        .bind_compatibility_mode()?
        .start(&mut session.host)?;

    let domain = session.domain.insert(default_domain(host)?);

    // Assembly and entry point borrow nothing from the session slots but
    // must be dropped before it is released; both are locals of this frame.
    let assembly = load_from_memory(&*domain, image)?;
    let entry_point = resolve_entry_point(&assembly)?;
    invoke(&entry_point, InvocationArgument::Null)
}

/// Loader bound to one backend.
pub struct Loader<B: ClrBackend> {
    backend: B,
}

impl<B: ClrBackend> Loader<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Version strings of every installed runtime.
    pub fn installed_runtimes(&self) -> Result<Vec<String>> {
        RuntimeLocator::new(&self.backend).installed()
    }

    /// Runs an image that is already in memory.
    pub fn execute(&self, version: &RuntimeVersion, image: ByteImage<'_>) -> Result<RunReport> {
        let image_digest = image.digest();
        info!(
            backend = self.backend.name(),
            version = %version,
            size = image.len(),
            digest = %image_digest,
            "running image from memory"
        );
        let return_code = execute(&self.backend, version, image)?;
        Ok(RunReport {
            backend: self.backend.name(),
            runtime_version: version.clone(),
            image_size: image.len(),
            image_digest,
            return_code,
        })
    }

    /// Reads the configured image and runs it.
    pub fn run(&self, config: &LoaderConfig) -> Result<RunReport> {
        let bytes = read_image(&config.image_path, config.max_image_size)?;
        info!(
            path = %config.image_path.display(),
            size = bytes.len(),
            "read image into memory"
        );
        self.execute(&config.runtime_version, ByteImage::new(&bytes))
    }
}
