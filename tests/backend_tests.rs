//! # Backend Tests
//!
//! Tests for the platform backends. The unsupported backend is exercised
//! everywhere; the COM backend only on Windows.

use clrload::host::{ClrBackend, InvocationArgument, ReturnCode, ReturnValue, ops};
use clrload::{ByteImage, Error, HResult, RuntimeVersion, UnsupportedBackend, default_backend};

// =============================================================================
// Invocation Values
// =============================================================================

#[test]
fn test_invocation_argument_is_null_variant() {
    assert_eq!(InvocationArgument::default(), InvocationArgument::Null);
    assert_eq!(InvocationArgument::Null.vartype(), clrload::VT_NULL);
}

#[test]
fn test_return_value_to_code() {
    assert_eq!(ReturnCode::from(ReturnValue::Int(42)), ReturnCode(42));
    assert_eq!(ReturnCode::from(ReturnValue::Empty), ReturnCode(0));
    assert_eq!(ReturnCode::from(ReturnValue::Unsupported(8)), ReturnCode(0));
}

#[test]
fn test_return_code_exit_status() {
    assert_eq!(ReturnCode(42).as_exit_status(), 42);
    assert_eq!(ReturnCode(256).as_exit_status(), 0);
    assert_eq!(ReturnCode(-1).as_exit_status(), 255);
}

// =============================================================================
// UnsupportedBackend
// =============================================================================

#[test]
fn test_unsupported_backend_is_unavailable() {
    let backend = UnsupportedBackend::new();
    assert_eq!(backend.name(), "unsupported");
    assert!(!backend.is_available());
    assert!(backend.unavailable_reason().unwrap().contains("Windows"));
}

#[test]
fn test_unsupported_backend_fails_at_locate() {
    let backend = UnsupportedBackend::new();
    let bytes = [0x4d, 0x5a];
    let err = clrload::execute(&backend, &RuntimeVersion::default(), ByteImage::new(&bytes))
        .unwrap_err();

    match err {
        Error::RuntimeNotFound {
            operation, status, ..
        } => {
            assert_eq!(operation, ops::CREATE_META_HOST);
            assert_eq!(status, HResult::E_PLATFORM_UNSUPPORTED);
        }
        other => panic!("expected RuntimeNotFound, got {other:?}"),
    }
}

#[test]
fn test_unsupported_backend_lists_nothing() {
    assert!(UnsupportedBackend::new().installed_runtimes().is_err());
}

#[cfg(not(windows))]
#[test]
fn test_default_backend_off_windows() {
    assert!(!default_backend().is_available());
}

// =============================================================================
// ComBackend (Windows only)
// =============================================================================

#[cfg(windows)]
mod com_tests {
    use super::*;
    use clrload::ComBackend;

    #[test]
    fn test_default_backend_is_com() {
        assert_eq!(default_backend().name(), "com");
    }

    #[test]
    fn test_absent_runtime_is_not_found() {
        let backend = ComBackend::new();
        let version = RuntimeVersion::parse("v9.9.99999").unwrap();
        assert!(backend.get_runtime(&version).is_err());
    }

    #[test]
    fn test_installed_runtimes_are_valid_tags() {
        let backend = ComBackend::new();
        for tag in backend.installed_runtimes().unwrap() {
            assert!(RuntimeVersion::parse(&tag).is_ok(), "{tag}");
        }
    }

    #[test]
    #[ignore = "starts the CLR inside the test process"]
    fn test_zero_image_fails_to_load() {
        let backend = ComBackend::new();
        let bytes = vec![0u8; 4096];
        let err = clrload::execute(&backend, &RuntimeVersion::default(), ByteImage::new(&bytes))
            .unwrap_err();
        assert!(
            matches!(
                err,
                Error::AssemblyLoadFailed { .. } | Error::NoEntryPoint { .. }
            ),
            "got {err:?}"
        );
    }
}
