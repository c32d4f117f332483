//! Tests for in-memory images.
//!
//! Validates the byte image wrapper, the zero-copy array descriptor and
//! the file reader's bounds.

use clrload::constants::{FADF_AUTO, FADF_FIXEDSIZE, VT_UI1};
use clrload::image::{ByteImage, NativeArrayView, read_image};
use clrload::Error;
use std::io::Write;

// =============================================================================
// ByteImage
// =============================================================================

#[test]
fn test_byte_image_basics() {
    let bytes = b"MZ\x90\x00".to_vec();
    let image = ByteImage::new(&bytes);

    assert_eq!(image.len(), 4);
    assert!(!image.is_empty());
    assert!(image.has_dos_header());
    assert_eq!(image.as_bytes().as_ptr(), bytes.as_ptr());
}

#[test]
fn test_byte_image_without_dos_header() {
    let image = ByteImage::new(&[0u8; 16]);
    assert!(!image.has_dos_header());
}

#[test]
fn test_digest_of_empty_image() {
    let image = ByteImage::new(&[]);
    assert_eq!(
        image.digest(),
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn test_digest_changes_with_content() {
    assert_ne!(
        ByteImage::new(b"MZ1").digest(),
        ByteImage::new(b"MZ2").digest()
    );
}

// =============================================================================
// NativeArrayView
// =============================================================================

#[test]
fn test_view_descriptor_layout() {
    let bytes = vec![0xAAu8; 300];
    let view = NativeArrayView::new(ByteImage::new(&bytes)).unwrap();
    let descriptor = view.descriptor();

    assert_eq!(descriptor.dims, 1);
    assert_eq!(descriptor.element_size, 1);
    assert_eq!(descriptor.locks, 0);
    assert_eq!(descriptor.bounds[0].elements, 300);
    assert_eq!(descriptor.bounds[0].lower_bound, 0);
    assert_ne!(descriptor.features & FADF_AUTO, 0, "callee must not free");
    assert_ne!(descriptor.features & FADF_FIXEDSIZE, 0, "callee must not resize");
    assert_eq!(view.element_vartype(), VT_UI1);
}

#[test]
fn test_view_does_not_copy() {
    let bytes = vec![1u8, 2, 3];
    let mut view = NativeArrayView::new(ByteImage::new(&bytes)).unwrap();

    assert_eq!(view.descriptor().data as *const u8, bytes.as_ptr());
    assert_eq!(view.len(), bytes.len());
    assert!(!view.as_mut_ptr().is_null());
}

#[test]
fn test_empty_view() {
    let view = NativeArrayView::new(ByteImage::new(&[])).unwrap();
    assert!(view.is_empty());
}

// =============================================================================
// Image Reader
// =============================================================================

#[test]
fn test_read_image() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"MZ\x90\x00\x03").unwrap();

    let bytes = read_image(file.path(), 1024).unwrap();
    assert_eq!(bytes, b"MZ\x90\x00\x03");
}

#[test]
fn test_read_image_without_dos_header_is_not_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0u8; 64]).unwrap();

    assert_eq!(read_image(file.path(), 1024).unwrap().len(), 64);
}

#[test]
fn test_read_empty_image() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let err = read_image(file.path(), 1024).unwrap_err();
    assert!(matches!(err, Error::ImageEmpty { .. }));
}

#[test]
fn test_read_image_over_limit() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0u8; 100]).unwrap();

    match read_image(file.path(), 99).unwrap_err() {
        Error::ImageTooLarge { size, limit } => {
            assert_eq!(size, 100);
            assert_eq!(limit, 99);
        }
        other => panic!("expected ImageTooLarge, got {other:?}"),
    }
}

#[test]
fn test_read_image_at_limit() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0u8; 100]).unwrap();
    assert!(read_image(file.path(), 100).is_ok());
}

#[test]
fn test_read_image_with_unbounded_limit() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"MZE\x2a\x00\x00\x00").unwrap();

    let bytes = read_image(file.path(), usize::MAX).unwrap();
    assert_eq!(bytes.len(), 7);
}

#[test]
fn test_read_missing_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.exe");

    match read_image(&path, 1024).unwrap_err() {
        Error::ImageRead { path: p, source } => {
            assert_eq!(p, path);
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected ImageRead, got {other:?}"),
    }
}
