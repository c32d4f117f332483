//! Executable images held in memory.
//!
//! The image never touches disk on its way into the runtime: the reader
//! produces a `Vec<u8>`, [`ByteImage`] borrows it, and [`NativeArrayView`]
//! describes the same bytes as a one-dimensional `SAFEARRAY` of `VT_UI1`
//! without copying them.
//!
//! ## Lifetime Contract
//!
//! The bytes must stay alive and unmoved until the domain's load call
//! returns. Both wrappers borrow the buffer, so the compiler rejects any
//! attempt to free or mutate it while a view exists:
//!
//! ```rust,ignore
//! let bytes = clrload::image::read_image(path, limit)?;
//! let image = ByteImage::new(&bytes);
//! let mut view = NativeArrayView::new(image)?;
//! domain.load_raw(&mut view)?;   // `bytes` is kept alive by the borrow
//! ```

use crate::constants::{FADF_AUTO, FADF_FIXEDSIZE, VT_UI1};
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::ffi::c_void;
use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;
use tracing::{debug, warn};

/// DOS header magic that starts every PE image.
const DOS_MAGIC: &[u8; 2] = b"MZ";

// =============================================================================
// ByteImage
// =============================================================================

/// A borrowed, immutable executable image.
#[derive(Debug, Clone, Copy)]
pub struct ByteImage<'a> {
    bytes: &'a [u8],
}

impl<'a> ByteImage<'a> {
    /// Wraps a byte buffer. No format validation is performed.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Image size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the image has no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns true if the image starts with a DOS header.
    ///
    /// Informational only; the runtime performs the real validation.
    pub fn has_dos_header(&self) -> bool {
        self.bytes.starts_with(DOS_MAGIC)
    }

    /// Content digest in `sha256:<hex>` form.
    pub fn digest(&self) -> String {
        format!("sha256:{}", hex::encode(Sha256::digest(self.bytes)))
    }
}

// =============================================================================
// NativeArrayView
// =============================================================================

/// One `SAFEARRAYBOUND` entry.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SafeArrayBound {
    pub elements: u32,
    pub lower_bound: i32,
}

/// `SAFEARRAY` descriptor layout.
#[repr(C)]
#[derive(Debug)]
pub struct SafeArray {
    pub dims: u16,
    pub features: u16,
    pub element_size: u32,
    pub locks: u32,
    pub data: *mut c_void,
    pub bounds: [SafeArrayBound; 1],
}

/// `FADF_HAVEVARTYPE`: the element `VARTYPE` is stored in the four bytes
/// immediately preceding the descriptor.
const FADF_HAVEVARTYPE: u16 = 0x0080;

/// A zero-copy `SAFEARRAY` view over a [`ByteImage`].
///
/// The descriptor is caller-allocated (`FADF_AUTO`), so the callee never
/// frees the data, and fixed-size, so it never reallocates it. The
/// element type is recorded ahead of the descriptor the same way the
/// system allocator lays it out.
#[repr(C)]
#[derive(Debug)]
pub struct NativeArrayView<'a> {
    _reserved: u32,
    vartype: u32,
    array: SafeArray,
    _image: PhantomData<&'a [u8]>,
}

impl<'a> NativeArrayView<'a> {
    /// Builds a view over `image`.
    ///
    /// Fails with [`Error::ImageTooLarge`] if the image does not fit a
    /// 32-bit element count.
    pub fn new(image: ByteImage<'a>) -> Result<Self> {
        let elements = u32::try_from(image.len()).map_err(|_| Error::ImageTooLarge {
            size: image.len() as u64,
            limit: u64::from(u32::MAX),
        })?;

        Ok(Self {
            _reserved: 0,
            vartype: u32::from(VT_UI1),
            array: SafeArray {
                dims: 1,
                features: FADF_AUTO | FADF_FIXEDSIZE | FADF_HAVEVARTYPE,
                element_size: 1,
                locks: 0,
                // The callee only reads through this pointer.
                data: image.as_bytes().as_ptr() as *mut c_void,
                bounds: [SafeArrayBound {
                    elements,
                    lower_bound: 0,
                }],
            },
            _image: PhantomData,
        })
    }

    /// The descriptor handed to native code.
    pub fn descriptor(&self) -> &SafeArray {
        &self.array
    }

    /// Element `VARTYPE` stored ahead of the descriptor.
    pub fn element_vartype(&self) -> u16 {
        self.vartype as u16
    }

    /// Number of elements described.
    pub fn len(&self) -> usize {
        self.array.bounds[0].elements as usize
    }

    /// Returns true if the view describes no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw descriptor pointer for the duration of one native call.
    ///
    /// Requires `&mut self` because the callee may lock the array, which
    /// writes the lock count.
    pub fn as_mut_ptr(&mut self) -> *mut SafeArray {
        &mut self.array
    }
}

// =============================================================================
// Image Reader
// =============================================================================

/// Reads an executable image from local storage into memory.
///
/// Rejects empty files and files larger than `limit`. The bytes are not
/// validated beyond a diagnostic check for the DOS header.
pub fn read_image(path: &Path, limit: usize) -> Result<Vec<u8>> {
    let read_err = |source| Error::ImageRead {
        path: path.to_path_buf(),
        source,
    };

    let file = std::fs::File::open(path).map_err(read_err)?;
    let size = file.metadata().map_err(read_err)?.len();
    if size > limit as u64 {
        return Err(Error::ImageTooLarge {
            size,
            limit: limit as u64,
        });
    }

    // Bound the read as well, in case the file grows after the size check.
    let mut bytes = Vec::with_capacity(size as usize);
    file.take((limit as u64).saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(read_err)?;

    if bytes.is_empty() {
        return Err(Error::ImageEmpty {
            path: path.to_path_buf(),
        });
    }
    if bytes.len() > limit {
        return Err(Error::ImageTooLarge {
            size: bytes.len() as u64,
            limit: limit as u64,
        });
    }

    if !ByteImage::new(&bytes).has_dos_header() {
        warn!(path = %path.display(), "image does not start with a DOS header");
    }
    debug!(path = %path.display(), size = bytes.len(), "read image");
    Ok(bytes)
}
