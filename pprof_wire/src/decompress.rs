//! Optional compression envelope around a profile.
//!
//! Profiles usually arrive gzip-compressed, sometimes zstd-compressed, and
//! occasionally raw. The envelope is detected from its magic bytes.

use std::borrow::Cow;
use std::io::Read;

use flate2::read::MultiGzDecoder;

use crate::{DecodeError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Compression envelope detected on an input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    Gzip,
    Zstd,
    None,
}

impl Envelope {
    /// Detect the envelope from the leading magic bytes.
    pub fn detect(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < GZIP_MAGIC.len() {
            return Err(DecodeError::ShortHeader);
        }
        if bytes.starts_with(&GZIP_MAGIC) {
            Ok(Envelope::Gzip)
        } else if bytes.starts_with(&ZSTD_MAGIC) {
            Ok(Envelope::Zstd)
        } else {
            Ok(Envelope::None)
        }
    }
}

/// Strip the compression envelope, if any.
///
/// Uncompressed input is returned borrowed. Decompressed output is owned by
/// the returned value and released when it goes out of scope.
pub fn decompress(bytes: &[u8]) -> Result<Cow<'_, [u8]>> {
    match Envelope::detect(bytes)? {
        Envelope::Gzip => {
            let mut out = Vec::with_capacity(bytes.len().saturating_mul(4));
            MultiGzDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(DecodeError::Decompress)?;
            log::trace!("gunzipped profile: {} -> {} bytes", bytes.len(), out.len());
            Ok(Cow::Owned(out))
        }
        Envelope::Zstd => {
            let out = zstd::stream::decode_all(bytes).map_err(DecodeError::Decompress)?;
            log::trace!("unzstd'd profile: {} -> {} bytes", bytes.len(), out.len());
            Ok(Cow::Owned(out))
        }
        Envelope::None => Ok(Cow::Borrowed(bytes)),
    }
}
