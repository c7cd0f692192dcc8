use anyhow::{bail, Result};
use std::borrow::Cow;

/// How bytes that are not valid UTF-8 are turned into text.
///
/// Dumps occasionally carry stray bytes from upstream encodings. The default
/// drops them so a single bad byte never costs a whole record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DecodePolicy {
    /// Remove invalid byte sequences
    #[default]
    DropInvalid,
    /// Substitute U+FFFD for each invalid byte sequence
    ReplaceInvalid,
    /// Fail the run on the first invalid byte sequence
    Strict,
}

impl DecodePolicy {
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>> {
        let err = match std::str::from_utf8(bytes) {
            Ok(s) => return Ok(Cow::Borrowed(s)),
            Err(err) => err,
        };

        match self {
            DecodePolicy::DropInvalid => {
                let mut out = String::with_capacity(bytes.len());
                for chunk in bytes.utf8_chunks() {
                    out.push_str(chunk.valid());
                }
                Ok(Cow::Owned(out))
            }
            DecodePolicy::ReplaceInvalid => Ok(String::from_utf8_lossy(bytes)),
            DecodePolicy::Strict => {
                bail!(
                    "Invalid UTF-8 at byte {} of {:?}",
                    err.valid_up_to(),
                    String::from_utf8_lossy(bytes)
                );
            }
        }
    }
}
