use serde::{Deserialize, Serialize};

use crate::errors::SdError;

/// Text encodings supported for reading files as text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Ascii,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

/// What to do with byte sequences that are invalid in the chosen encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecodeErrors {
    /// Substitute U+FFFD for each invalid sequence.
    #[default]
    Replace,
    /// Fail with [`SdError::Decode`].
    Strict,
}

/// Decode `data` as text.
pub fn decode_text(
    data: &[u8],
    encoding: TextEncoding,
    errors: DecodeErrors,
) -> Result<String, SdError> {
    match encoding {
        TextEncoding::Utf8 => match errors {
            DecodeErrors::Replace => Ok(String::from_utf8_lossy(data).into_owned()),
            DecodeErrors::Strict => std::str::from_utf8(data)
                .map(str::to_owned)
                .map_err(|e| SdError::Decode(format!("invalid UTF-8: {e}"))),
        },
        TextEncoding::Ascii => {
            if let Some(pos) = data.iter().position(|b| !b.is_ascii()) {
                if errors == DecodeErrors::Strict {
                    return Err(SdError::Decode(format!(
                        "non-ASCII byte 0x{:02x} at offset {pos}",
                        data[pos]
                    )));
                }
            }
            Ok(data
                .iter()
                .map(|&b| {
                    if b.is_ascii() {
                        char::from(b)
                    } else {
                        char::REPLACEMENT_CHARACTER
                    }
                })
                .collect())
        }
        TextEncoding::Latin1 => Ok(data.iter().map(|&b| char::from(b)).collect()),
    }
}
