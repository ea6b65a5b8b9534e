use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

/// Errors produced while translating values between the wire and the store
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The requested format name is not known for this direction
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// The value is not valid for the requested format
    #[error("invalid {format} value: {reason}")]
    InvalidEncoding { format: &'static str, reason: String },
}

/// Named value representation selected by the `format` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueFormat {
    #[default]
    String,
    Base64,
    /// Numeric array payload. Decoding passes the stored bytes through
    /// untouched, exactly like `String`; there is no numeric transcoding.
    FloatArr,
}

impl ValueFormat {
    /// Resolve a format name as sent by the caller.
    ///
    /// Missing or empty names fall back to `string`; matching ignores case.
    pub fn parse(name: Option<&str>) -> Result<Self, CodecError> {
        let name = match name {
            Some(n) if !n.is_empty() => n,
            _ => return Ok(ValueFormat::String),
        };

        match name.to_ascii_lowercase().as_str() {
            "string" => Ok(ValueFormat::String),
            "base64" => Ok(ValueFormat::Base64),
            "float_arr" => Ok(ValueFormat::FloatArr),
            _ => Err(CodecError::UnsupportedFormat(name.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueFormat::String => "string",
            ValueFormat::Base64 => "base64",
            ValueFormat::FloatArr => "float_arr",
        }
    }

    /// Turn a wire value into the raw bytes handed to the store (used by `set`).
    ///
    /// `float_arr` has no write path and is rejected here.
    pub fn encode(self, value: &str) -> Result<Vec<u8>, CodecError> {
        match self {
            ValueFormat::String => Ok(value.as_bytes().to_vec()),
            ValueFormat::Base64 => BASE64
                .decode(value)
                .map_err(|e| CodecError::InvalidEncoding {
                    format: "base64",
                    reason: e.to_string(),
                }),
            ValueFormat::FloatArr => Err(CodecError::UnsupportedFormat(self.as_str().to_string())),
        }
    }

    /// Turn raw store bytes into the string returned to callers (used by `get`).
    ///
    /// Bytes that are not valid UTF-8 are rendered lossily for `string` and
    /// `float_arr`; callers that need exact bytes should ask for `base64`.
    pub fn decode(self, raw: &[u8]) -> String {
        match self {
            ValueFormat::String | ValueFormat::FloatArr => String::from_utf8_lossy(raw).into_owned(),
            ValueFormat::Base64 => BASE64.encode(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults_to_string() {
        assert_eq!(ValueFormat::parse(None).unwrap(), ValueFormat::String);
        assert_eq!(ValueFormat::parse(Some("")).unwrap(), ValueFormat::String);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(ValueFormat::parse(Some("BASE64")).unwrap(), ValueFormat::Base64);
        assert_eq!(ValueFormat::parse(Some("Float_Arr")).unwrap(), ValueFormat::FloatArr);
    }

    #[test]
    fn test_parse_unknown_format_keeps_name() {
        let err = ValueFormat::parse(Some("hex")).unwrap_err();
        assert_eq!(err, CodecError::UnsupportedFormat("hex".to_string()));
        assert_eq!(err.to_string(), "unsupported format: hex");
    }

    #[test]
    fn test_string_is_identity() {
        let raw = ValueFormat::String.encode("hello world").unwrap();
        assert_eq!(raw, b"hello world");
        assert_eq!(ValueFormat::String.decode(&raw), "hello world");
    }

    #[test]
    fn test_base64_encode_decodes_wire_value() {
        let raw = ValueFormat::Base64.encode("AAEC/w==").unwrap();
        assert_eq!(raw, vec![0x00, 0x01, 0x02, 0xff]);
        assert_eq!(ValueFormat::Base64.decode(&raw), "AAEC/w==");
    }

    #[test]
    fn test_base64_rejects_malformed_input() {
        let err = ValueFormat::Base64.encode("not base64!").unwrap_err();
        assert!(matches!(err, CodecError::InvalidEncoding { format: "base64", .. }));
    }

    #[test]
    fn test_float_arr_passes_bytes_through() {
        assert_eq!(ValueFormat::FloatArr.decode(b"[1.5,2.0]"), "[1.5,2.0]");
    }

    #[test]
    fn test_float_arr_has_no_write_path() {
        let err = ValueFormat::FloatArr.encode("[1.0]").unwrap_err();
        assert_eq!(err, CodecError::UnsupportedFormat("float_arr".to_string()));
    }
}
