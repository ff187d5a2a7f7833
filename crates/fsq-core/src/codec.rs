//! Item name codec
//!
//! Encodes an ordered list of string fields into one filesystem-legal file
//! name and back. Every occurrence of the delimiter, the escape marker, or
//! the path separator inside a field is replaced by the escape marker
//! followed by the character's two-digit lowercase hex code:
//!
//! ```text
//! ["20260101120000", "0", "42", "web/1", "0", "a_b"]
//!   => _20260101120000_0_42_web\2f1_0_a\5fb
//! ```
//!
//! The delimiter always occupies position 0 of a constructed name, so a name
//! found on disk carries its own delimiter.

use crate::error::FsqError;

const PATH_SEPARATOR: char = '/';

/// Field codec parameterized by delimiter and escape marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    delimiter: char,
    escape: char,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            delimiter: '_',
            escape: '\\',
        }
    }
}

impl Codec {
    /// Build a codec from configured delimiter and escape strings.
    ///
    /// Both must be exactly one ASCII character, neither may be the path
    /// separator, and they must differ.
    pub fn new(delimiter: &str, escape: &str) -> Result<Self, FsqError> {
        let delimiter = single_char("delimiter", delimiter)?;
        let escape = single_char("escape", escape)?;
        if delimiter == escape {
            return Err(FsqError::Encode {
                message: format!("delimiter and escape are both {delimiter:?}"),
            });
        }
        Ok(Self { delimiter, escape })
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn escape(&self) -> char {
        self.escape
    }

    fn needs_escape(&self, c: char) -> bool {
        c == self.delimiter || c == self.escape || c == PATH_SEPARATOR
    }

    /// Encode a single field for the filesystem
    pub fn encode(&self, field: &str) -> Result<String, FsqError> {
        let mut out = String::with_capacity(field.len());
        for c in field.chars() {
            if self.needs_escape(c) {
                let hex = format!("{:02x}", c as u32);
                if hex.len() != 2 {
                    return Err(FsqError::Encode {
                        message: format!("invalid hex ({hex}) for encode-target {c:?}"),
                    });
                }
                out.push(self.escape);
                out.push_str(&hex);
            } else {
                out.push(c);
            }
        }
        Ok(out)
    }

    /// Decode a single field from the filesystem
    pub fn decode(&self, field: &str) -> Result<String, FsqError> {
        let mut out = String::with_capacity(field.len());
        let mut chars = field.chars();
        while let Some(c) = chars.next() {
            if c != self.escape {
                out.push(c);
                continue;
            }
            let hex: String = chars.by_ref().take(2).collect();
            if hex.chars().count() != 2 {
                return Err(FsqError::Encode {
                    message: format!("truncated encoding at end of {field:?}"),
                });
            }
            let invalid = || FsqError::Encode {
                message: format!("invalid decode target {}{hex}", self.escape),
            };
            // from_str_radix alone would accept a sign
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            let byte = u8::from_str_radix(&hex, 16).map_err(|_| invalid())?;
            out.push(char::from(byte));
        }
        Ok(out)
    }

    /// Join encoded fields into one name, prefixed by the delimiter
    pub fn construct<S: AsRef<str>>(&self, fields: &[S]) -> Result<String, FsqError> {
        if fields.is_empty() {
            return Err(FsqError::Encode {
                message: "cannot construct a name from zero fields".to_string(),
            });
        }
        let mut name = String::new();
        for field in fields {
            name.push(self.delimiter);
            name.push_str(&self.encode(field.as_ref())?);
        }
        Ok(name)
    }

    /// Split a constructed name back into its delimiter and decoded fields.
    ///
    /// The delimiter is read from position 0 of `name`; only the escape
    /// marker comes from this codec.
    pub fn deconstruct(&self, name: &str) -> Result<(char, Vec<String>), FsqError> {
        let mut chars = name.chars();
        let delimiter = chars.next().ok_or_else(|| FsqError::MalformedEntry {
            id: name.to_string(),
            message: "cannot derive delimiter from an empty name".to_string(),
        })?;
        if delimiter == self.escape {
            return Err(FsqError::MalformedEntry {
                id: name.to_string(),
                message: format!("name starts with the escape marker {delimiter:?}"),
            });
        }

        let mut fields = Vec::new();
        let mut current = String::new();
        while let Some(c) = chars.next() {
            if c == self.escape {
                current.push(c);
                current.extend(chars.by_ref().take(2));
            } else if c == delimiter {
                fields.push(self.decode(&current)?);
                current.clear();
            } else {
                current.push(c);
            }
        }
        fields.push(self.decode(&current)?);
        Ok((delimiter, fields))
    }
}

fn single_char(what: &str, value: &str) -> Result<char, FsqError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() && c != PATH_SEPARATOR && c != '\0' => Ok(c),
        (Some(c), None) => Err(FsqError::Encode {
            message: format!("{what} {c:?} must be a printable ASCII character other than '/'"),
        }),
        _ => Err(FsqError::Encode {
            message: format!("{what} must be exactly one character, got {value:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_escapes_reserved_characters() {
        let codec = Codec::default();
        assert_eq!(codec.encode("a_b").unwrap(), "a\\5fb");
        assert_eq!(codec.encode("a/b").unwrap(), "a\\2fb");
        assert_eq!(codec.encode("a\\b").unwrap(), "a\\5cb");
        assert_eq!(codec.encode("plain").unwrap(), "plain");
    }

    #[test]
    fn test_decode_rejects_truncated_and_invalid_sequences() {
        let codec = Codec::default();
        assert!(matches!(codec.decode("abc\\5"), Err(FsqError::Encode { .. })));
        assert!(matches!(codec.decode("abc\\"), Err(FsqError::Encode { .. })));
        assert!(matches!(codec.decode("\\zz"), Err(FsqError::Encode { .. })));
        assert!(matches!(codec.decode("a\\+fb"), Err(FsqError::Encode { .. })));
        assert!(matches!(codec.decode("a\\-1b"), Err(FsqError::Encode { .. })));
    }

    #[test]
    fn test_codec_rejects_bad_configuration() {
        assert!(Codec::new("__", "\\").is_err());
        assert!(Codec::new("_", "").is_err());
        assert!(Codec::new("_", "_").is_err());
        assert!(Codec::new("/", "^").is_err());
        assert!(Codec::new("é", "^").is_err());
        assert!(Codec::new("_", "^").is_ok());
    }

    #[test]
    fn test_construct_example_identifier() {
        let codec = Codec::default();
        let name = codec
            .construct(&["20260101120000", "0", "4242", "web1", "0", "alpha", "beta"])
            .unwrap();
        assert_eq!(name, "_20260101120000_0_4242_web1_0_alpha_beta");

        let (delim, fields) = codec.deconstruct(&name).unwrap();
        assert_eq!(delim, '_');
        assert_eq!(
            fields,
            vec!["20260101120000", "0", "4242", "web1", "0", "alpha", "beta"]
        );
    }

    #[test]
    fn test_deconstruct_recovers_foreign_delimiter() {
        let writer = Codec::new(":", "\\").unwrap();
        let name = writer.construct(&["a:b", "c"]).unwrap();
        assert_eq!(name, ":a\\3ab:c");

        // reader configured with a different delimiter still parses it
        let (delim, fields) = Codec::default().deconstruct(&name).unwrap();
        assert_eq!(delim, ':');
        assert_eq!(fields, vec!["a:b", "c"]);
    }

    #[test]
    fn test_deconstruct_edge_cases() {
        let codec = Codec::default();
        assert!(matches!(
            codec.deconstruct(""),
            Err(FsqError::MalformedEntry { .. })
        ));
        assert_eq!(codec.deconstruct("_").unwrap().1, vec![String::new()]);
        assert!(codec.construct::<&str>(&[]).is_err());
    }

    #[test]
    fn test_hex_digit_delimiter_does_not_split_escapes() {
        // '/' encodes as "\2f"; with 'f' as delimiter the escape must be
        // consumed whole before delimiter scanning resumes
        let codec = Codec::new("f", "\\").unwrap();
        let name = codec.construct(&["a/b", "c"]).unwrap();
        assert_eq!(codec.deconstruct(&name).unwrap().1, vec!["a/b", "c"]);
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(s in any::<String>()) {
            let codec = Codec::default();
            let encoded = codec.encode(&s).unwrap();
            prop_assert!(!encoded.contains('/'));
            prop_assert!(!encoded.contains('_'));
            prop_assert_eq!(codec.decode(&encoded).unwrap(), s);
        }

        #[test]
        fn prop_deconstruct_inverts_construct(
            fields in proptest::collection::vec("[_/\\\\^a-z0-9 é]{0,12}", 1..8),
            alt in any::<bool>(),
        ) {
            let codec = if alt { Codec::new(":", "^").unwrap() } else { Codec::default() };
            let name = codec.construct(&fields).unwrap();
            let (delim, decoded) = codec.deconstruct(&name).unwrap();
            prop_assert_eq!(delim, codec.delimiter());
            prop_assert_eq!(decoded, fields);
        }
    }
}
