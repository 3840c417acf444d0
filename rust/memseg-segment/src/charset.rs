//! Encodings for null-terminated strings stored in segments.

/// A string encoding. The terminator is one code unit of zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Charset {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
}

impl Charset {
    /// Size of a code unit, which is also the size of the terminator.
    pub const fn unit_size(self) -> usize {
        match self {
            Charset::Utf8 => 1,
            Charset::Utf16Le | Charset::Utf16Be => 2,
            Charset::Utf32Le | Charset::Utf32Be => 4,
        }
    }

    /// Encodes `s` followed by the terminator.
    pub fn encode(self, s: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity((s.len() + 1) * self.unit_size());
        match self {
            Charset::Utf8 => out.extend_from_slice(s.as_bytes()),
            Charset::Utf16Le => s.encode_utf16().for_each(|u| out.extend(u.to_le_bytes())),
            Charset::Utf16Be => s.encode_utf16().for_each(|u| out.extend(u.to_be_bytes())),
            Charset::Utf32Le => s.chars().for_each(|c| out.extend((c as u32).to_le_bytes())),
            Charset::Utf32Be => s.chars().for_each(|c| out.extend((c as u32).to_be_bytes())),
        }
        out.resize(out.len() + self.unit_size(), 0);
        out
    }

    /// Decodes `bytes` (without terminator). Malformed sequences become
    /// U+FFFD.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Utf16Le | Charset::Utf16Be => {
                let units = bytes.chunks_exact(2).map(|c| {
                    let pair = [c[0], c[1]];
                    if self == Charset::Utf16Le {
                        u16::from_le_bytes(pair)
                    } else {
                        u16::from_be_bytes(pair)
                    }
                });
                char::decode_utf16(units)
                    .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect()
            }
            Charset::Utf32Le | Charset::Utf32Be => bytes
                .chunks_exact(4)
                .map(|c| {
                    let quad = [c[0], c[1], c[2], c[3]];
                    let code = if self == Charset::Utf32Le {
                        u32::from_le_bytes(quad)
                    } else {
                        u32::from_be_bytes(quad)
                    };
                    char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
                })
                .collect(),
        }
    }

    /// Byte length of the string at the start of `bytes`, found by scanning
    /// for the terminator at code unit boundaries.
    pub(crate) fn terminated_len(self, bytes: &[u8]) -> Option<usize> {
        let unit = self.unit_size();
        bytes
            .chunks_exact(unit)
            .position(|c| c.iter().all(|&b| b == 0))
            .map(|units| units * unit)
    }
}
