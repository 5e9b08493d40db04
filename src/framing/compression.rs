use strum_macros::{Display, EnumCount};

/// How the body of a bundle is encoded on the wire
#[derive(Eq, PartialEq, Copy, Clone, Debug, Display, EnumCount)]
pub enum Compression {
    /// The body is the concatenated segments, as is
    None,
    /// The body is a zlib stream that inflates to the concatenated segments
    Zlib,
    /// Not observed so far, can't be unpacked
    Other(u8),
}

impl From<u8> for Compression {
    fn from(value: u8) -> Self {
        match value {
            x if x == u8::from(Self::None) => Self::None,
            x if x == u8::from(Self::Zlib) => Self::Zlib,
            x => Self::Other(x),
        }
    }
}

impl From<Compression> for u8 {
    fn from(kind: Compression) -> Self {
        match kind {
            Compression::None => 0,
            Compression::Zlib => 1,
            Compression::Other(x) => x,
        }
    }
}

impl From<&Compression> for u8 {
    fn from(v: &Compression) -> Self {
        u8::from(*v)
    }
}

impl std::fmt::LowerHex for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let val: u8 = self.into();
        std::fmt::LowerHex::fmt(&val, f)
    }
}

impl std::fmt::UpperHex for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let val: u8 = self.into();
        std::fmt::UpperHex::fmt(&val, f)
    }
}
