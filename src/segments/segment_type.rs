use strum_macros::{Display, EnumCount};

/// The type tag of a segment, which selects how its data is decoded
#[derive(Eq, PartialEq, Copy, Clone, Debug, Display, EnumCount)]
pub enum SegmentType {
    /// Carries a game IPC message
    Ipc,
    /// Sent by the client to check the link is alive
    ClientKeepAlive,
    /// Sent by the server, either on its own or to answer a client keepalive
    ServerKeepAlive,
    /// Other values are kept as raw bytes. Some are part of the session handshake.
    Other(u16),
}

impl From<u16> for SegmentType {
    fn from(value: u16) -> Self {
        match value {
            x if x == u16::from(Self::Ipc) => Self::Ipc,
            x if x == u16::from(Self::ClientKeepAlive) => Self::ClientKeepAlive,
            x if x == u16::from(Self::ServerKeepAlive) => Self::ServerKeepAlive,
            x => Self::Other(x),
        }
    }
}

impl From<SegmentType> for u16 {
    fn from(kind: SegmentType) -> Self {
        match kind {
            SegmentType::Ipc => 3,
            SegmentType::ClientKeepAlive => 7,
            SegmentType::ServerKeepAlive => 8,
            SegmentType::Other(x) => x,
        }
    }
}

impl From<&SegmentType> for u16 {
    fn from(kind: &SegmentType) -> Self {
        u16::from(*kind)
    }
}

impl PartialEq<u16> for SegmentType {
    fn eq(&self, other: &u16) -> bool {
        u16::from(self) == *other
    }
}

impl PartialEq<SegmentType> for u16 {
    fn eq(&self, other: &SegmentType) -> bool {
        u16::from(other) == *self
    }
}

impl std::fmt::LowerHex for SegmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let val: u16 = self.into();
        std::fmt::LowerHex::fmt(&val, f)
    }
}

impl std::fmt::UpperHex for SegmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let val: u16 = self.into();
        std::fmt::UpperHex::fmt(&val, f)
    }
}

#[cfg(test)]
mod test {
    use super::SegmentType;
    use std::collections::HashSet;
    use strum::EnumCount;

    #[test]
    fn segment_type_roundtrip() {
        let mut seen = HashSet::new();
        for v in 0..=u16::MAX {
            let t = SegmentType::from(v);
            seen.insert(std::mem::discriminant(&t));
            assert_eq!(u16::from(t), v);
        }
        // If this fails, you may have forgotten to update From<u16>
        assert_eq!(seen.len(), SegmentType::COUNT)
    }

    #[test]
    fn compares_with_wire_value() {
        assert_eq!(SegmentType::ClientKeepAlive, 7u16);
        assert_eq!(8u16, SegmentType::ServerKeepAlive);
        assert_ne!(SegmentType::Ipc, 4u16);
    }
}
