use strum_macros::{Display, EnumCount};

/// Connection state, as reported by the OS connection table (MIB_TCP_STATE numbering)
#[derive(Eq, PartialEq, Copy, Clone, Debug, Display, EnumCount)]
pub enum TcpState {
    Unknown,
    Closed,
    Listen,
    SynSent,
    SynRcvd,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    DeleteTcb,
    Other(u32),
}

impl From<u32> for TcpState {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::Closed,
            2 => Self::Listen,
            3 => Self::SynSent,
            4 => Self::SynRcvd,
            5 => Self::Established,
            6 => Self::FinWait1,
            7 => Self::FinWait2,
            8 => Self::CloseWait,
            9 => Self::Closing,
            10 => Self::LastAck,
            11 => Self::TimeWait,
            12 => Self::DeleteTcb,
            x => Self::Other(x),
        }
    }
}

impl From<TcpState> for u32 {
    fn from(state: TcpState) -> Self {
        match state {
            TcpState::Unknown => 0,
            TcpState::Closed => 1,
            TcpState::Listen => 2,
            TcpState::SynSent => 3,
            TcpState::SynRcvd => 4,
            TcpState::Established => 5,
            TcpState::FinWait1 => 6,
            TcpState::FinWait2 => 7,
            TcpState::CloseWait => 8,
            TcpState::Closing => 9,
            TcpState::LastAck => 10,
            TcpState::TimeWait => 11,
            TcpState::DeleteTcb => 12,
            TcpState::Other(x) => x,
        }
    }
}
