use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Not the leader, current leader is {0:?}")]
    NotLeader(Option<String>),

    #[error("RPC to {0} timed out")]
    TransportTimeout(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Non-contiguous ledger index: expected {expected}, got {got}")]
    NonContiguousIndex { expected: u64, got: u64 },

    #[error("Cannot truncate at {requested}: history before offset {offset} is evicted")]
    StaleTruncation { requested: u64, offset: u64 },

    #[error("Ledger index {index} out of range [{offset}, {end})")]
    OutOfRange { index: u64, offset: u64, end: u64 },

    #[error("Command not committed before the deadline")]
    CommitTimeout,

    #[error("Broker connection lost: {0}")]
    ConnectionLost(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Core event loop is no longer running")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
