#[derive(Debug, thiserror::Error)]
pub enum PfstatsError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid prefix length: {0}")]
    InvalidPrefixLength(String),
    #[error("{0}")]
    InsufficientPermission(String),
    #[error("cannot open pf device: {0}")]
    PfDevice(String),
    #[error("DIOCGETSTATES failed: {0}")]
    StateQuery(#[source] std::io::Error),
    #[error("state buffer of {len} bytes is not a multiple of the {record_size}-byte record size")]
    Decode { len: usize, record_size: usize },
    #[error("state table out of order: id {id} follows {prev}")]
    Ordering { prev: u64, id: u64 },
    #[error("rrdcached: {0}")]
    Rrdcached(String),
    #[error("sink I/O error: {0}")]
    SinkIo(#[source] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[source] std::io::Error),
    #[error("fatal: {0}")]
    Fatal(String),
}
