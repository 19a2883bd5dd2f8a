#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer closed the connection")]
    Closed,
}
