//! 错误类型定义

use thiserror::Error;

use crate::message::DesyncReason;
use crate::piece::{Color, Square};

/// 象棋规则错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChessError {
    /// 非法走法（调用方违约，或对端发送了损坏/恶意数据）
    #[error("Illegal move: {origin} -> {destination}")]
    IllegalMove { origin: Square, destination: Square },

    /// 不是你的回合
    #[error("Not your turn")]
    NotYourTurn,

    /// 游戏已结束
    #[error("Game is already over")]
    GameOver,

    /// 无效的 FEN 字符串
    #[error("Invalid FEN string: {reason}")]
    InvalidFen { reason: String },

    /// 无效的走法记号
    #[error("Invalid move notation: {text}")]
    InvalidNotation { text: String },
}

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误（bincode）
    #[error("Bincode serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// 协议版本不匹配
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    /// 帧大小超限
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接丢失
    #[error("Connection lost")]
    ConnectionLost,

    /// 无法解码的消息
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// 握手阶段收到意外消息
    #[error("Unexpected message, expected {expected}")]
    UnexpectedMessage { expected: &'static str },

    /// 双方棋局不同步
    #[error("Session desynchronized: {0}")]
    Desynchronized(DesyncReason),

    /// 对方认输
    #[error("{color} resigned")]
    PeerResigned { color: Color },

    /// 服务器已满
    #[error("Server is full")]
    ServerFull,

    /// 会话已结束
    #[error("Session is over")]
    SessionOver,

    /// 象棋规则错误
    #[error("Chess error: {0}")]
    Chess(#[from] ChessError),
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
