//! 消息类型定义
//!
//! 线上使用 bincode 1 的默认编码（定长整数、小端），
//! 枚举变体按声明顺序编号，新增变体只能追加在末尾。

use serde::{Deserialize, Serialize};

use crate::moves::{Move, SpecialMove};
use crate::piece::{Color, Square};

/// 会话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRole {
    /// 建立监听并参与对局
    Host,
    /// 连接到主机
    Joiner,
}

/// 线上传输的走法
///
/// 只带起点、终点和走法类型，接收方在本地合法走法中重新匹配出完整的 Move。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMove {
    pub from: Square,
    pub to: Square,
    pub special: SpecialMove,
}

impl WireMove {
    /// 在合法走法中查找对应的一步
    pub fn resolve(&self, legal: &[Move]) -> Option<Move> {
        legal
            .iter()
            .find(|m| m.from == self.from && m.to == self.to && m.special == self.special)
            .copied()
    }
}

impl From<&Move> for WireMove {
    fn from(mv: &Move) -> Self {
        Self {
            from: mv.from,
            to: mv.to,
            special: mv.special,
        }
    }
}

impl std::fmt::Display for WireMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let SpecialMove::Promotion(kind) = self.special {
            write!(f, "{}", kind.to_char())?;
        }
        Ok(())
    }
}

/// 拒绝连接的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// 协议版本不一致
    VersionMismatch { expected: u8, actual: u8 },
    /// 服务器已满
    ServerFull,
}

/// 棋局不同步的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesyncReason {
    /// 走法不在本地合法走法列表中
    IllegalMove,
    /// 不是对方的回合
    OutOfTurn,
    /// 走后的局面指纹不一致
    FingerprintMismatch,
    /// 无法解码的消息
    MalformedMessage,
    /// 对局中收到不该出现的消息
    UnexpectedMessage,
}

impl std::fmt::Display for DesyncReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DesyncReason::IllegalMove => "illegal move",
            DesyncReason::OutOfTurn => "move out of turn",
            DesyncReason::FingerprintMismatch => "position fingerprint mismatch",
            DesyncReason::MalformedMessage => "malformed message",
            DesyncReason::UnexpectedMessage => "unexpected message",
        };
        f.write_str(text)
    }
}

/// 双方交换的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMessage {
    /// 加入方发起握手
    Hello { version: u8 },
    /// 接受握手，告知加入方执哪一方
    Welcome { version: u8, color: Color },
    /// 拒绝握手
    Reject { reason: RejectReason },
    /// 对局开始
    Start,
    /// 走棋，fingerprint 为走后局面的指纹
    Move { mv: WireMove, fingerprint: u64 },
    /// 认输
    Resign,
    /// 检测到不同步
    DesyncReport { reason: DesyncReason },
    /// 对手已离开（仅中继发送）
    PeerLeft,
}

impl SessionMessage {
    /// 消息名称（用于日志和错误）
    pub fn kind(&self) -> &'static str {
        match self {
            SessionMessage::Hello { .. } => "Hello",
            SessionMessage::Welcome { .. } => "Welcome",
            SessionMessage::Reject { .. } => "Reject",
            SessionMessage::Start => "Start",
            SessionMessage::Move { .. } => "Move",
            SessionMessage::Resign => "Resign",
            SessionMessage::DesyncReport { .. } => "DesyncReport",
            SessionMessage::PeerLeft => "PeerLeft",
        }
    }
}
