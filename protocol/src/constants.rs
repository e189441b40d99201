//! 协议常量定义

use std::time::Duration;

/// 协议版本号
pub const PROTOCOL_VERSION: u8 = 1;

/// 棋盘边长（行列数）
pub const BOARD_SIZE: usize = 8;

/// 棋盘格子数
pub const SQUARE_COUNT: usize = BOARD_SIZE * BOARD_SIZE;

/// 默认端口
pub const DEFAULT_PORT: u16 = 5555;

/// 消息帧最大大小
pub const MAX_FRAME_SIZE: usize = 65536;

/// 服务端最大连接数
pub const MAX_CONNECTIONS: usize = 100;

/// 五十回合规则（半回合计数）
pub const FIFTY_MOVE_LIMIT: u32 = 100;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 握手超时（秒）
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);

/// 握手超时 Duration
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(HANDSHAKE_TIMEOUT_SECS);
