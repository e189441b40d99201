//! 国际象棋共享协议库
//!
//! 包含:
//! - 棋子、棋盘、局面等核心数据结构，走法的执行与撤销
//! - 走法生成、将军检测和对局状态判定
//! - Zobrist 局面指纹和对局记录
//! - FEN 与走法记号
//! - 会话消息定义 (SessionMessage)
//! - 传输层抽象 (Connector, Connection, Listener traits) 与帧编解码
//! - 联机会话 (主机、加入方与共用握手)

mod board;
mod classify;
mod constants;
mod error;
mod fen;
mod game;
mod message;
mod moves;
mod notation;
mod piece;
mod record;
mod session;
mod transport;
mod zobrist;

pub use board::{Board, BoardState, CastlingRights, Undo};
pub use classify::{DrawReason, GameClassifier, GameStatus};
pub use constants::*;
pub use error::{ChessError, ProtocolError, Result};
pub use fen::{Fen, INITIAL_FEN};
pub use game::Game;
pub use message::{DesyncReason, PeerRole, RejectReason, SessionMessage, WireMove};
pub use moves::{Move, MoveGenerator, SpecialMove};
pub use notation::Notation;
pub use piece::{Color, Piece, PieceKind, Square};
pub use record::{GameRecord, RecordEntry};
pub use session::{
    accept_hello, joiner_handshake, welcome, HostListener, Session, SessionStatus,
};
pub use transport::{
    Connection, Connector, Listener,
    TcpConnection, TcpConnector, TcpListener,
    NetworkConfig,
    FrameReader, FrameWriter,
};
pub use zobrist::ZobristTable;
