//! Zobrist 哈希
//!
//! 局面指纹用于重复局面判定和联机双方的棋盘一致性校验，
//! 表使用固定种子生成，双方进程算出的指纹相同。

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::board::BoardState;
use crate::constants::SQUARE_COUNT;
use crate::piece::{Color, Piece, PieceKind, Square};

/// Zobrist 哈希表
pub struct ZobristTable {
    /// 棋子哈希值 [color][kind][square]
    pieces: [[[u64; SQUARE_COUNT]; 6]; 2],
    /// 黑方走棋
    side_to_move: u64,
    /// 易位权：白王翼、白后翼、黑王翼、黑后翼
    castling: [u64; 4],
    /// 吃过路兵所在列
    en_passant_file: [u64; 8],
}

impl ZobristTable {
    /// 创建新的 Zobrist 表（使用固定种子保证确定性）
    pub fn new() -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(0xDEADBEEF_CAFE_1234);

        let mut pieces = [[[0u64; SQUARE_COUNT]; 6]; 2];
        for color in pieces.iter_mut() {
            for kind in color.iter_mut() {
                for sq in kind.iter_mut() {
                    *sq = rng.gen();
                }
            }
        }

        let side_to_move = rng.gen();
        let mut castling = [0u64; 4];
        for key in castling.iter_mut() {
            *key = rng.gen();
        }
        let mut en_passant_file = [0u64; 8];
        for key in en_passant_file.iter_mut() {
            *key = rng.gen();
        }

        Self {
            pieces,
            side_to_move,
            castling,
            en_passant_file,
        }
    }

    /// 计算完整局面的哈希值
    pub fn hash(&self, state: &BoardState) -> u64 {
        let mut hash = 0u64;

        for (sq, piece) in state.board.all_pieces() {
            hash ^= self.piece_hash(piece, sq);
        }

        if state.side_to_move == Color::Black {
            hash ^= self.side_to_move;
        }

        for color in [Color::White, Color::Black] {
            let rights = state.castling_rights(color);
            if rights.kingside {
                hash ^= self.castling[color.index() * 2];
            }
            if rights.queenside {
                hash ^= self.castling[color.index() * 2 + 1];
            }
        }

        // 只有确实能吃过路兵时才计入，否则同一局面会得到不同指纹
        if let Some(target) = state.en_passant {
            if en_passant_capturable(state, target) {
                hash ^= self.en_passant_file[target.file as usize];
            }
        }

        hash
    }

    /// 获取棋子的哈希值
    #[inline]
    pub fn piece_hash(&self, piece: Piece, sq: Square) -> u64 {
        self.pieces[piece.color.index()][piece.kind.index()][sq.to_index()]
    }
}

impl Default for ZobristTable {
    fn default() -> Self {
        Self::new()
    }
}

// 全局 Zobrist 表
lazy_static::lazy_static! {
    static ref ZOBRIST: ZobristTable = ZobristTable::new();
}

/// 使用全局表计算局面指纹
#[inline]
pub fn hash(state: &BoardState) -> u64 {
    ZOBRIST.hash(state)
}

fn en_passant_capturable(state: &BoardState, target: Square) -> bool {
    let color = state.side_to_move;
    let pawn = Piece::new(PieceKind::Pawn, color);
    [-1, 1].into_iter().any(|df| {
        target
            .offset(df, -color.pawn_direction())
            .is_some_and(|from| state.board.get(from) == Some(pawn))
    })
}
