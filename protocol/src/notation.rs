//! 走法记号
//!
//! 坐标记法（`e2e4`、`e7e8q`）用于输入解析，标准代数记法（`Nf3`、`exd5`、`O-O`）用于日志输出。

use crate::board::BoardState;
use crate::error::ChessError;
use crate::moves::{Move, MoveGenerator, SpecialMove};
use crate::piece::{PieceKind, Square};

/// 走法记号处理
pub struct Notation;

impl Notation {
    /// 坐标记法
    pub fn to_coordinate(mv: &Move) -> String {
        mv.to_string()
    }

    /// 解析坐标记法，并在当前局面的合法走法中匹配
    pub fn parse_coordinate(state: &BoardState, text: &str) -> Result<Move, ChessError> {
        let invalid = || ChessError::InvalidNotation {
            text: text.to_string(),
        };

        let text = text.trim();
        if !(4..=5).contains(&text.len()) || !text.is_ascii() {
            return Err(invalid());
        }
        let from: Square = text[0..2].parse().map_err(|_| invalid())?;
        let to: Square = text[2..4].parse().map_err(|_| invalid())?;
        let promotion = match text[4..].chars().next() {
            Some(c) => match PieceKind::from_char(c) {
                Some(kind) if PieceKind::PROMOTIONS.contains(&kind) => Some(kind),
                _ => return Err(invalid()),
            },
            None => None,
        };

        MoveGenerator::generate_legal(state)
            .into_iter()
            .find(|m| m.from == from && m.to == to && m.promotion() == promotion)
            .ok_or(ChessError::IllegalMove {
                origin: from,
                destination: to,
            })
    }

    /// 标准代数记法（state 为走之前的局面）
    pub fn to_san(state: &BoardState, mv: &Move) -> String {
        let mut san = match mv.special {
            SpecialMove::CastleKingside => "O-O".to_string(),
            SpecialMove::CastleQueenside => "O-O-O".to_string(),
            _ => Self::san_body(state, mv),
        };

        if let Ok(next) = state.applied(mv) {
            let side = next.side_to_move;
            if MoveGenerator::is_in_check(&next.board, side) {
                if MoveGenerator::generate_legal(&next).is_empty() {
                    san.push('#');
                } else {
                    san.push('+');
                }
            }
        }

        san
    }

    fn san_body(state: &BoardState, mv: &Move) -> String {
        let mut san = String::new();
        let file_char = (b'a' + mv.from.file) as char;

        if mv.piece.kind == PieceKind::Pawn {
            if mv.is_capture() {
                san.push(file_char);
                san.push('x');
            }
            san.push_str(&mv.to.to_string());
            if let Some(kind) = mv.promotion() {
                san.push('=');
                san.push(kind.to_char().to_ascii_uppercase());
            }
            return san;
        }

        san.push(mv.piece.kind.to_char().to_ascii_uppercase());

        // 同类棋子可以走到同一格时需要消歧义
        let rivals: Vec<Move> = MoveGenerator::generate_legal(state)
            .into_iter()
            .filter(|m| m.piece == mv.piece && m.to == mv.to && m.from != mv.from)
            .collect();
        if !rivals.is_empty() {
            let same_file = rivals.iter().any(|m| m.from.file == mv.from.file);
            let same_rank = rivals.iter().any(|m| m.from.rank == mv.from.rank);
            if !same_file {
                san.push(file_char);
            } else if !same_rank {
                san.push((b'1' + mv.from.rank) as char);
            } else {
                san.push_str(&mv.from.to_string());
            }
        }

        if mv.is_capture() {
            san.push('x');
        }
        san.push_str(&mv.to.to_string());
        san
    }
}
