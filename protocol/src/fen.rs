//! FEN 格式解析和生成
//!
//! 国际象棋 FEN 格式：
//! `<棋盘> <走子方> <易位权> <吃过路兵目标> <半回合计数> <回合数>`
//!
//! 示例：
//! `rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1`

use crate::board::{Board, BoardState, CastlingRights};
use crate::constants::BOARD_SIZE;
use crate::error::ChessError;
use crate::piece::{Color, Piece, Square};

/// 初始局面 FEN
pub const INITIAL_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

fn invalid(reason: impl Into<String>) -> ChessError {
    ChessError::InvalidFen {
        reason: reason.into(),
    }
}

/// FEN 格式处理
pub struct Fen;

impl Fen {
    /// 解析 FEN 字符串为棋盘状态
    ///
    /// 前四个字段必须存在，半回合计数和回合数缺省为 0 和 1。
    pub fn parse(fen: &str) -> Result<BoardState, ChessError> {
        let parts: Vec<&str> = fen.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(invalid(format!("Expected at least 4 fields, got {}", parts.len())));
        }

        let board = Self::parse_board(parts[0])?;

        let side_to_move = match parts[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(invalid(format!("Invalid side to move: {}", other))),
        };

        let castling = Self::parse_castling(parts[2])?;

        let en_passant = match parts[3] {
            "-" => None,
            text => {
                let sq: Square = text
                    .parse()
                    .map_err(|_| invalid(format!("Invalid en passant square: {}", text)))?;
                if sq.rank != 2 && sq.rank != 5 {
                    return Err(invalid(format!("Invalid en passant square: {}", text)));
                }
                Some(sq)
            }
        };

        let halfmove_clock = match parts.get(4) {
            Some(text) => text
                .parse()
                .map_err(|_| invalid(format!("Invalid halfmove clock: {}", text)))?,
            None => 0,
        };

        let fullmove_number = match parts.get(5) {
            Some(text) => text
                .parse()
                .map_err(|_| invalid(format!("Invalid fullmove number: {}", text)))?,
            None => 1,
        };

        Ok(BoardState {
            board,
            side_to_move,
            castling,
            en_passant,
            halfmove_clock,
            fullmove_number,
        })
    }

    /// 解析棋盘部分
    fn parse_board(board_str: &str) -> Result<Board, ChessError> {
        let mut board = Board::empty();
        let rows: Vec<&str> = board_str.split('/').collect();

        if rows.len() != BOARD_SIZE {
            return Err(invalid(format!("Expected 8 rows, got {}", rows.len())));
        }

        // FEN 从第 8 行写到第 1 行
        for (row_idx, row) in rows.iter().enumerate() {
            let rank = (BOARD_SIZE - 1 - row_idx) as u8;
            let mut file = 0u8;

            for c in row.chars() {
                if file as usize >= BOARD_SIZE {
                    return Err(invalid(format!("Row {} has too many columns", row_idx)));
                }

                if let Some(empty_count) = c.to_digit(10) {
                    if !(1..=8).contains(&empty_count) {
                        return Err(invalid(format!("Invalid empty count: {}", c)));
                    }
                    file += empty_count as u8;
                } else if let Some(piece) = Piece::from_fen_char(c) {
                    board.set(Square::new_unchecked(file, rank), Some(piece));
                    file += 1;
                } else {
                    return Err(invalid(format!("Invalid piece character: {}", c)));
                }
            }

            if file as usize != BOARD_SIZE {
                return Err(invalid(format!(
                    "Row {} has {} columns, expected 8",
                    row_idx, file
                )));
            }
        }

        Ok(board)
    }

    fn parse_castling(text: &str) -> Result<[CastlingRights; 2], ChessError> {
        let mut castling = [CastlingRights::NONE; 2];
        if text == "-" {
            return Ok(castling);
        }
        for c in text.chars() {
            match c {
                'K' => castling[Color::White.index()].kingside = true,
                'Q' => castling[Color::White.index()].queenside = true,
                'k' => castling[Color::Black.index()].kingside = true,
                'q' => castling[Color::Black.index()].queenside = true,
                _ => return Err(invalid(format!("Invalid castling rights: {}", text))),
            }
        }
        Ok(castling)
    }

    /// 将棋盘状态转换为 FEN 字符串
    pub fn to_string(state: &BoardState) -> String {
        let en_passant = state
            .en_passant
            .map(|sq| sq.to_string())
            .unwrap_or_else(|| "-".to_string());

        format!(
            "{} {} {} {} {} {}",
            Self::board_to_string(&state.board),
            state.side_to_move.to_fen_char(),
            Self::castling_to_string(&state.castling),
            en_passant,
            state.halfmove_clock,
            state.fullmove_number
        )
    }

    /// 将棋盘转换为 FEN 棋盘部分
    pub fn board_to_string(board: &Board) -> String {
        let mut rows = Vec::with_capacity(BOARD_SIZE);

        for rank in (0..BOARD_SIZE as u8).rev() {
            let mut row = String::new();
            let mut empty_count = 0;

            for file in 0..BOARD_SIZE as u8 {
                if let Some(piece) = board.get(Square::new_unchecked(file, rank)) {
                    if empty_count > 0 {
                        row.push_str(&empty_count.to_string());
                        empty_count = 0;
                    }
                    row.push(piece.to_fen_char());
                } else {
                    empty_count += 1;
                }
            }

            if empty_count > 0 {
                row.push_str(&empty_count.to_string());
            }

            rows.push(row);
        }

        rows.join("/")
    }

    fn castling_to_string(castling: &[CastlingRights; 2]) -> String {
        let white = castling[Color::White.index()];
        let black = castling[Color::Black.index()];
        let mut text = String::new();
        if white.kingside {
            text.push('K');
        }
        if white.queenside {
            text.push('Q');
        }
        if black.kingside {
            text.push('k');
        }
        if black.queenside {
            text.push('q');
        }
        if text.is_empty() {
            text.push('-');
        }
        text
    }
}
