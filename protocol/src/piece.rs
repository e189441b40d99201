//! 棋子与格子定义

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{BOARD_SIZE, SQUARE_COUNT};
use crate::error::ChessError;

/// 棋子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    /// 升变可选的棋子（生成顺序固定）
    pub const PROMOTIONS: [PieceKind; 4] = [
        PieceKind::Queen,
        PieceKind::Rook,
        PieceKind::Bishop,
        PieceKind::Knight,
    ];

    /// 获取棋子的基础分值（用于 AI 评估，国王不计入子力）
    pub fn value(&self) -> i32 {
        match self {
            PieceKind::Pawn => 100,
            PieceKind::Knight => 320,
            PieceKind::Bishop => 330,
            PieceKind::Rook => 500,
            PieceKind::Queen => 900,
            PieceKind::King => 0,
        }
    }

    /// 数组索引
    #[inline]
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// 是否为轻子（马、象）
    pub fn is_minor(&self) -> bool {
        matches!(self, PieceKind::Knight | PieceKind::Bishop)
    }

    /// 获取 FEN 字符（白方大写，黑方小写）
    pub fn to_fen_char(&self, color: Color) -> char {
        let c = self.to_char();
        match color {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }

    /// 小写字母表示（也用于坐标记法中的升变后缀）
    pub fn to_char(&self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }

    /// 从字母解析（忽略大小写）
    pub fn from_char(c: char) -> Option<PieceKind> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceKind::Pawn),
            'n' => Some(PieceKind::Knight),
            'b' => Some(PieceKind::Bishop),
            'r' => Some(PieceKind::Rook),
            'q' => Some(PieceKind::Queen),
            'k' => Some(PieceKind::King),
            _ => None,
        }
    }
}

/// 阵营
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    /// 白方（先手）
    White,
    /// 黑方
    Black,
}

impl Color {
    /// 获取对方阵营
    pub fn opponent(&self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// 数组索引：白 0，黑 1
    #[inline]
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// 底线所在行
    pub fn back_rank(&self) -> u8 {
        match self {
            Color::White => 0,
            Color::Black => 7,
        }
    }

    /// 兵的前进方向
    pub fn pawn_direction(&self) -> i8 {
        match self {
            Color::White => 1,
            Color::Black => -1,
        }
    }

    /// 兵的起始行
    pub fn pawn_rank(&self) -> u8 {
        match self {
            Color::White => 1,
            Color::Black => 6,
        }
    }

    /// 获取 FEN 字符
    pub fn to_fen_char(&self) -> char {
        match self {
            Color::White => 'w',
            Color::Black => 'b',
        }
    }

    /// 从 FEN 字符解析
    pub fn from_fen_char(c: char) -> Option<Color> {
        match c {
            'w' | 'W' => Some(Color::White),
            'b' | 'B' => Some(Color::Black),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

/// 棋子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: Color,
}

impl Piece {
    /// 创建新棋子
    pub fn new(kind: PieceKind, color: Color) -> Self {
        Self { kind, color }
    }

    /// 获取 FEN 字符
    pub fn to_fen_char(&self) -> char {
        self.kind.to_fen_char(self.color)
    }

    /// 从 FEN 字符解析
    pub fn from_fen_char(c: char) -> Option<Piece> {
        let kind = PieceKind::from_char(c)?;
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        Some(Piece { kind, color })
    }

    /// 获取棋子分值
    pub fn value(&self) -> i32 {
        self.kind.value()
    }
}

/// 棋盘格子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Square {
    /// 列 (0-7, a-h)
    pub file: u8,
    /// 行 (0-7, 1-8)
    pub rank: u8,
}

impl Square {
    /// 创建新格子
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        if (file as usize) < BOARD_SIZE && (rank as usize) < BOARD_SIZE {
            Some(Self { file, rank })
        } else {
            None
        }
    }

    /// 创建新格子（不检查边界，内部使用）
    pub const fn new_unchecked(file: u8, rank: u8) -> Self {
        Self { file, rank }
    }

    /// 检查格子是否在棋盘内
    pub fn is_valid(&self) -> bool {
        (self.file as usize) < BOARD_SIZE && (self.rank as usize) < BOARD_SIZE
    }

    /// 获取偏移后的格子
    pub fn offset(&self, df: i8, dr: i8) -> Option<Square> {
        let file = self.file as i8 + df;
        let rank = self.rank as i8 + dr;
        if (0..BOARD_SIZE as i8).contains(&file) && (0..BOARD_SIZE as i8).contains(&rank) {
            Some(Square {
                file: file as u8,
                rank: rank as u8,
            })
        } else {
            None
        }
    }

    /// 转换为数组索引（a1 = 0, h8 = 63）
    pub fn to_index(&self) -> usize {
        self.rank as usize * BOARD_SIZE + self.file as usize
    }

    /// 从数组索引转换
    pub fn from_index(index: usize) -> Option<Self> {
        if index < SQUARE_COUNT {
            Some(Square {
                file: (index % BOARD_SIZE) as u8,
                rank: (index / BOARD_SIZE) as u8,
            })
        } else {
            None
        }
    }

    /// 是否为浅色格
    pub fn is_light(&self) -> bool {
        (self.file + self.rank) % 2 == 1
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.file) as char, self.rank + 1)
    }
}

impl FromStr for Square {
    type Err = ChessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(ChessError::InvalidNotation {
                text: s.to_string(),
            });
        }
        let file = bytes[0].wrapping_sub(b'a');
        let rank = bytes[1].wrapping_sub(b'1');
        Square::new(file, rank).ok_or_else(|| ChessError::InvalidNotation {
            text: s.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_fen_char() {
        let white_king = Piece::new(PieceKind::King, Color::White);
        assert_eq!(white_king.to_fen_char(), 'K');

        let black_knight = Piece::new(PieceKind::Knight, Color::Black);
        assert_eq!(black_knight.to_fen_char(), 'n');

        assert_eq!(
            Piece::from_fen_char('R'),
            Some(Piece::new(PieceKind::Rook, Color::White))
        );
        assert_eq!(Piece::from_fen_char('x'), None);
    }

    #[test]
    fn test_square_valid() {
        assert!(Square::new(0, 0).is_some());
        assert!(Square::new(7, 7).is_some());
        assert!(Square::new(8, 0).is_none());
        assert!(Square::new(0, 8).is_none());
    }

    #[test]
    fn test_square_algebraic() {
        let e4: Square = "e4".parse().unwrap();
        assert_eq!(e4, Square::new_unchecked(4, 3));
        assert_eq!(e4.to_string(), "e4");

        assert!("i1".parse::<Square>().is_err());
        assert!("a9".parse::<Square>().is_err());
        assert!("e".parse::<Square>().is_err());
    }

    #[test]
    fn test_square_index_round_trip() {
        for index in 0..SQUARE_COUNT {
            let sq = Square::from_index(index).unwrap();
            assert_eq!(sq.to_index(), index);
        }
        assert!(Square::from_index(64).is_none());
    }

    #[test]
    fn test_square_color() {
        // a1 是深色格，h1 是浅色格
        assert!(!Square::new_unchecked(0, 0).is_light());
        assert!(Square::new_unchecked(7, 0).is_light());
    }

    #[test]
    fn test_color_opponent() {
        assert_eq!(Color::White.opponent(), Color::Black);
        assert_eq!(Color::Black.opponent(), Color::White);
    }
}
