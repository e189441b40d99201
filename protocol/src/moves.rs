//! 走法生成和验证

use serde::{Deserialize, Serialize};

use crate::board::{Board, BoardState, CastleSquares};
use crate::piece::{Color, Piece, PieceKind, Square};

/// 走法类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialMove {
    Normal,
    /// 兵从起始行前进两格
    DoublePawnPush,
    /// 吃过路兵
    EnPassant,
    /// 王翼易位
    CastleKingside,
    /// 后翼易位
    CastleQueenside,
    /// 升变为指定棋子
    Promotion(PieceKind),
}

/// 走法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    /// 起始格
    pub from: Square,
    /// 目标格
    pub to: Square,
    /// 走动的棋子
    pub piece: Piece,
    /// 被吃的棋子（如果有；吃过路兵时为被吃的兵）
    pub captured: Option<Piece>,
    pub special: SpecialMove,
}

impl Move {
    /// 创建新走法
    pub fn new(
        from: Square,
        to: Square,
        piece: Piece,
        captured: Option<Piece>,
        special: SpecialMove,
    ) -> Self {
        Self {
            from,
            to,
            piece,
            captured,
            special,
        }
    }

    /// 升变的目标棋子
    pub fn promotion(&self) -> Option<PieceKind> {
        match self.special {
            SpecialMove::Promotion(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_capture(&self) -> bool {
        self.captured.is_some()
    }

    pub fn is_castle(&self) -> bool {
        matches!(
            self.special,
            SpecialMove::CastleKingside | SpecialMove::CastleQueenside
        )
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(kind) = self.promotion() {
            write!(f, "{}", kind.to_char())?;
        }
        Ok(())
    }
}

const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];

const KING_OFFSETS: [(i8, i8); 8] = [
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

const ROOK_DIRECTIONS: [(i8, i8); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

const BISHOP_DIRECTIONS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, -1), (-1, 1)];

/// 走法生成器
pub struct MoveGenerator;

impl MoveGenerator {
    /// 生成当前走子方的所有伪合法走法（不考虑走后是否被将）
    pub fn generate_pseudo_legal(state: &BoardState) -> Vec<Move> {
        let mut moves = Vec::with_capacity(64);
        let side = state.side_to_move;

        for (from, piece) in state.board.pieces(side) {
            match piece.kind {
                PieceKind::Pawn => Self::generate_pawn_moves(state, from, piece, &mut moves),
                _ => Self::generate_piece_moves(&state.board, from, piece, &mut moves),
            }
        }
        Self::generate_castling_moves(state, &mut moves);

        moves
    }

    /// 生成当前走子方的所有合法走法（过滤掉会让己方国王被将的走法）
    ///
    /// 在一份私有副本上逐个 apply / revert，和真实走子共用同一套实现。
    pub fn generate_legal(state: &BoardState) -> Vec<Move> {
        let mover = state.side_to_move;
        let mut work = state.clone();

        Self::generate_pseudo_legal(state)
            .into_iter()
            .filter(|mv| match work.apply(mv) {
                Ok(undo) => {
                    let safe = !Self::is_in_check(&work.board, mover);
                    work.revert(mv, undo);
                    safe
                }
                Err(_) => false,
            })
            .collect()
    }

    /// 检查指定格子是否被某方攻击
    pub fn is_square_attacked(board: &Board, square: Square, by: Color) -> bool {
        board.pieces(by).into_iter().any(|(from, piece)| {
            let mut hit = false;
            Self::for_each_attack(board, from, piece, |to| {
                hit = to == square;
                !hit
            });
            hit
        })
    }

    /// 检查指定阵营是否被将军
    pub fn is_in_check(board: &Board, color: Color) -> bool {
        match board.find_king(color) {
            Some(king) => Self::is_square_attacked(board, king, color.opponent()),
            None => false,
        }
    }

    /// 统计指定深度的叶子节点数
    pub fn perft(state: &BoardState, depth: u32) -> u64 {
        if depth == 0 {
            return 1;
        }
        let moves = Self::generate_legal(state);
        if depth == 1 {
            return moves.len() as u64;
        }

        let mut work = state.clone();
        let mut nodes = 0;
        for mv in &moves {
            if let Ok(undo) = work.apply(mv) {
                nodes += Self::perft(&work, depth - 1);
                work.revert(mv, undo);
            }
        }
        nodes
    }

    /// 遍历棋子攻击到的所有格子（兵只包括斜前方两格）
    ///
    /// 滑动棋子遇到第一个有子的格子后停止，该格子本身计入。回调返回 false 时提前结束。
    fn for_each_attack<F>(board: &Board, from: Square, piece: Piece, mut f: F)
    where
        F: FnMut(Square) -> bool,
    {
        let (offsets, sliding): (&[(i8, i8)], bool) = match piece.kind {
            PieceKind::Pawn => {
                let dir = piece.color.pawn_direction();
                for df in [-1, 1] {
                    if let Some(to) = from.offset(df, dir) {
                        if !f(to) {
                            return;
                        }
                    }
                }
                return;
            }
            PieceKind::Knight => (&KNIGHT_OFFSETS, false),
            PieceKind::King => (&KING_OFFSETS, false),
            PieceKind::Bishop => (&BISHOP_DIRECTIONS, true),
            PieceKind::Rook => (&ROOK_DIRECTIONS, true),
            PieceKind::Queen => (&KING_OFFSETS, true),
        };

        for &(df, dr) in offsets {
            let mut current = from;
            while let Some(to) = current.offset(df, dr) {
                if !f(to) {
                    return;
                }
                if !sliding || board.get(to).is_some() {
                    break;
                }
                current = to;
            }
        }
    }

    /// 生成马、象、车、后、王的普通走法
    fn generate_piece_moves(board: &Board, from: Square, piece: Piece, moves: &mut Vec<Move>) {
        Self::for_each_attack(board, from, piece, |to| {
            Self::try_add_move(board, from, to, piece, moves);
            true
        });
    }

    /// 尝试添加走法（目标为空或敌方棋子时）
    fn try_add_move(board: &Board, from: Square, to: Square, piece: Piece, moves: &mut Vec<Move>) {
        match board.get(to) {
            None => moves.push(Move::new(from, to, piece, None, SpecialMove::Normal)),
            Some(target) if target.color != piece.color => {
                moves.push(Move::new(from, to, piece, Some(target), SpecialMove::Normal))
            }
            Some(_) => {}
        }
    }

    /// 生成兵的走法
    fn generate_pawn_moves(state: &BoardState, from: Square, piece: Piece, moves: &mut Vec<Move>) {
        let board = &state.board;
        let color = piece.color;
        let dir = color.pawn_direction();
        let last_rank = color.opponent().back_rank();

        let push_or_promote = |to: Square, captured: Option<Piece>, moves: &mut Vec<Move>| {
            if to.rank == last_rank {
                for kind in PieceKind::PROMOTIONS {
                    moves.push(Move::new(from, to, piece, captured, SpecialMove::Promotion(kind)));
                }
            } else {
                moves.push(Move::new(from, to, piece, captured, SpecialMove::Normal));
            }
        };

        // 前进
        if let Some(one) = from.offset(0, dir) {
            if board.get(one).is_none() {
                push_or_promote(one, None, moves);

                // 起始行可以前进两格
                if from.rank == color.pawn_rank() {
                    if let Some(two) = one.offset(0, dir) {
                        if board.get(two).is_none() {
                            let special = SpecialMove::DoublePawnPush;
                            moves.push(Move::new(from, two, piece, None, special));
                        }
                    }
                }
            }
        }

        // 斜向吃子
        Self::for_each_attack(board, from, piece, |to| {
            match board.get(to) {
                Some(target) if target.color != color => push_or_promote(to, Some(target), moves),
                None if state.en_passant == Some(to) => {
                    let victim = Square::new_unchecked(to.file, from.rank);
                    if let Some(captured) = board.get(victim) {
                        let special = SpecialMove::EnPassant;
                        moves.push(Move::new(from, to, piece, Some(captured), special));
                    }
                }
                _ => {}
            }
            true
        });
    }

    /// 生成易位走法
    fn generate_castling_moves(state: &BoardState, moves: &mut Vec<Move>) {
        let color = state.side_to_move;
        let rights = state.castling_rights(color);
        if !rights.any() {
            return;
        }

        let board = &state.board;
        let king = Piece::new(PieceKind::King, color);
        let rook = Piece::new(PieceKind::Rook, color);
        let enemy = color.opponent();

        for (kingside, allowed, special) in [
            (true, rights.kingside, SpecialMove::CastleKingside),
            (false, rights.queenside, SpecialMove::CastleQueenside),
        ] {
            if !allowed {
                continue;
            }
            let squares = CastleSquares::new(color, kingside);
            if board.get(squares.king_from) != Some(king)
                || board.get(squares.rook_from) != Some(rook)
                || squares.between().any(|sq| board.get(sq).is_some())
            {
                continue;
            }
            // 王不能在被将时易位，也不能经过或落在被攻击的格子（车经过的 b 格只要求为空）
            if [squares.king_from, squares.rook_to, squares.king_to]
                .iter()
                .any(|&sq| Self::is_square_attacked(board, sq, enemy))
            {
                continue;
            }
            moves.push(Move::new(squares.king_from, squares.king_to, king, None, special));
        }
    }
}
