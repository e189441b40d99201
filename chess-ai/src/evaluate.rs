//! 棋局评估函数

use protocol::{Board, BoardState, Color, MoveGenerator, Piece, PieceKind, Square};

/// 评估器
pub struct Evaluator;

/// 每多一步合法走法的加分
pub const MOBILITY_WEIGHT: i32 = 5;

/// 双方非兵子力之和不超过此值时视为残局
const ENDGAME_MATERIAL: i32 = 2600;

const DOUBLED_PAWN_PENALTY: i32 = 20;
const ISOLATED_PAWN_PENALTY: i32 = 15;
const PASSED_PAWN_BONUS: i32 = 20;
const PASSED_PAWN_STEP: i32 = 10;
const DEFENDED_PAWN_BONUS: i32 = 10;
const MISSING_SHIELD_PENALTY: i32 = 15;
const STRANDED_KING_PENALTY: i32 = 40;

/// 棋子位置分值表（白方视角，黑方按横排镜像）
/// 索引为 rank * 8 + file，第一行是第 1 横排
mod position_tables {
    pub const PAWN: [i32; 64] = [
         0,  0,  0,  0,  0,  0,  0,  0,
         5, 10, 10,-20,-20, 10, 10,  5,
         5, -5,-10,  0,  0,-10, -5,  5,
         0,  0,  0, 20, 20,  0,  0,  0,
         5,  5, 10, 25, 25, 10,  5,  5,
        10, 10, 20, 30, 30, 20, 10, 10,
        50, 50, 50, 50, 50, 50, 50, 50,
         0,  0,  0,  0,  0,  0,  0,  0,
    ];

    pub const KNIGHT: [i32; 64] = [
       -50,-40,-30,-30,-30,-30,-40,-50,
       -40,-20,  0,  5,  5,  0,-20,-40,
       -30,  5, 10, 15, 15, 10,  5,-30,
       -30,  0, 15, 20, 20, 15,  0,-30,
       -30,  5, 15, 20, 20, 15,  5,-30,
       -30,  0, 10, 15, 15, 10,  0,-30,
       -40,-20,  0,  0,  0,  0,-20,-40,
       -50,-40,-30,-30,-30,-30,-40,-50,
    ];

    pub const BISHOP: [i32; 64] = [
       -20,-10,-10,-10,-10,-10,-10,-20,
       -10,  5,  0,  0,  0,  0,  5,-10,
       -10, 10, 10, 10, 10, 10, 10,-10,
       -10,  0, 10, 10, 10, 10,  0,-10,
       -10,  5,  5, 10, 10,  5,  5,-10,
       -10,  0,  5, 10, 10,  5,  0,-10,
       -10,  0,  0,  0,  0,  0,  0,-10,
       -20,-10,-10,-10,-10,-10,-10,-20,
    ];

    pub const ROOK: [i32; 64] = [
         0,  0,  0,  5,  5,  0,  0,  0,
        -5,  0,  0,  0,  0,  0,  0, -5,
        -5,  0,  0,  0,  0,  0,  0, -5,
        -5,  0,  0,  0,  0,  0,  0, -5,
        -5,  0,  0,  0,  0,  0,  0, -5,
        -5,  0,  0,  0,  0,  0,  0, -5,
         5, 10, 10, 10, 10, 10, 10,  5,
         0,  0,  0,  0,  0,  0,  0,  0,
    ];

    pub const QUEEN: [i32; 64] = [
       -20,-10,-10, -5, -5,-10,-10,-20,
       -10,  0,  5,  0,  0,  0,  0,-10,
       -10,  5,  5,  5,  5,  5,  0,-10,
         0,  0,  5,  5,  5,  5,  0, -5,
        -5,  0,  5,  5,  5,  5,  0, -5,
       -10,  0,  5,  5,  5,  5,  0,-10,
       -10,  0,  0,  0,  0,  0,  0,-10,
       -20,-10,-10, -5, -5,-10,-10,-20,
    ];

    /// 中局王：躲在易位后的角落
    pub const KING_MIDDLE: [i32; 64] = [
        20, 30, 10,  0,  0, 10, 30, 20,
        20, 20,  0,  0,  0,  0, 20, 20,
       -10,-20,-20,-20,-20,-20,-20,-10,
       -20,-30,-30,-40,-40,-30,-30,-20,
       -30,-40,-40,-50,-50,-40,-40,-30,
       -30,-40,-40,-50,-50,-40,-40,-30,
       -30,-40,-40,-50,-50,-40,-40,-30,
       -30,-40,-40,-50,-50,-40,-40,-30,
    ];

    /// 残局王：走向中心
    pub const KING_END: [i32; 64] = [
       -50,-30,-30,-30,-30,-30,-30,-50,
       -30,-30,  0,  0,  0,  0,-30,-30,
       -30,-10, 20, 30, 30, 20,-10,-30,
       -30,-10, 30, 40, 40, 30,-10,-30,
       -30,-10, 30, 40, 40, 30,-10,-30,
       -30,-10, 20, 30, 30, 20,-10,-30,
       -30,-20,-10,  0,  0,-10,-20,-30,
       -50,-40,-30,-20,-20,-30,-40,-50,
    ];
}

impl Evaluator {
    /// 评估局面（白方视角，正值对白方有利）
    pub fn evaluate(state: &BoardState) -> i32 {
        let board = &state.board;
        let endgame = Self::is_endgame(board);

        let mut score = 0;
        for (sq, piece) in board.all_pieces() {
            let piece_score = piece.value() + Self::position_bonus(sq, piece, endgame);
            match piece.color {
                Color::White => score += piece_score,
                Color::Black => score -= piece_score,
            }
        }

        score += Self::pawn_structure(board, Color::White)
            - Self::pawn_structure(board, Color::Black);
        if !endgame {
            score += Self::king_safety(state, Color::White)
                - Self::king_safety(state, Color::Black);
        }
        let mobility = Self::mobility(state, Color::White) - Self::mobility(state, Color::Black);
        score += MOBILITY_WEIGHT * mobility;

        score
    }

    /// 快速评估（仅计算子力差）
    pub fn evaluate_material(board: &Board) -> i32 {
        let mut score = 0;
        for (_, piece) in board.all_pieces() {
            match piece.color {
                Color::White => score += piece.value(),
                Color::Black => score -= piece.value(),
            }
        }
        score
    }

    /// 是否进入残局
    pub fn is_endgame(board: &Board) -> bool {
        let material: i32 = board
            .all_pieces()
            .into_iter()
            .filter(|(_, p)| p.kind != PieceKind::Pawn)
            .map(|(_, p)| p.value())
            .sum();
        material <= ENDGAME_MATERIAL
    }

    /// 获取位置加成分
    fn position_bonus(sq: Square, piece: Piece, endgame: bool) -> i32 {
        let rank = match piece.color {
            Color::White => sq.rank as usize,
            // 黑方需要镜像（横排翻转）
            Color::Black => 7 - sq.rank as usize,
        };
        let index = rank * 8 + sq.file as usize;

        match piece.kind {
            PieceKind::Pawn => position_tables::PAWN[index],
            PieceKind::Knight => position_tables::KNIGHT[index],
            PieceKind::Bishop => position_tables::BISHOP[index],
            PieceKind::Rook => position_tables::ROOK[index],
            PieceKind::Queen => position_tables::QUEEN[index],
            PieceKind::King if endgame => position_tables::KING_END[index],
            PieceKind::King => position_tables::KING_MIDDLE[index],
        }
    }

    /// 兵形：叠兵、孤兵、通路兵和受保护的兵
    fn pawn_structure(board: &Board, color: Color) -> i32 {
        let pawns: Vec<Square> = Self::pawns(board, color);
        let enemy: Vec<Square> = Self::pawns(board, color.opponent());

        let mut per_file = [0i32; 8];
        for sq in &pawns {
            per_file[sq.file as usize] += 1;
        }

        let mut score = 0;
        for count in per_file {
            if count > 1 {
                score -= DOUBLED_PAWN_PENALTY * (count - 1);
            }
        }

        let dir = color.pawn_direction();
        for sq in &pawns {
            let file = sq.file as i32;
            let neighbours = (file - 1..=file + 1)
                .filter(|&f| f != file && (0..8).contains(&f))
                .any(|f| per_file[f as usize] > 0);
            if !neighbours {
                score -= ISOLATED_PAWN_PENALTY;
            }

            let passed = !enemy.iter().any(|e| {
                let ahead = (e.rank as i32 - sq.rank as i32) * dir as i32 > 0;
                ahead && (e.file as i32 - file).abs() <= 1
            });
            if passed {
                let advancement = (sq.rank as i32 - color.pawn_rank() as i32).abs();
                score += PASSED_PAWN_BONUS + PASSED_PAWN_STEP * advancement;
            }

            for df in [-1, 1] {
                let guard = sq.offset(df, -dir).and_then(|s| board.get(s));
                if guard == Some(Piece::new(PieceKind::Pawn, color)) {
                    score += DEFENDED_PAWN_BONUS;
                }
            }
        }

        score
    }

    /// 王的安全（只在中局计算）
    fn king_safety(state: &BoardState, color: Color) -> i32 {
        let Some(king) = state.board.find_king(color) else {
            return 0;
        };

        let mut score = 0;
        let dir = color.pawn_direction();
        for df in [-1, 0, 1] {
            if let Some(shield) = king.offset(df, dir) {
                if state.board.get(shield) != Some(Piece::new(PieceKind::Pawn, color)) {
                    score -= MISSING_SHIELD_PENALTY;
                }
            }
        }

        // 王还在原位却已经不能易位
        let home = Square::new_unchecked(4, color.back_rank());
        if king == home && !state.castling_rights(color).any() {
            score -= STRANDED_KING_PENALTY;
        }

        score
    }

    /// 指定一方的合法走法数
    fn mobility(state: &BoardState, color: Color) -> i32 {
        if state.side_to_move == color {
            return MoveGenerator::generate_legal(state).len() as i32;
        }
        let mut view = state.clone();
        view.side_to_move = color;
        view.en_passant = None;
        MoveGenerator::generate_legal(&view).len() as i32
    }

    fn pawns(board: &Board, color: Color) -> Vec<Square> {
        board
            .pieces(color)
            .into_iter()
            .filter(|(_, p)| p.kind == PieceKind::Pawn)
            .map(|(sq, _)| sq)
            .collect()
    }
}
