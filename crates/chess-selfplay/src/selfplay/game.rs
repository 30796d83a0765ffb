use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};
use log::debug;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, Position};

use super::engine::Engine;
use super::position::{OpeningError, OpeningLine};
use super::types::{EvalLog, MatchResult, SearchRequest, Termination};
use crate::book::polyglot_key;

/// 異常なエンジンで対局が終わらない場合の打ち切り手数（ply、開始手順を含む）。
pub const DEFAULT_MAX_PLIES: usize = 1000;

/// 75手ルール（150 ply）
const SEVENTY_FIVE_MOVE_PLIES: u32 = 150;
const FIVEFOLD: u32 = 5;

/// ゲーム設定
#[derive(Debug, Clone, Copy)]
pub struct GameConfig {
    /// `go depth` に渡す探索深さ
    pub depth: u32,
    pub max_plies: usize,
}

/// 終局した1局。`moves` は開始手順を含む全手順。
#[derive(Debug, Clone)]
pub struct GameRecord {
    pub position: Chess,
    pub moves: Vec<UciMove>,
    pub termination: Termination,
    /// 最後にエンジンが返した info（あれば）
    pub last_eval: Option<EvalLog>,
}

impl GameRecord {
    pub fn result(&self) -> MatchResult {
        self.termination.result()
    }

    pub fn plies(&self) -> usize {
        self.moves.len()
    }
}

/// 局面が終局していれば理由を返す。
///
/// `repetitions` は現局面がこれまでに出現した回数（現局面自身を含む）。
/// 判定はドロー申請を伴わないもののみ（5回同一局面・75手ルール）。
pub fn terminal_state(pos: &Chess, repetitions: u32) -> Option<Termination> {
    if pos.is_checkmate() {
        return Some(if pos.turn() == Color::White {
            Termination::BlackCheckmate
        } else {
            Termination::WhiteCheckmate
        });
    }
    if pos.is_stalemate() {
        return Some(Termination::Stalemate);
    }
    if pos.is_insufficient_material() {
        return Some(Termination::InsufficientMaterial);
    }
    if repetitions >= FIVEFOLD {
        return Some(Termination::FivefoldRepetition);
    }
    if pos.halfmoves() >= SEVENTY_FIVE_MOVE_PLIES {
        return Some(Termination::SeventyFiveMoves);
    }
    if pos.is_game_over() {
        return Some(Termination::OtherDraw);
    }
    None
}

/// 局面の出現回数を数えながら手を進める盤面。
struct TrackedBoard {
    pos: Chess,
    seen: HashMap<u64, u32>,
    current_key: u64,
}

impl TrackedBoard {
    fn new() -> Self {
        let pos = Chess::default();
        let current_key = polyglot_key(&pos);
        Self { pos, seen: HashMap::from([(current_key, 1)]), current_key }
    }

    fn play(&mut self, m: shakmaty::Move) {
        self.pos.play_unchecked(&m);
        self.current_key = polyglot_key(&self.pos);
        *self.seen.entry(self.current_key).or_insert(0) += 1;
    }

    fn repetitions(&self) -> u32 {
        self.seen.get(&self.current_key).copied().unwrap_or(0)
    }
}

/// 1局を実行する。
///
/// 盤面は `opening` の手順から毎回組み立て直す。終局（または `max_plies` 到達）まで
/// エンジンに `go depth` で指し手を求め続ける。エンジンが指し手を返さない・非合法手を
/// 返した場合はエラー。
pub fn run_game(
    engine: &mut dyn Engine,
    opening: &OpeningLine,
    config: &GameConfig,
) -> Result<GameRecord> {
    let mut board = TrackedBoard::new();
    let mut moves: Vec<UciMove> = Vec::with_capacity(opening.moves.len() + 128);
    for (index, mv) in opening.moves.iter().enumerate() {
        let m = mv
            .to_move(&board.pos)
            .map_err(|_| OpeningError::InvalidMove { index, mv: mv.to_string() })?;
        moves.push(m.to_uci(CastlingMode::Standard));
        board.play(m);
    }

    engine.new_game()?;
    let mut last_eval = None;

    let termination = loop {
        if let Some(t) = terminal_state(&board.pos, board.repetitions()) {
            break t;
        }
        if moves.len() >= config.max_plies {
            break Termination::Abandoned;
        }

        let req = SearchRequest { moves: &moves, depth: config.depth };
        let search = engine.search(&req)?;
        let ply = moves.len() + 1;
        let Some(mv_str) = search.bestmove else {
            bail!("engine returned no move at ply {} in a non-terminal position", ply);
        };
        let m = UciMove::from_ascii(mv_str.as_bytes())
            .ok()
            .and_then(|uci| uci.to_move(&board.pos).ok())
            .ok_or_else(|| anyhow!("engine returned illegal move '{}' at ply {}", mv_str, ply))?;
        debug!("ply {:>3}: {} ({} ms)", ply, mv_str, search.elapsed_ms);

        moves.push(m.to_uci(CastlingMode::Standard));
        board.play(m);
        if search.eval.is_some() {
            last_eval = search.eval;
        }
    };

    Ok(GameRecord { position: board.pos, moves, termination, last_eval })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::selfplay::position::{DEFAULT_BOOK_DEPTH, build_opening};
    use crate::selfplay::types::SearchOutcome;
    use shakmaty::fen::Fen;

    /// 台本どおりに指すエンジン。台本が尽きたら指し手なしを返す。
    pub struct ScriptedEngine {
        script: VecDeque<String>,
        /// 毎回最初に戻って台本を繰り返す
        cycle: Vec<String>,
        pub requests: Vec<(usize, u32)>,
        pub new_games: u32,
    }

    impl ScriptedEngine {
        pub fn new(script: &[&str]) -> Self {
            Self {
                script: script.iter().map(|s| s.to_string()).collect(),
                cycle: Vec::new(),
                requests: Vec::new(),
                new_games: 0,
            }
        }

        pub fn cycling(script: &[&str]) -> Self {
            let mut engine = Self::new(script);
            engine.cycle = script.iter().map(|s| s.to_string()).collect();
            engine
        }
    }

    impl Engine for ScriptedEngine {
        fn new_game(&mut self) -> Result<()> {
            self.new_games += 1;
            if !self.cycle.is_empty() {
                self.script = self.cycle.iter().cloned().collect();
            }
            Ok(())
        }

        fn search(&mut self, req: &SearchRequest<'_>) -> Result<SearchOutcome> {
            self.requests.push((req.moves.len(), req.depth));
            if self.script.is_empty() && !self.cycle.is_empty() {
                self.script = self.cycle.iter().cloned().collect();
            }
            Ok(SearchOutcome { bestmove: self.script.pop_front(), elapsed_ms: 1, eval: None })
        }
    }

    pub const SCHOLARS_MATE: [&str; 5] = ["f1c4", "b8c6", "d1h5", "g8f6", "h5f7"];
    pub const KNIGHT_SHUFFLE: [&str; 4] = ["g1f3", "g8f6", "f3g1", "f6g8"];

    fn config(depth: u32) -> GameConfig {
        GameConfig { depth, max_plies: DEFAULT_MAX_PLIES }
    }

    fn from_fen(fen: &str) -> Chess {
        fen.parse::<Fen>().unwrap().into_position(CastlingMode::Standard).unwrap()
    }

    #[test]
    fn plays_until_checkmate() {
        let opening = build_opening(&["e2e4", "e7e5"], None, DEFAULT_BOOK_DEPTH).unwrap();
        let mut engine = ScriptedEngine::new(&SCHOLARS_MATE);
        let record = run_game(&mut engine, &opening, &config(3)).unwrap();

        assert_eq!(record.termination, Termination::WhiteCheckmate);
        assert_eq!(record.result(), MatchResult::WhiteWin);
        assert_eq!(record.plies(), 7);
        assert_eq!(record.moves[..2], opening.moves[..]);
        // 各要求は開始局面からの全手順と深さを持つ
        assert_eq!(engine.requests, vec![(2, 3), (3, 3), (4, 3), (5, 3), (6, 3)]);
        assert_eq!(engine.new_games, 1);
    }

    #[test]
    fn black_mate_is_attributed_to_black() {
        let opening = build_opening::<&str>(&[], None, DEFAULT_BOOK_DEPTH).unwrap();
        let mut engine = ScriptedEngine::new(&["f2f3", "e7e5", "g2g4", "d8h4"]);
        let record = run_game(&mut engine, &opening, &config(1)).unwrap();
        assert_eq!(record.termination, Termination::BlackCheckmate);
        assert_eq!(record.result(), MatchResult::BlackWin);
    }

    #[test]
    fn fivefold_repetition_ends_the_game() {
        let opening = build_opening::<&str>(&[], None, DEFAULT_BOOK_DEPTH).unwrap();
        let mut engine = ScriptedEngine::cycling(&KNIGHT_SHUFFLE);
        let record = run_game(&mut engine, &opening, &config(1)).unwrap();
        assert_eq!(record.termination, Termination::FivefoldRepetition);
        // 初期局面が 0, 4, 8, 12, 16 ply 目に出現する
        assert_eq!(record.plies(), 16);
    }

    #[test]
    fn ply_ceiling_abandons_the_game() {
        let opening = build_opening(&["e2e4"], None, DEFAULT_BOOK_DEPTH).unwrap();
        let mut engine = ScriptedEngine::cycling(&["g8f6", "g1f3", "f6g8", "f3g1"]);
        let cfg = GameConfig { depth: 1, max_plies: 6 };
        let record = run_game(&mut engine, &opening, &cfg).unwrap();
        assert_eq!(record.termination, Termination::Abandoned);
        assert_eq!(record.result(), MatchResult::Unterminated);
        assert_eq!(record.plies(), 6);
    }

    #[test]
    fn terminal_opening_does_not_query_engine() {
        // 最短ステイルメイト
        let stalemate = [
            "e2e3", "a7a5", "d1h5", "a8a6", "h5a5", "h7h5", "h2h4", "a6h6", "a5c7", "f7f6",
            "c7d7", "e8f7", "d7b7", "d8d3", "b7b8", "d3h7", "b8c8", "f7g6", "c8e6",
        ];
        let opening = build_opening(&stalemate, None, DEFAULT_BOOK_DEPTH).unwrap();
        let mut engine = ScriptedEngine::new(&[]);
        let record = run_game(&mut engine, &opening, &config(1)).unwrap();
        assert_eq!(record.termination, Termination::Stalemate);
        assert!(engine.requests.is_empty());
    }

    #[test]
    fn illegal_or_missing_bestmove_is_an_error() {
        let opening = build_opening::<&str>(&[], None, DEFAULT_BOOK_DEPTH).unwrap();
        let mut engine = ScriptedEngine::new(&["e2e5"]);
        let err = run_game(&mut engine, &opening, &config(1)).unwrap_err();
        assert!(err.to_string().contains("illegal move 'e2e5'"));

        let mut engine = ScriptedEngine::new(&[]);
        let err = run_game(&mut engine, &opening, &config(1)).unwrap_err();
        assert!(err.to_string().contains("no move"));
    }

    #[test]
    fn terminal_state_classifies_draw_rules() {
        let bare_kings = from_fen("8/8/8/4k3/8/8/4K3/8 w - - 0 1");
        assert_eq!(terminal_state(&bare_kings, 1), Some(Termination::InsufficientMaterial));

        let quiet = from_fen("8/8/8/4k3/8/8/3QK3/8 w - - 149 120");
        assert_eq!(terminal_state(&quiet, 1), None);
        assert_eq!(terminal_state(&quiet, 5), Some(Termination::FivefoldRepetition));

        let seventy_five = from_fen("8/8/8/4k3/8/8/3QK3/8 w - - 150 120");
        assert_eq!(terminal_state(&seventy_five, 1), Some(Termination::SeventyFiveMoves));

        // 150 ply 目でも詰みは詰みが優先
        let mated = from_fen("7k/6Q1/6K1/8/8/8/8/8 b - - 150 120");
        assert_eq!(terminal_state(&mated, 1), Some(Termination::WhiteCheckmate));
    }
}
