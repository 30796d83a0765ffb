use serde::{Deserialize, Serialize};
use shakmaty::uci::UciMove;
use shakmaty::Color;
use std::time::Duration;

#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq, Eq)]
pub struct EvalLog {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_cp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_mate: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seldepth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pv: Option<Vec<String>>,
}

#[derive(Default, Clone)]
pub struct InfoSnapshot {
    pub score_cp: Option<i32>,
    pub score_mate: Option<i32>,
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub nodes: Option<u64>,
    pub time_ms: Option<u64>,
    pub nps: Option<u64>,
    pub pv: Vec<String>,
}

impl InfoSnapshot {
    /// info 行を解析し、multipv=1 の情報を保持する。
    pub fn update_from_line(&mut self, line: &str) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first().copied() != Some("info") {
            return;
        }
        let multipv = tokens
            .windows(2)
            .find(|w| w[0] == "multipv")
            .and_then(|w| w[1].parse::<u32>().ok())
            .unwrap_or(1);
        if multipv != 1 {
            return;
        }
        let mut i = 1;
        while i < tokens.len() {
            let next = tokens.get(i + 1).copied();
            match tokens[i] {
                "depth" => {
                    self.depth = next.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "seldepth" => {
                    self.seldepth = next.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "nodes" => {
                    self.nodes = next.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "time" => {
                    self.time_ms = next.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "nps" => {
                    self.nps = next.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "score" => {
                    // lowerbound / upperbound は値の後ろに付くので読み飛ばされる
                    let value = tokens.get(i + 2).and_then(|v| v.parse::<i32>().ok());
                    match next {
                        Some("cp") => {
                            self.score_cp = value;
                            self.score_mate = None;
                            i += 2;
                        }
                        Some("mate") => {
                            self.score_mate = value;
                            self.score_cp = None;
                            i += 2;
                        }
                        _ => {}
                    }
                }
                "pv" => {
                    let pv: Vec<String> = tokens[i + 1..].iter().map(|s| s.to_string()).collect();
                    if !pv.is_empty() {
                        self.pv = pv;
                    }
                    break;
                }
                // string 以降は自由文字列
                "string" => break,
                _ => {}
            }
            i += 1;
        }
    }

    pub fn into_eval_log(self) -> Option<EvalLog> {
        if self.score_cp.is_none()
            && self.score_mate.is_none()
            && self.depth.is_none()
            && self.seldepth.is_none()
            && self.nodes.is_none()
            && self.time_ms.is_none()
            && self.nps.is_none()
            && self.pv.is_empty()
        {
            return None;
        }
        Some(EvalLog {
            score_cp: self.score_cp,
            score_mate: self.score_mate,
            depth: self.depth,
            seldepth: self.seldepth,
            nodes: self.nodes,
            time_ms: self.time_ms,
            nps: self.nps,
            pv: if self.pv.is_empty() {
                None
            } else {
                Some(self.pv)
            },
        })
    }
}

/// 1手分の探索要求。`moves` は開始局面からの全手順（`position startpos moves ...` 用）。
pub struct SearchRequest<'a> {
    pub moves: &'a [UciMove],
    pub depth: u32,
}

pub struct SearchOutcome {
    /// `bestmove (none)` / `bestmove 0000` の場合は `None`
    pub bestmove: Option<String>,
    pub elapsed_ms: u64,
    pub eval: Option<EvalLog>,
}

/// 1局の結果（PGN の result タグと同じ4値）。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    WhiteWin,
    BlackWin,
    Draw,
    Unterminated,
}

impl MatchResult {
    pub fn label(self) -> &'static str {
        match self {
            MatchResult::WhiteWin => "1-0",
            MatchResult::BlackWin => "0-1",
            MatchResult::Draw => "1/2-1/2",
            MatchResult::Unterminated => "*",
        }
    }
}

/// 終局理由。ログ先頭行の分類文字列に対応する。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// 白が詰ませた
    WhiteCheckmate,
    /// 黒が詰ませた
    BlackCheckmate,
    Stalemate,
    InsufficientMaterial,
    FivefoldRepetition,
    SeventyFiveMoves,
    OtherDraw,
    /// 最大手数に達したため打ち切り
    Abandoned,
}

impl Termination {
    pub fn label(self) -> &'static str {
        match self {
            Termination::WhiteCheckmate => "White checkmate",
            Termination::BlackCheckmate => "Black checkmate",
            Termination::Stalemate => "Draw - Stalemate",
            Termination::InsufficientMaterial => "Draw - Insufficient material",
            Termination::FivefoldRepetition => "Draw - Fivefold repetition",
            Termination::SeventyFiveMoves => "Draw - Seventyfive Moves",
            Termination::OtherDraw => "Draw - Other",
            Termination::Abandoned => "Abandoned - Ply limit",
        }
    }

    pub fn result(self) -> MatchResult {
        match self {
            Termination::WhiteCheckmate => MatchResult::WhiteWin,
            Termination::BlackCheckmate => MatchResult::BlackWin,
            Termination::Stalemate
            | Termination::InsufficientMaterial
            | Termination::FivefoldRepetition
            | Termination::SeventyFiveMoves
            | Termination::OtherDraw => MatchResult::Draw,
            Termination::Abandoned => MatchResult::Unterminated,
        }
    }

    pub const ALL: [Termination; 8] = [
        Termination::WhiteCheckmate,
        Termination::BlackCheckmate,
        Termination::Stalemate,
        Termination::InsufficientMaterial,
        Termination::FivefoldRepetition,
        Termination::SeventyFiveMoves,
        Termination::OtherDraw,
        Termination::Abandoned,
    ];
}

/// 1構成（開始手順 × 深さ × book 有無）ごとの勝敗集計。
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub white: u32,
    pub draw: u32,
    pub black: u32,
    pub unterminated: u32,
}

impl Tally {
    pub fn record(&mut self, result: MatchResult) {
        match result {
            MatchResult::WhiteWin => self.white += 1,
            MatchResult::BlackWin => self.black += 1,
            MatchResult::Draw => self.draw += 1,
            MatchResult::Unterminated => self.unterminated += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.white + self.draw + self.black + self.unterminated
    }
}

/// 手番ラベル。偶数 ply が白、奇数 ply が黒。
pub fn side_label(color: Color) -> &'static str {
    if color == Color::White {
        "White"
    } else {
        "Black"
    }
}

pub fn duration_to_millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
