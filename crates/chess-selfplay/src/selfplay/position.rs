use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, File, Position, Rank, Square};

use crate::book::PolyglotBook;

/// 定跡で延長するときの最大手数（ply）。
pub const DEFAULT_BOOK_DEPTH: usize = 22;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum OpeningError {
    /// UCI 表記として読めない、またはその局面で非合法
    #[error("invalid move #{index} '{mv}' in opening line")]
    InvalidMove { index: usize, mv: String },
}

/// 対局前に確定する開始手順。以後は読み取り専用。
#[derive(Debug, Clone)]
pub struct OpeningLine {
    pub position: Chess,
    pub moves: Vec<UciMove>,
    /// `moves` のうち定跡から取った手数
    pub book_plies: usize,
}

impl OpeningLine {
    pub fn to_uci_string(&self) -> String {
        self.moves.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(" ")
    }
}

/// 出力ディレクトリ名などに使う開始手順ラベル (`e2e4_e7e5`)。
pub fn line_label<S: AsRef<str>>(moves: &[S]) -> String {
    moves.iter().map(|m| m.as_ref()).collect::<Vec<_>>().join("_")
}

pub fn parse_move(pos: &Chess, index: usize, mv: &str) -> Result<shakmaty::Move, OpeningError> {
    let invalid = || OpeningError::InvalidMove { index, mv: mv.to_string() };
    let uci = UciMove::from_ascii(mv.as_bytes()).map_err(|_| invalid())?;
    uci.to_move(pos).map_err(|_| invalid())
}

/// 初期局面から手順を並べ直した局面を返す。
pub fn replay<S: AsRef<str>>(moves: &[S]) -> Result<Chess, OpeningError> {
    let mut pos = Chess::default();
    for (index, mv) in moves.iter().enumerate() {
        let m = parse_move(&pos, index, mv.as_ref())?;
        pos.play_unchecked(&m);
    }
    Ok(pos)
}

/// 開始手順を組み立てる。
///
/// `starting_moves` を順に指した後、`book` があれば定跡の先頭エントリを
/// 手順が `book_depth` に達するか定跡が尽きるまで追加する。乱択はしない。
pub fn build_opening<S: AsRef<str>>(
    starting_moves: &[S],
    book: Option<&PolyglotBook>,
    book_depth: usize,
) -> Result<OpeningLine, OpeningError> {
    let mut pos = Chess::default();
    let mut moves = Vec::with_capacity(starting_moves.len().max(book_depth));
    for (index, mv) in starting_moves.iter().enumerate() {
        let m = parse_move(&pos, index, mv.as_ref())?;
        moves.push(m.to_uci(CastlingMode::Standard));
        pos.play_unchecked(&m);
    }

    let mut book_plies = 0;
    if let Some(book) = book {
        while moves.len() < book_depth {
            let Some(m) = book.first_move(&pos) else {
                break;
            };
            moves.push(m.to_uci(CastlingMode::Standard));
            pos.play_unchecked(&m);
            book_plies += 1;
        }
    }

    Ok(OpeningLine { position: pos, moves, book_plies })
}

/// 局面のテキスト図。8段目から順に、駒は FEN の文字、空きは `.`。
pub fn describe_position(pos: &Chess) -> String {
    let board = pos.board();
    let mut rows = Vec::with_capacity(8);
    for rank in (0..8u32).rev() {
        let row: Vec<String> = (0..8u32)
            .map(|file| {
                let sq = Square::from_coords(File::new(file), Rank::new(rank));
                board.piece_at(sq).map_or('.', |p| p.char()).to_string()
            })
            .collect();
        rows.push(row.join(" "));
    }
    rows.join("\n")
}
