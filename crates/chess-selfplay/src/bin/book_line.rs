use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use chess_selfplay::book::PolyglotBook;
use chess_selfplay::selfplay::build_opening;
use chess_selfplay::selfplay::position::DEFAULT_BOOK_DEPTH;

/// 開始手順を Polyglot 定跡で延長した手順を1行で表示する。
///
/// `cargo run -p chess-selfplay --bin book_line -- --book books/elo-2700.bin c2c4`
#[derive(Parser, Debug)]
#[command(about = "print the book continuation of a start line")]
struct Cli {
    /// Polyglot opening book
    #[arg(long)]
    book: PathBuf,

    /// Maximum length of the printed line in plies
    #[arg(long, default_value_t = DEFAULT_BOOK_DEPTH)]
    depth: usize,

    /// Starting moves in UCI notation
    moves: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let book = PolyglotBook::open(&cli.book)?;
    let line = build_opening(cli.moves.as_slice(), Some(&book), cli.depth)?;
    println!("{}", line.to_uci_string());
    Ok(())
}
