use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use chess_selfplay::config::BatchConfig;
use chess_selfplay::selfplay::run_batch;

/// UCI エンジン同士の自己対局バッチ。開始手順 × 探索深さ × 定跡有無 を総当たりで指す。
///
/// # よく使うコマンド例
///
/// - 設定ファイルのみ:
///   `cargo run -p chess-selfplay --release --bin selfplay_batch -- --config selfplay.toml`
///
/// - 既定の7開始手順を深さ 12 で4局ずつ、定跡と終盤テーブル付き:
///   `cargo run -p chess-selfplay --release --bin selfplay_batch -- --engine /usr/local/bin/stockfish --book books/elo-2700.bin --syzygy /data/syzygy --depth 12 --games 4`
///
/// - 開始手順を指定（`--opening` を繰り返す、手はスペース区切り）:
///   `cargo run -p chess-selfplay --release --bin selfplay_batch -- --engine stockfish --opening "e2e4 e7e5" --opening "c2c4" --depth 8 --depth 16`
///
/// 出力先（既定 `output/`）は実行のたびに削除して作り直す。
#[derive(Parser, Debug)]
#[command(author, version, about = "UCI chess engine self-play batch runner")]
struct Cli {
    /// TOML config file (CLI options override its values)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the UCI engine binary
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Extra arguments passed to the engine process
    #[arg(long, num_args = 1..)]
    engine_args: Option<Vec<String>>,

    /// Polyglot opening book
    #[arg(long)]
    book: Option<PathBuf>,

    /// Syzygy tablebase directory (SyzygyPath option)
    #[arg(long)]
    syzygy: Option<PathBuf>,

    /// Threads option
    #[arg(long)]
    threads: Option<usize>,

    /// Hash size (MiB)
    #[arg(long)]
    hash_mb: Option<u32>,

    /// UCI options to set (format: "Name=Value", can be specified multiple times)
    #[arg(long = "uci-option", num_args = 1..)]
    uci_options: Option<Vec<String>>,

    /// Start line as space separated UCI moves (repeatable, replaces the catalogue)
    #[arg(long = "opening")]
    openings: Vec<String>,

    /// Search depth (repeatable, replaces the configured list)
    #[arg(long = "depth")]
    depths: Vec<u32>,

    /// Games per configuration
    #[arg(long)]
    games: Option<u32>,

    /// Maximum plies taken from the opening book
    #[arg(long)]
    book_depth: Option<usize>,

    /// Maximum plies per game before it is abandoned
    #[arg(long)]
    max_plies: Option<usize>,

    /// Output directory (cleared on start)
    #[arg(long)]
    out: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<BatchConfig> {
        let mut cfg = match &self.config {
            Some(path) => BatchConfig::load(path)?,
            None => BatchConfig::default(),
        };
        if let Some(v) = self.engine {
            cfg.engine_path = v;
        }
        if let Some(v) = self.engine_args {
            cfg.engine_args = v;
        }
        if let Some(v) = self.book {
            cfg.book_path = Some(v);
        }
        if let Some(v) = self.syzygy {
            cfg.syzygy_path = Some(v);
        }
        if let Some(v) = self.threads {
            cfg.threads = v;
        }
        if let Some(v) = self.hash_mb {
            cfg.hash_mb = v;
        }
        if let Some(v) = self.uci_options {
            cfg.engine_options = v;
        }
        if !self.openings.is_empty() {
            cfg.openings = self
                .openings
                .iter()
                .map(|line| line.split_whitespace().map(str::to_string).collect())
                .collect();
        }
        if !self.depths.is_empty() {
            cfg.depths = self.depths;
        }
        if let Some(v) = self.games {
            cfg.games = v;
        }
        if let Some(v) = self.book_depth {
            cfg.book_depth = v;
        }
        if let Some(v) = self.max_plies {
            cfg.max_plies = v;
        }
        if let Some(v) = self.out {
            cfg.output_root = v;
        }
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cfg = Cli::parse().into_config()?;
    let results = run_batch(&cfg)?;

    let games: u32 = results.iter().map(|r| r.tally.total()).sum();
    info!(
        "finished {} configurations ({} games), output in {}",
        results.len(),
        games,
        cfg.output_root.display()
    );
    Ok(())
}
