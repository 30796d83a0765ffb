//! UCI チェスエンジンの自己対局バッチ
//!
//! 開始手順（必要なら Polyglot 定跡で延長）から同じエンジン同士で指させ、
//! 終局分類・盤面図・棋譜のログと最終局面の PNG、構成ごとの勝敗集計を書き出す。
//!
//! ```bash
//! cargo run -p chess-selfplay --release --bin selfplay_batch -- \
//!   --config selfplay.toml --engine /usr/local/bin/stockfish --depth 12 --games 4
//! ```

pub mod book;
pub mod config;
pub mod selfplay;
