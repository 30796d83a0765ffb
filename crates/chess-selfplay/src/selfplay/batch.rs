//! 開始手順 × 探索深さ × 定跡有無 の総当たり自己対局。
//!
//! 出力:
//! - `<root>/<depth>/<line>/{book_,}game_<n>.{log,png}`
//! - `<root>/log.txt` 1局ごとの累計
//! - `<root>/summary.txt` 構成ごとの集計
//! - `<root>/results.jsonl` 1局ごとの JSON レコード

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Local;
use log::{info, warn};
use serde::Serialize;

use super::engine::{Engine, EngineProcess};
use super::game::{GameConfig, GameRecord, run_game};
use super::position::{build_opening, line_label};
use super::record::save_match;
use super::types::{EvalLog, Tally, Termination, duration_to_millis};
use crate::book::PolyglotBook;
use crate::config::BatchConfig;

pub const LOG_FILE: &str = "log.txt";
pub const SUMMARY_FILE: &str = "summary.txt";
pub const RESULTS_FILE: &str = "results.jsonl";

/// 1構成分の実行単位。
#[derive(Debug, Clone, Copy)]
pub struct RunSpec<'a> {
    pub opening: &'a [String],
    pub depth: u32,
    pub use_book: bool,
    pub games: u32,
}

/// 構成ごとの最終集計。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationResult {
    pub depth: u32,
    pub line: String,
    pub use_book: bool,
    pub tally: Tally,
}

#[derive(Serialize)]
struct MatchRecord<'a> {
    timestamp: String,
    depth: u32,
    opening: &'a str,
    use_book: bool,
    game: u32,
    start_line: String,
    book_plies: usize,
    result: &'static str,
    termination: Termination,
    plies: usize,
    elapsed_ms: u64,
    moves: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_eval: Option<&'a EvalLog>,
}

/// log / summary / results の3ファイル。1行ごとに flush する。
pub struct BatchOutput {
    log: BufWriter<File>,
    summary: BufWriter<File>,
    results: BufWriter<File>,
}

impl BatchOutput {
    pub fn create(root: &Path) -> Result<Self> {
        let open = |name: &str| -> Result<BufWriter<File>> {
            let path = root.join(name);
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(BufWriter::new(file))
        };
        Ok(Self { log: open(LOG_FILE)?, summary: open(SUMMARY_FILE)?, results: open(RESULTS_FILE)? })
    }

    fn log_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.log, "{}", line)?;
        self.log.flush()?;
        Ok(())
    }

    fn summary_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.summary, "{}", line)?;
        self.summary.flush()?;
        Ok(())
    }

    fn result_record(&mut self, record: &MatchRecord<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.results, record)?;
        self.results.write_all(b"\n")?;
        self.results.flush()?;
        Ok(())
    }

    fn separator(&mut self) -> Result<()> {
        self.log_line("")?;
        self.summary_line("")
    }
}

pub fn configuration_dir(root: &Path, depth: u32, label: &str) -> PathBuf {
    root.join(depth.to_string()).join(label)
}

pub fn game_stem(dir: &Path, use_book: bool, game: u32) -> PathBuf {
    let prefix = if use_book { "book_" } else { "" };
    dir.join(format!("{}game_{}", prefix, game))
}

/// 出力ディレクトリを作り直す。既存の内容はすべて消える。
pub fn setup_output(root: &Path, depths: &[u32], openings: &[Vec<String>]) -> Result<()> {
    if root.is_dir() {
        fs::remove_dir_all(root)
            .with_context(|| format!("failed to clear output directory {}", root.display()))?;
    }
    fs::create_dir_all(root)
        .with_context(|| format!("failed to create output directory {}", root.display()))?;
    for &depth in depths {
        for opening in openings {
            let dir = configuration_dir(root, depth, &line_label(opening.as_slice()));
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
    }
    Ok(())
}

pub fn format_match_line(
    use_book: bool,
    depth: u32,
    label: &str,
    game: u32,
    tally: &Tally,
    plies: usize,
    seconds: f64,
) -> String {
    format!(
        "Book: {:5} Depth: {} {}  Match: {:>3}    W:{:>3}  D:{:>3}  B:{:>3}  U:{:>3}  {:>3} moves {:.4} seconds",
        use_book,
        depth,
        label,
        game,
        tally.white,
        tally.draw,
        tally.black,
        tally.unterminated,
        plies,
        seconds
    )
}

pub fn format_summary_line(use_book: bool, depth: u32, label: &str, tally: &Tally) -> String {
    format!(
        "Book: {:5} Depth: {} {}  W:{:>3}  D:{:>3}  B:{:>3}  U:{:>3}",
        use_book, depth, label, tally.white, tally.draw, tally.black, tally.unterminated
    )
}

/// 1構成分（同じ開始手順で `games` 局）を実行する。
pub fn play_configuration(
    engine: &mut dyn Engine,
    book: Option<&PolyglotBook>,
    cfg: &BatchConfig,
    run: &RunSpec<'_>,
    out: &mut BatchOutput,
) -> Result<Tally> {
    let label = line_label(run.opening);
    let dir = configuration_dir(&cfg.output_root, run.depth, &label);
    let opening = build_opening(
        run.opening,
        if run.use_book { book } else { None },
        cfg.book_depth,
    )?;
    info!(
        "depth {} {} book={} start line: {} ({} book plies)",
        run.depth,
        label,
        run.use_book,
        opening.to_uci_string(),
        opening.book_plies
    );

    let game_cfg = GameConfig { depth: run.depth, max_plies: cfg.max_plies };
    let mut tally = Tally::default();
    for game in 1..=run.games {
        let start = Instant::now();
        let record: GameRecord = run_game(engine, &opening, &game_cfg)?;
        tally.record(record.result());
        save_match(&game_stem(&dir, run.use_book, game), &record)?;
        let elapsed = start.elapsed();

        let line = format_match_line(
            run.use_book,
            run.depth,
            &label,
            game,
            &tally,
            record.plies(),
            elapsed.as_secs_f64(),
        );
        info!("{}", line);
        out.log_line(&line)?;
        out.result_record(&MatchRecord {
            timestamp: Local::now().to_rfc3339(),
            depth: run.depth,
            opening: &label,
            use_book: run.use_book,
            game,
            start_line: opening.to_uci_string(),
            book_plies: opening.book_plies,
            result: record.result().label(),
            termination: record.termination,
            plies: record.plies(),
            elapsed_ms: duration_to_millis(elapsed),
            moves: record.moves.iter().map(|m| m.to_string()).collect(),
            last_eval: record.last_eval.as_ref(),
        })?;
    }

    out.summary_line(&format_summary_line(run.use_book, run.depth, &label, &tally))?;
    Ok(tally)
}

/// 起動済みのエンジンでバッチ全体を実行する。
///
/// 深さごと・開始手順ごとに「定跡あり」「定跡なし」の順で `games` 局ずつ指す。
/// 設定は出力先を作る前に検証する。途中のエラーはそのまま返し、以降の構成は実行しない。
pub fn run_batch_with(
    engine: &mut dyn Engine,
    book: Option<&PolyglotBook>,
    cfg: &BatchConfig,
) -> Result<Vec<ConfigurationResult>> {
    cfg.validate()?;
    setup_output(&cfg.output_root, &cfg.depths, &cfg.openings)?;
    let mut out = BatchOutput::create(&cfg.output_root)?;
    let mut results = Vec::with_capacity(cfg.depths.len() * cfg.openings.len() * 2);

    for &depth in &cfg.depths {
        for opening in &cfg.openings {
            for use_book in [true, false] {
                let run = RunSpec { opening: opening.as_slice(), depth, use_book, games: cfg.games };
                let tally = play_configuration(engine, book, cfg, &run, &mut out)?;
                results.push(ConfigurationResult {
                    depth,
                    line: line_label(opening.as_slice()),
                    use_book,
                    tally,
                });
            }
            out.separator()?;
        }
    }
    Ok(results)
}

/// 設定に従ってエンジンを起動し、バッチ全体を実行する。
///
/// エンジンプロセスは戻り値に関わらずこの関数を抜けるときに終了する。
pub fn run_batch(cfg: &BatchConfig) -> Result<Vec<ConfigurationResult>> {
    cfg.validate()?;
    let book = match &cfg.book_path {
        Some(path) => {
            let book = PolyglotBook::open(path)?;
            info!("opening book {} ({} entries)", path.display(), book.len());
            Some(book)
        }
        None => {
            warn!("no opening book configured; book runs use the raw start lines");
            None
        }
    };

    let mut engine = EngineProcess::spawn(&cfg.engine_config(), "engine".to_string())?;
    info!("engine {} started", cfg.engine_path.display());
    run_batch_with(&mut engine, book.as_ref(), cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::tests::{AFTER_E2E4_KEY, book_bytes, entry};
    use crate::selfplay::types::{SearchOutcome, SearchRequest};

    /// 開始局面からの手数で台本を引くエンジン。開始手順がどこまで進んでいても同じ棋譜になる。
    struct LineEngine {
        game: Vec<&'static str>,
        new_games: u32,
    }

    impl Engine for LineEngine {
        fn new_game(&mut self) -> Result<()> {
            self.new_games += 1;
            Ok(())
        }

        fn search(&mut self, req: &SearchRequest<'_>) -> Result<SearchOutcome> {
            Ok(SearchOutcome {
                bestmove: self.game.get(req.moves.len()).map(|m| m.to_string()),
                elapsed_ms: 0,
                eval: None,
            })
        }
    }

    fn scholars_mate_engine() -> LineEngine {
        LineEngine {
            game: vec!["e2e4", "e7e5", "f1c4", "b8c6", "d1h5", "g8f6", "h5f7"],
            new_games: 0,
        }
    }

    fn config(root: &Path, openings: &[&[&str]], depths: &[u32], games: u32) -> BatchConfig {
        BatchConfig {
            engine_path: PathBuf::from("unused"),
            openings: openings.iter().map(|o| o.iter().map(|m| m.to_string()).collect()).collect(),
            depths: depths.to_vec(),
            games,
            output_root: root.to_path_buf(),
            ..Default::default()
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path).unwrap().lines().map(|l| l.to_string()).collect()
    }

    #[test]
    fn single_line_batch_writes_expected_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("output");
        let cfg = config(&root, &[&["e2e4", "e7e5"]], &[1], 1);
        let mut engine = scholars_mate_engine();

        let results = run_batch_with(&mut engine, None, &cfg).unwrap();

        let game_dir = root.join("1").join("e2e4_e7e5");
        for name in ["game_1.log", "game_1.png", "book_game_1.log", "book_game_1.png"] {
            assert!(game_dir.join(name).is_file(), "{name}");
        }
        let log = read_lines(&game_dir.join("game_1.log"));
        assert_eq!(log[0], "White checkmate");

        assert_eq!(results.len(), 2);
        assert!(results[0].use_book && !results[1].use_book);
        for r in &results {
            assert_eq!(r.tally.total(), 1);
            assert_eq!(r.tally.white, 1);
        }
        assert_eq!(engine.new_games, 2);
    }

    #[test]
    fn log_and_summary_lines_track_tallies() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("output");
        let cfg = config(&root, &[&["e2e4", "e7e5"], &["e2e4"]], &[3], 2);
        let mut engine = scholars_mate_engine();
        run_batch_with(&mut engine, None, &cfg).unwrap();

        let log = read_lines(&root.join(LOG_FILE));
        // 2開始手順 × (book, no book) × 2局 + 開始手順ごとの空行
        assert_eq!(log.len(), 2 * 2 * 2 + 2);
        assert!(log[0].starts_with("Book: true  Depth: 3 e2e4_e7e5  Match:   1"));
        assert!(log[1].contains("Match:   2    W:  2  D:  0  B:  0  U:  0    7 moves"));
        assert!(log[2].starts_with("Book: false Depth: 3 e2e4_e7e5"));
        assert_eq!(log[4], "");

        let summary = read_lines(&root.join(SUMMARY_FILE));
        assert_eq!(
            summary,
            vec![
                "Book: true  Depth: 3 e2e4_e7e5  W:  2  D:  0  B:  0  U:  0",
                "Book: false Depth: 3 e2e4_e7e5  W:  2  D:  0  B:  0  U:  0",
                "",
                "Book: true  Depth: 3 e2e4  W:  2  D:  0  B:  0  U:  0",
                "Book: false Depth: 3 e2e4  W:  2  D:  0  B:  0  U:  0",
                "",
            ]
        );
    }

    #[test]
    fn logged_move_count_matches_recorded_moves() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("output");
        let cfg = config(&root, &[&["e2e4"]], &[2], 1);
        let mut engine = scholars_mate_engine();
        run_batch_with(&mut engine, None, &cfg).unwrap();

        let records = read_lines(&root.join(RESULTS_FILE));
        assert_eq!(records.len(), 2);
        let log = read_lines(&root.join(LOG_FILE));
        for (line, json) in log.iter().zip(&records) {
            let value: serde_json::Value = serde_json::from_str(json).unwrap();
            let moves = value["moves"].as_array().unwrap().len();
            assert_eq!(value["plies"].as_u64().unwrap() as usize, moves);
            assert!(line.contains(&format!("{:>3} moves", moves)), "{line}");
            assert_eq!(value["result"], "1-0");
            assert_eq!(value["termination"], "white_checkmate");
        }
    }

    #[test]
    fn book_runs_use_extended_line() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("output");
        let cfg = config(&root, &[&["e2e4"]], &[1], 1);
        let book = PolyglotBook::from_bytes(&book_bytes(&[entry(AFTER_E2E4_KEY, "e7e5", 1)]))
            .unwrap();
        let mut engine = scholars_mate_engine();
        run_batch_with(&mut engine, Some(&book), &cfg).unwrap();

        let records: Vec<serde_json::Value> = read_lines(&root.join(RESULTS_FILE))
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records[0]["use_book"], true);
        assert_eq!(records[0]["start_line"], "e2e4 e7e5");
        assert_eq!(records[0]["book_plies"], 1);
        assert_eq!(records[1]["use_book"], false);
        assert_eq!(records[1]["start_line"], "e2e4");
    }

    #[test]
    fn setup_output_clears_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("output");
        fs::create_dir_all(root.join("stale")).unwrap();
        fs::write(root.join("stale").join("old.log"), "x").unwrap();

        let openings = vec![vec!["g1f3".to_string()], vec!["c2c4".to_string()]];
        setup_output(&root, &[5, 10], &openings).unwrap();

        assert!(!root.join("stale").exists());
        for d in ["5", "10"] {
            assert!(root.join(d).join("g1f3").is_dir());
            assert!(root.join(d).join("c2c4").is_dir());
        }
    }

    #[test]
    fn engine_error_aborts_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("output");
        let cfg = config(&root, &[&["e2e4", "e7e5"], &["d2d4"]], &[1], 1);
        // 台本が途中で尽きる
        let mut engine = LineEngine { game: vec!["e2e4", "e7e5", "f1c4"], new_games: 0 };
        assert!(run_batch_with(&mut engine, None, &cfg).is_err());
        assert_eq!(engine.new_games, 1);
        assert!(read_lines(&root.join(LOG_FILE)).is_empty());
    }

    #[test]
    fn invalid_start_line_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("output");
        let cfg = config(&root, &[&["e2e5"]], &[1], 1);
        let mut engine = scholars_mate_engine();
        let err = run_batch_with(&mut engine, None, &cfg).unwrap_err();
        assert!(err.to_string().contains("e2e5"));
        assert!(!root.exists());
        assert_eq!(engine.new_games, 0);
    }

    #[test]
    fn duplicate_configurations_are_rejected_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("output");
        let mut engine = scholars_mate_engine();

        let cfg = config(&root, &[&["e2e4"], &["e2e4"]], &[1], 1);
        assert!(run_batch_with(&mut engine, None, &cfg).is_err());
        let cfg = config(&root, &[&["e2e4"]], &[1, 1], 1);
        assert!(run_batch_with(&mut engine, None, &cfg).is_err());

        assert!(!root.exists());
        assert_eq!(engine.new_games, 0);
    }

    #[test]
    fn path_like_lines_never_touch_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("output");
        let cfg = config(&root, &[&["../escaped"]], &[1], 1);
        let mut engine = scholars_mate_engine();

        assert!(run_batch_with(&mut engine, None, &cfg).is_err());
        assert!(!root.exists());
        assert!(!dir.path().join("escaped").exists());
        assert!(!dir.path().join("1").exists());
    }
}
