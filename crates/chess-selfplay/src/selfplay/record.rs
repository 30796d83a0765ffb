use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use shakmaty::Color;

use super::game::GameRecord;
use super::position::describe_position;
use super::render::{render_board, save_png};
use super::types::side_label;

/// `stem` に拡張子を付け足す（`stem` 自体の `.` は拡張子扱いしない）。
pub fn artifact_path(stem: &Path, ext: &str) -> PathBuf {
    let mut s = OsString::from(stem.as_os_str());
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// 棋譜ログの本文。
///
/// 1行目が終局分類、空行を挟んで盤面図、空行を挟んで `White: e2e4` 形式の指し手。
pub fn format_game_log(record: &GameRecord) -> String {
    let mut out = String::new();
    out.push_str(record.termination.label());
    out.push_str("\n\n");
    out.push_str(&describe_position(&record.position));
    out.push_str("\n\n");
    for (i, mv) in record.moves.iter().enumerate() {
        let side = if i % 2 == 0 { Color::White } else { Color::Black };
        out.push_str(&format!("{}: {}\n", side_label(side), mv));
    }
    out
}

/// `<stem>.log` と `<stem>.png` を書き出す。書き込み失敗はそのまま返す。
pub fn save_match(stem: &Path, record: &GameRecord) -> Result<()> {
    let log_path = artifact_path(stem, "log");
    let file = File::create(&log_path)
        .with_context(|| format!("failed to create {}", log_path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(format_game_log(record).as_bytes())?;
    writer.flush()?;

    let img = render_board(&record.position, record.moves.last());
    save_png(&img, &artifact_path(stem, "png"))
}
