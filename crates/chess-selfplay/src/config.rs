//! バッチ自己対局の設定
//!
//! TOML ファイルから読み込み、CLI 引数で上書きする。未指定の項目は既定値。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::selfplay::engine::EngineConfig;
use crate::selfplay::game::DEFAULT_MAX_PLIES;
use crate::selfplay::position::{DEFAULT_BOOK_DEPTH, replay};

/// 既定の開始手順カタログ
pub const DEFAULT_OPENINGS: [&[&str]; 7] = [
    &["e2e4", "e7e5"],
    &["e2e4", "c7c5"],
    &["d2d4", "g8f6"],
    &["d2d4", "d7d5"],
    &["g1f3"],
    &["c2c4"],
    &["f2f3"],
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// UCI エンジンの実行ファイル
    pub engine_path: PathBuf,
    /// エンジンに渡す追加の引数
    pub engine_args: Vec<String>,
    /// Polyglot 定跡ファイル（未指定なら book 有り構成でも延長しない）
    pub book_path: Option<PathBuf>,
    /// Syzygy 終盤テーブルのディレクトリ
    pub syzygy_path: Option<PathBuf>,
    pub threads: usize,
    /// Hash サイズ (MiB)
    pub hash_mb: u32,
    /// 追加の UCI オプション ("Name=Value")
    pub engine_options: Vec<String>,
    pub openings: Vec<Vec<String>>,
    pub depths: Vec<u32>,
    /// 1構成あたりの対局数
    pub games: u32,
    pub book_depth: usize,
    pub max_plies: usize,
    pub output_root: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::new(),
            engine_args: Vec::new(),
            book_path: None,
            syzygy_path: None,
            threads: 6,
            hash_mb: 4096,
            engine_options: Vec::new(),
            openings: DEFAULT_OPENINGS
                .iter()
                .map(|line| line.iter().map(|m| m.to_string()).collect())
                .collect(),
            depths: vec![20],
            games: 2,
            book_depth: DEFAULT_BOOK_DEPTH,
            max_plies: DEFAULT_MAX_PLIES,
            output_root: PathBuf::from("output"),
        }
    }
}

impl BatchConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("failed to parse batch config")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine_path.as_os_str().is_empty() {
            bail!("engine_path is not set");
        }
        if self.depths.is_empty() {
            bail!("depths must not be empty");
        }
        if self.depths.contains(&0) {
            bail!("depths must be positive");
        }
        if self.games == 0 {
            bail!("games must be positive");
        }
        if self.openings.is_empty() {
            bail!("openings must not be empty");
        }
        let mut seen_depths = HashSet::new();
        if let Some(depth) = self.depths.iter().find(|d| !seen_depths.insert(**d)) {
            bail!("depth {} is listed more than once", depth);
        }
        // 出力ディレクトリ名になるので、作る前に全手順を検証する
        let mut seen_lines = HashSet::new();
        for (i, line) in self.openings.iter().enumerate() {
            if line.is_empty() {
                bail!("openings[{}] is empty", i);
            }
            replay(line.as_slice()).map_err(|e| anyhow!("openings[{}]: {}", i, e))?;
            if !seen_lines.insert(line) {
                bail!("openings[{}] ({}) is listed more than once", i, line.join(" "));
            }
        }
        if self.max_plies == 0 {
            bail!("max_plies must be positive");
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            path: self.engine_path.clone(),
            args: self.engine_args.clone(),
            threads: self.threads,
            hash_mb: self.hash_mb,
            syzygy_path: self.syzygy_path.clone(),
            uci_options: self.engine_options.clone(),
        }
    }
}
