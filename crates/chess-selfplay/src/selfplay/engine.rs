use std::collections::HashSet;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use log::debug;

use super::types::{InfoSnapshot, SearchOutcome, SearchRequest, duration_to_millis};

pub const ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const ENGINE_QUIT_TIMEOUT: Duration = Duration::from_millis(300);
pub const ENGINE_QUIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 対局に使う指し手供給源。実プロセスの [`EngineProcess`] の他、テストでは台本どおりに
/// 指すエンジンを差し込む。
pub trait Engine {
    fn new_game(&mut self) -> Result<()>;

    /// 指定局面の最善手を返す。
    fn search(&mut self, req: &SearchRequest<'_>) -> Result<SearchOutcome>;
}

/// エンジンプロセス起動時の設定。
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub threads: usize,
    pub hash_mb: u32,
    /// Syzygy 終盤テーブルのディレクトリ
    pub syzygy_path: Option<PathBuf>,
    /// 追加のUCIオプション (Name=Value 形式)
    pub uci_options: Vec<String>,
}

/// 1本のエンジンに対する入出力をカプセル化する。
///
/// drop 時に `quit` を送り、終了しなければ kill する。バッチがエラーで中断しても
/// プロセスは残らない。
pub struct EngineProcess {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    rx: Receiver<String>,
    opt_names: HashSet<String>,
    pub label: String,
}

impl EngineProcess {
    pub fn spawn(cfg: &EngineConfig, label: String) -> Result<Self> {
        let mut cmd = Command::new(&cfg.path);
        if !cfg.args.is_empty() {
            cmd.args(&cfg.args);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn engine at {}", cfg.path.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;
        let (tx, rx) = mpsc::channel::<String>();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let mut proc = Self {
            child,
            stdin: BufWriter::new(stdin),
            rx,
            opt_names: HashSet::new(),
            label,
        };
        proc.initialize(cfg)?;
        Ok(proc)
    }

    fn initialize(&mut self, cfg: &EngineConfig) -> Result<()> {
        self.write_line("uci")?;
        loop {
            let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
            if let Some(rest) = line.strip_prefix("option ") {
                if let Some(name) = parse_option_name(rest) {
                    self.opt_names.insert(name);
                }
            } else if line == "uciok" {
                break;
            }
        }
        if cfg.threads > 0 {
            self.set_option_if_available("Threads", &cfg.threads.to_string())?;
        }
        if cfg.hash_mb > 0 {
            self.set_option_if_available("Hash", &cfg.hash_mb.to_string())?;
        }
        if let Some(path) = &cfg.syzygy_path {
            self.set_option_if_available("SyzygyPath", &path.to_string_lossy())?;
        }
        for opt in &cfg.uci_options {
            if let Some((name, value)) = opt.split_once('=') {
                self.set_option_if_available(name.trim(), value.trim())?;
            } else {
                // "=" がない場合は button 型とみなし、値なしで送る
                self.write_line(&format!("setoption name {}", opt.trim()))?;
            }
        }
        self.sync_ready()?;
        self.write_line("ucinewgame")?;
        Ok(())
    }

    pub fn sync_ready(&mut self) -> Result<()> {
        self.write_line("isready")?;
        loop {
            let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
            if line == "readyok" {
                break;
            }
        }
        Ok(())
    }

    pub fn recv_line(&self, timeout: Duration) -> Result<String> {
        let line = self
            .rx
            .recv_timeout(timeout)
            .map_err(|_| anyhow!("{}: engine read timeout", self.label))?;
        debug!("{} > {}", self.label, line);
        Ok(line)
    }

    pub fn set_option_if_available(&mut self, name: &str, value: &str) -> Result<()> {
        if self.opt_names.is_empty() || self.opt_names.contains(name) {
            self.write_line(&format!("setoption name {} value {}", name, value))?;
        } else {
            debug!("{}: option {} not advertised, skipped", self.label, name);
        }
        Ok(())
    }

    pub fn write_line(&mut self, msg: &str) -> Result<()> {
        debug!("{} < {}", self.label, msg);
        self.stdin.write_all(msg.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }
}

impl Engine for EngineProcess {
    fn new_game(&mut self) -> Result<()> {
        self.write_line("ucinewgame")?;
        self.sync_ready()
    }

    /// 深さ制限付きで探索する。深さ制限の探索は必ず終わる前提なので待ち時間の上限は設けない。
    fn search(&mut self, req: &SearchRequest<'_>) -> Result<SearchOutcome> {
        self.write_line(&position_command(req))?;
        self.write_line(&format!("go depth {}", req.depth))?;

        let start = Instant::now();
        let mut snapshot = InfoSnapshot::default();
        loop {
            let line = match self.rx.recv() {
                Ok(line) => line,
                Err(_) => bail!("{}: engine exited unexpectedly", self.label),
            };
            if line.starts_with("info") {
                snapshot.update_from_line(&line);
                continue;
            }
            debug!("{} > {}", self.label, line);
            if let Some(bestmove) = parse_bestmove(&line) {
                return Ok(SearchOutcome {
                    bestmove,
                    elapsed_ms: duration_to_millis(start.elapsed()),
                    eval: snapshot.into_eval_log(),
                });
            }
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        let _ = self.write_line("quit");
        let deadline = Instant::now() + ENGINE_QUIT_TIMEOUT;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            std::thread::sleep(ENGINE_QUIT_POLL_INTERVAL);
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn position_command(req: &SearchRequest<'_>) -> String {
    let mut cmd = String::from("position startpos");
    if !req.moves.is_empty() {
        cmd.push_str(" moves");
        for mv in req.moves {
            cmd.push(' ');
            cmd.push_str(&mv.to_string());
        }
    }
    cmd
}

/// `bestmove` 行を解析する。`bestmove` 行でなければ `None`、指し手が無い
/// (`(none)` / `0000` / 省略) 場合は `Some(None)`。
pub fn parse_bestmove(line: &str) -> Option<Option<String>> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "bestmove" {
        return None;
    }
    match tokens.next() {
        None | Some("(none)") | Some("0000") => Some(None),
        Some(mv) => Some(Some(mv.to_string())),
    }
}

pub fn parse_option_name(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace().peekable();
    while let Some(tok) = tokens.next() {
        if tok == "name" {
            let mut parts = Vec::new();
            while let Some(next) = tokens.next_if(|t| *t != "type") {
                parts.push(next.to_string());
            }
            if !parts.is_empty() {
                return Some(parts.join(" "));
            }
        }
    }
    None
}
