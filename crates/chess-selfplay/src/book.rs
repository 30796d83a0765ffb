//! Polyglot 形式の定跡ファイル読み込み
//!
//! 1レコード16バイト (big-endian):
//!
//! | offset | 型  | 内容 |
//! |--------|-----|------|
//! | 0      | u64 | 局面の Polyglot Zobrist キー |
//! | 8      | u16 | 指し手 |
//! | 10     | u16 | 重み |
//! | 12     | u32 | learn（未使用） |
//!
//! 読み込み時にキーで安定ソートし、二分探索で引く。重み 0 のレコードは指さない。

use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use log::warn;
use shakmaty::uci::UciMove;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position, Role, Square};

pub const ENTRY_SIZE: usize = 16;

#[derive(thiserror::Error, Debug)]
pub enum BookError {
    #[error("failed to read opening book {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("opening book length {len} is not a multiple of 16")]
    Truncated { len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookEntry {
    pub key: u64,
    pub raw_move: u16,
    pub weight: u16,
    pub learn: u32,
}

impl BookEntry {
    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            key: BigEndian::read_u64(&buf[0..8]),
            raw_move: BigEndian::read_u16(&buf[8..10]),
            weight: BigEndian::read_u16(&buf[10..12]),
            learn: BigEndian::read_u32(&buf[12..16]),
        }
    }

    pub fn to_bytes(self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        BigEndian::write_u64(&mut buf[0..8], self.key);
        BigEndian::write_u16(&mut buf[8..10], self.raw_move);
        BigEndian::write_u16(&mut buf[10..12], self.weight);
        BigEndian::write_u32(&mut buf[12..16], self.learn);
        buf
    }

    /// 生の指し手を UCI 表記に戻す。キャスリングは「キングがルークを取る」形のまま。
    pub fn uci(self) -> Option<UciMove> {
        let to = Square::new(u32::from(self.raw_move & 0x3f));
        let from = Square::new(u32::from((self.raw_move >> 6) & 0x3f));
        let promotion = match (self.raw_move >> 12) & 0x7 {
            0 => None,
            1 => Some(Role::Knight),
            2 => Some(Role::Bishop),
            3 => Some(Role::Rook),
            4 => Some(Role::Queen),
            _ => return None,
        };
        Some(UciMove::Normal { from, to, promotion })
    }

    /// 局面に対する合法手へ変換する。合法でなければ `None`。
    pub fn to_move(self, pos: &Chess) -> Option<Move> {
        let uci = self.uci()?;
        // Polyglot のキャスリング表記は Chess960 の UCI 表記と一致する
        pos.legal_moves().into_iter().find(|m| m.to_uci(CastlingMode::Chess960) == uci)
    }
}

/// 局面の Polyglot キー。
pub fn polyglot_key(pos: &Chess) -> u64 {
    pos.zobrist_hash::<Zobrist64>(EnPassantMode::Legal).0
}

#[derive(Debug, Clone, Default)]
pub struct PolyglotBook {
    entries: Vec<BookEntry>,
}

impl PolyglotBook {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BookError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| BookError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BookError> {
        if bytes.len() % ENTRY_SIZE != 0 {
            return Err(BookError::Truncated { len: bytes.len() });
        }
        let mut entries: Vec<BookEntry> =
            bytes.chunks_exact(ENTRY_SIZE).map(BookEntry::from_bytes).collect();
        // 同一キー内のファイル順は保つ（安定ソート）
        entries.sort_by_key(|e| e.key);
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 局面に一致するレコードをファイル順で返す。
    pub fn entries(&self, pos: &Chess) -> &[BookEntry] {
        let key = polyglot_key(pos);
        let start = self.entries.partition_point(|e| e.key < key);
        let end = start + self.entries[start..].partition_point(|e| e.key == key);
        &self.entries[start..end]
    }

    /// 局面で最初に見つかった合法な定跡手。重み 0 のエントリは使わない。
    pub fn first_move(&self, pos: &Chess) -> Option<Move> {
        for entry in self.entries(pos) {
            if entry.weight == 0 {
                continue;
            }
            match entry.to_move(pos) {
                Some(m) => return Some(m),
                None => warn!(
                    "skipping illegal book move {:#06x} for key {:016x}",
                    entry.raw_move, entry.key
                ),
            }
        }
        None
    }
}

/// 指し手を Polyglot の16bit 表記にする。テスト用の定跡ファイル生成に使う。
pub fn encode_move(uci: &UciMove) -> Option<u16> {
    let UciMove::Normal { from, to, promotion } = uci else {
        return None;
    };
    let promo = match promotion {
        None => 0,
        Some(Role::Knight) => 1,
        Some(Role::Bishop) => 2,
        Some(Role::Rook) => 3,
        Some(Role::Queen) => 4,
        Some(_) => return None,
    };
    Some((promo << 12) | ((u32::from(*from) as u16) << 6) | u32::from(*to) as u16)
}
