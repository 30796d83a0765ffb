//! 最終局面の PNG 出力
//!
//! 白を手前にした 8x8 の盤に、12x12 のドット絵を拡大した駒を描く。
//! 直前の手は移動元・移動先のマスを色付けする。

use std::path::Path;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use shakmaty::uci::UciMove;
use shakmaty::{Chess, Color, File, Position, Rank, Role, Square};

pub const SQUARE_PX: u32 = 60;
pub const BOARD_PX: u32 = SQUARE_PX * 8;

const GLYPH_CELLS: u32 = 12;
const GLYPH_SCALE: u32 = 4;
const GLYPH_OFFSET: u32 = (SQUARE_PX - GLYPH_CELLS * GLYPH_SCALE) / 2;
const OUTLINE_PX: i32 = 2;

pub const LIGHT: Rgb<u8> = Rgb([240, 217, 181]);
pub const DARK: Rgb<u8> = Rgb([181, 136, 99]);
pub const LIGHT_HIGHLIGHT: Rgb<u8> = Rgb([205, 210, 106]);
pub const DARK_HIGHLIGHT: Rgb<u8> = Rgb([170, 162, 58]);
pub const WHITE_FILL: Rgb<u8> = Rgb([250, 250, 250]);
pub const WHITE_OUTLINE: Rgb<u8> = Rgb([20, 20, 20]);
pub const BLACK_FILL: Rgb<u8> = Rgb([35, 35, 35]);
pub const BLACK_OUTLINE: Rgb<u8> = Rgb([225, 225, 225]);

type Glyph = [&'static str; GLYPH_CELLS as usize];

const PAWN: Glyph = [
    "............",
    "............",
    ".....##.....",
    "....####....",
    "....####....",
    ".....##.....",
    "....####....",
    "...######...",
    "....####....",
    "...######...",
    "..########..",
    "..########..",
];

const KNIGHT: Glyph = [
    "............",
    ".....#.#....",
    "....#####...",
    "...#######..",
    "..###.####..",
    "..#######...",
    ".....####...",
    "....#####...",
    "...######...",
    "...######...",
    "..########..",
    "..########..",
];

const BISHOP: Glyph = [
    ".....##.....",
    "....####....",
    "...###.##...",
    "...##.###...",
    "...######...",
    "....####....",
    ".....##.....",
    "....####....",
    "...######...",
    ".....##.....",
    "..########..",
    "..########..",
];

const ROOK: Glyph = [
    "............",
    "..##.##.##..",
    "..########..",
    "...######...",
    "....####....",
    "....####....",
    "....####....",
    "....####....",
    "...######...",
    "..########..",
    "..########..",
    "............",
];

const QUEEN: Glyph = [
    ".#...##...#.",
    ".#..####..#.",
    ".##..##..##.",
    ".###.##.###.",
    ".##########.",
    "..########..",
    "...######...",
    "...######...",
    "....####....",
    "...######...",
    "..########..",
    "..########..",
];

const KING: Glyph = [
    ".....##.....",
    "....####....",
    ".....##.....",
    "..##.##.##..",
    ".##########.",
    ".##########.",
    "..########..",
    "...######...",
    "....####....",
    "...######...",
    "..########..",
    "..########..",
];

fn glyph(role: Role) -> &'static Glyph {
    match role {
        Role::Pawn => &PAWN,
        Role::Knight => &KNIGHT,
        Role::Bishop => &BISHOP,
        Role::Rook => &ROOK,
        Role::Queen => &QUEEN,
        Role::King => &KING,
    }
}

/// グリフ内のピクセル座標 (px, py) が駒の内側か。
fn covered(g: &Glyph, px: i32, py: i32) -> bool {
    let size = (GLYPH_CELLS * GLYPH_SCALE) as i32;
    if px < 0 || py < 0 || px >= size || py >= size {
        return false;
    }
    let row = g[(py as u32 / GLYPH_SCALE) as usize].as_bytes();
    row[(px as u32 / GLYPH_SCALE) as usize] == b'#'
}

fn on_outline(g: &Glyph, px: i32, py: i32) -> bool {
    (-OUTLINE_PX..=OUTLINE_PX).any(|dy| {
        (-OUTLINE_PX..=OUTLINE_PX).any(|dx| (dx != 0 || dy != 0) && covered(g, px + dx, py + dy))
    })
}

/// 画像上の左上ピクセル。白が手前なので8段目が y=0。
pub fn square_origin(sq: Square) -> (u32, u32) {
    let file = u32::from(sq.file());
    let rank = u32::from(sq.rank());
    (file * SQUARE_PX, (7 - rank) * SQUARE_PX)
}

pub fn is_dark(sq: Square) -> bool {
    (u32::from(sq.file()) + u32::from(sq.rank())) % 2 == 0
}

fn highlighted(last_move: Option<&UciMove>) -> Vec<Square> {
    match last_move {
        Some(UciMove::Normal { from, to, .. }) => vec![*from, *to],
        Some(UciMove::Put { to, .. }) => vec![*to],
        _ => Vec::new(),
    }
}

pub fn render_board(pos: &Chess, last_move: Option<&UciMove>) -> RgbImage {
    let mut img = RgbImage::new(BOARD_PX, BOARD_PX);
    let marked = highlighted(last_move);
    let board = pos.board();

    for rank in 0..8u32 {
        for file in 0..8u32 {
            let sq = Square::from_coords(File::new(file), Rank::new(rank));
            let (x0, y0) = square_origin(sq);
            let bg = match (is_dark(sq), marked.contains(&sq)) {
                (true, false) => DARK,
                (false, false) => LIGHT,
                (true, true) => DARK_HIGHLIGHT,
                (false, true) => LIGHT_HIGHLIGHT,
            };
            for y in 0..SQUARE_PX {
                for x in 0..SQUARE_PX {
                    img.put_pixel(x0 + x, y0 + y, bg);
                }
            }

            let Some(piece) = board.piece_at(sq) else {
                continue;
            };
            let (fill, outline) = match piece.color {
                Color::White => (WHITE_FILL, WHITE_OUTLINE),
                Color::Black => (BLACK_FILL, BLACK_OUTLINE),
            };
            let g = glyph(piece.role);
            let size = GLYPH_CELLS * GLYPH_SCALE;
            for py in 0..size {
                for px in 0..size {
                    let color = if covered(g, px as i32, py as i32) {
                        fill
                    } else if on_outline(g, px as i32, py as i32) {
                        outline
                    } else {
                        continue;
                    };
                    img.put_pixel(x0 + GLYPH_OFFSET + px, y0 + GLYPH_OFFSET + py, color);
                }
            }
        }
    }
    img
}

pub fn save_png(img: &RgbImage, path: &Path) -> Result<()> {
    img.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write image {}", path.display()))
}
