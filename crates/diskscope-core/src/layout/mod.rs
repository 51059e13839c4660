/// Squarified treemap layout (Bruls, Huizing, van Wijk).
///
/// Pure geometry: given a focus directory and an integer rectangle, the
/// engine partitions the rectangle into blocks proportional to child
/// sizes. It never renders anything.
///
/// Display constraints shape the result:
/// - every squarified block is at least [`MIN_BLOCK_WIDTH`] ×
///   [`MIN_BLOCK_HEIGHT`] cells, retried with fewer visible children
///   until that holds; only the single-block fallback in rectangles
///   shorter than two minimum rows may dip under the height minimum;
/// - at most [`MAX_VISIBLE_ITEMS`] children are shown; when two or more
///   stay hidden they collapse into one aggregate "N more" strip along
///   the bottom edge (an aggregate is never emitted for a single hidden
///   child, and is never suppressed for two or more);
/// - float rectangles rasterize with shared-edge-consistent rounding so
///   adjacent blocks meet without visible seams.
use crate::model::{FsTree, NodeId};

/// Most children shown before the remainder is grouped.
pub const MAX_VISIBLE_ITEMS: usize = 15;

/// Narrowest usable block — fits a short label.
pub const MIN_BLOCK_WIDTH: i32 = 8;

/// Shortest usable block — border plus one text row.
pub const MIN_BLOCK_HEIGHT: i32 = 3;

/// What a layout block stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Node(NodeId),
    /// Aggregate of the hidden tail: `count` children totalling `bytes`.
    More { count: usize, bytes: u64 },
}

/// An axis-aligned block in integer cell coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

#[derive(Debug, Clone, Copy, Default)]
struct RectF {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

/// Lay out the children of `focus` into a `width` × `height` rectangle.
///
/// Children are taken in canonical order (size descending, name
/// ascending). A non-directory focus, or an empty directory, yields a
/// single block covering the rectangle. A rectangle below the minimum
/// block size yields nothing.
pub fn layout(tree: &FsTree, focus: NodeId, width: i32, height: i32) -> Vec<Block> {
    if width < MIN_BLOCK_WIDTH || height < MIN_BLOCK_HEIGHT {
        return Vec::new();
    }

    let children = if tree.node(focus).is_dir {
        tree.sorted_children(focus)
    } else {
        Vec::new()
    };
    if children.is_empty() {
        return vec![Block {
            kind: BlockKind::Node(focus),
            x: 0,
            y: 0,
            w: width,
            h: height,
        }];
    }

    // Zero-size entries keep a token weight so proportions survive.
    let weights: Vec<f64> = children
        .iter()
        .map(|&c| tree.node(c).size.max(1) as f64)
        .collect();
    let n = children.len();

    // The strip is reserved purely by hidden count, even when the
    // remaining main area gets shorter than a minimum block: hiding two
    // or more children without a marker is the worse failure.
    let mut k = n.min(MAX_VISIBLE_ITEMS);
    while k >= 2 {
        let strip = n - k >= 2;
        let main_count = if strip { k - 1 } else { k };
        let main_h = if strip { height - MIN_BLOCK_HEIGHT } else { height };

        if let Some(cells) = fit_main_blocks(&weights[..main_count], width, main_h) {
            return assemble(tree, &children, cells, strip, width, height);
        }
        k -= 1;
    }

    // Not even two blocks fit: the largest child fills the visible area,
    // with the aggregate strip when at least two children stay hidden.
    // With the strip in place the lone main block may fall under the
    // height minimum; when no main row is left at all, the aggregate
    // covers the whole rectangle.
    let strip = n >= 3;
    let main_h = if strip { height - MIN_BLOCK_HEIGHT } else { height };
    let cells = if main_h >= 1 {
        vec![(0, 0, width, main_h)]
    } else {
        Vec::new()
    };
    assemble(tree, &children, cells, strip, width, height)
}

/// Squarify `weights` into the rectangle and rasterize; `None` when any
/// resulting block falls below the minimum dimensions.
fn fit_main_blocks(weights: &[f64], width: i32, height: i32) -> Option<Vec<(i32, i32, i32, i32)>> {
    let cells = squarify(weights, width as f64, height as f64);
    let mut out = Vec::with_capacity(cells.len());
    for cell in cells {
        // Shared-edge rule: floor on both sides of vertical edges, floor
        // start / round end on horizontal ones (prevents row gaps). The
        // epsilon absorbs accumulated float error at the far edges.
        let x = (cell.x + 1e-6).floor() as i32;
        let y = (cell.y + 1e-6).floor() as i32;
        let end_x = (cell.x + cell.w + 1e-6).floor() as i32;
        let end_y = (cell.y + cell.h).round() as i32;
        let w = end_x.min(width) - x;
        let h = end_y.min(height) - y;
        if w < MIN_BLOCK_WIDTH || h < MIN_BLOCK_HEIGHT {
            return None;
        }
        out.push((x, y, w, h));
    }
    Some(out)
}

/// Pair the rasterized cells with the leading children and append the
/// aggregate strip, snapped to the lowest main-block edge so no gap opens
/// above it.
fn assemble(
    tree: &FsTree,
    children: &[NodeId],
    cells: Vec<(i32, i32, i32, i32)>,
    strip: bool,
    width: i32,
    height: i32,
) -> Vec<Block> {
    let main_count = cells.len();
    let mut blocks: Vec<Block> = children
        .iter()
        .take(main_count)
        .zip(cells)
        .map(|(&child, (x, y, w, h))| Block {
            kind: BlockKind::Node(child),
            x,
            y,
            w,
            h,
        })
        .collect();

    if strip {
        let hidden = &children[main_count..];
        let bytes: u64 = hidden.iter().map(|&c| tree.node(c).size).sum();
        let top = blocks
            .iter()
            .map(|b| b.y + b.h)
            .max()
            .unwrap_or(0)
            .min(height - 1);
        blocks.push(Block {
            kind: BlockKind::More {
                count: hidden.len(),
                bytes,
            },
            x: 0,
            y: top,
            w: width,
            h: (height - top).max(1),
        });
    }
    blocks
}

/// Classic squarified partition of `width` × `height` among `weights`.
///
/// Greedy row building: items join the current row while the worst aspect
/// ratio in the row does not degrade, then the row is frozen along the
/// shorter side of the remaining rectangle.
fn squarify(weights: &[f64], width: f64, height: f64) -> Vec<RectF> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return vec![RectF::default(); weights.len()];
    }
    let scale = width * height / total;
    let areas: Vec<f64> = weights.iter().map(|w| w * scale).collect();

    let mut out = vec![RectF::default(); areas.len()];
    let mut rem = RectF {
        x: 0.0,
        y: 0.0,
        w: width,
        h: height,
    };

    let mut i = 0;
    while i < areas.len() {
        if rem.w <= 0.0 || rem.h <= 0.0 {
            break;
        }
        let vertical = rem.w >= rem.h;
        let side = if vertical { rem.h } else { rem.w };

        let mut row_end = i + 1;
        let mut row_area = areas[i];
        let mut best = worst_ratio(&areas[i..row_end], side, row_area);
        while row_end < areas.len() {
            let candidate_area = row_area + areas[row_end];
            let ratio = worst_ratio(&areas[i..=row_end], side, candidate_area);
            if ratio <= best {
                row_area = candidate_area;
                best = ratio;
                row_end += 1;
            } else {
                break;
            }
        }

        let remaining_total: f64 = areas[i..].iter().sum();
        let fraction = if remaining_total > 0.0 {
            row_area / remaining_total
        } else {
            1.0
        };

        if vertical {
            let row_w = rem.w * fraction;
            let mut offset = 0.0;
            for j in i..row_end {
                let cell_h = if row_area > 0.0 {
                    rem.h * areas[j] / row_area
                } else {
                    0.0
                };
                out[j] = RectF {
                    x: rem.x,
                    y: rem.y + offset,
                    w: row_w,
                    h: cell_h,
                };
                offset += cell_h;
            }
            rem.x += row_w;
            rem.w -= row_w;
        } else {
            let row_h = rem.h * fraction;
            let mut offset = 0.0;
            for j in i..row_end {
                let cell_w = if row_area > 0.0 {
                    rem.w * areas[j] / row_area
                } else {
                    0.0
                };
                out[j] = RectF {
                    x: rem.x + offset,
                    y: rem.y,
                    w: cell_w,
                    h: row_h,
                };
                offset += cell_w;
            }
            rem.y += row_h;
            rem.h -= row_h;
        }
        i = row_end;
    }
    out
}

/// Worst (highest) aspect ratio a row would have at the given total area.
fn worst_ratio(areas: &[f64], side: f64, total: f64) -> f64 {
    if side <= 0.0 || total <= 0.0 {
        return f64::MAX;
    }
    let other = total / side;
    let mut worst = 0.0_f64;
    for &area in areas {
        let dim = area / other;
        let ratio = if dim > other {
            dim / other
        } else if dim > 0.0 {
            other / dim
        } else {
            f64::MAX
        };
        worst = worst.max(ratio);
    }
    worst
}
