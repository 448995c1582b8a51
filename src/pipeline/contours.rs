//! External contour filtering on binary masks.
//!
//! Non-zero pixels form 8-connected regions. Each outermost region is
//! measured by the polygon through the centres of its boundary pixels, and
//! regions at or under the area limit are dropped. Survivors are redrawn
//! filled, so holes inside them close.

use crate::frame::Mask;
use std::collections::VecDeque;

/// Neighbour offsets, clockwise on screen starting east.
const DIRECTIONS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

const OUTSIDE: u32 = u32::MAX;
const UNLABELLED: u32 = 0;

struct Grid {
    width: i64,
    height: i64,
    labels: Vec<u32>,
}

impl Grid {
    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            None
        } else {
            Some((y * self.width + x) as usize)
        }
    }

    fn label(&self, x: i64, y: i64) -> Option<u32> {
        self.index(x, y).map(|i| self.labels[i])
    }
}

/// Zero pixels reachable from the border through 4-connected zeros.
fn mark_outside(mask: &Mask, grid: &mut Grid) {
    let raw = mask.as_raw();
    let mut queue = VecDeque::new();
    for y in 0..grid.height {
        for x in 0..grid.width {
            let border = x == 0 || y == 0 || x == grid.width - 1 || y == grid.height - 1;
            let i = (y * grid.width + x) as usize;
            if border && raw[i] == 0 && grid.labels[i] != OUTSIDE {
                grid.labels[i] = OUTSIDE;
                queue.push_back((x, y));
            }
        }
    }
    while let Some((x, y)) = queue.pop_front() {
        for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            if let Some(i) = grid.index(x + dx, y + dy) {
                if raw[i] == 0 && grid.labels[i] != OUTSIDE {
                    grid.labels[i] = OUTSIDE;
                    queue.push_back((x + dx, y + dy));
                }
            }
        }
    }
}

/// Label the filled outer regions. Returns the first raster pixel of each.
fn label_regions(grid: &mut Grid) -> Vec<(i64, i64)> {
    let mut starts = Vec::new();
    let mut queue = VecDeque::new();
    for y in 0..grid.height {
        for x in 0..grid.width {
            let i = (y * grid.width + x) as usize;
            if grid.labels[i] != UNLABELLED {
                continue;
            }
            starts.push((x, y));
            let label = starts.len() as u32;
            grid.labels[i] = label;
            queue.push_back((x, y));
            while let Some((cx, cy)) = queue.pop_front() {
                for (dx, dy) in DIRECTIONS {
                    if let Some(j) = grid.index(cx + dx, cy + dy) {
                        if grid.labels[j] == UNLABELLED {
                            grid.labels[j] = label;
                            queue.push_back((cx + dx, cy + dy));
                        }
                    }
                }
            }
        }
    }
    starts
}

/// Moore-neighbour trace of the outer boundary of region `label`, starting
/// at its first raster pixel.
fn trace_boundary(grid: &Grid, label: u32, start: (i64, i64)) -> Vec<(i64, i64)> {
    let search = |(x, y): (i64, i64), from: usize| {
        (0..8)
            .map(|k| (from + k) % 8)
            .find(|&d| grid.label(x + DIRECTIONS[d].0, y + DIRECTIONS[d].1) == Some(label))
    };
    let step = |(x, y): (i64, i64), d: usize| (x + DIRECTIONS[d].0, y + DIRECTIONS[d].1);

    let mut contour = vec![start];
    // Nothing above or to the left of the start belongs to the region, so
    // search as if we had arrived moving east.
    let Some(first) = search(start, 5) else {
        return contour;
    };

    let mut p = step(start, first);
    let mut d = first;
    loop {
        let Some(next) = search(p, (d + 5) % 8) else {
            break;
        };
        if p == start && next == first {
            break;
        }
        contour.push(p);
        p = step(p, next);
        d = next;
    }
    contour
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[(i64, i64)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(&(x0, y0), &(x1, y1))| x0 * y1 - x1 * y0)
        .sum();
    twice.abs() as f64 / 2.0
}

/// Keep only outer regions whose contour area exceeds
/// `fraction * width * height`, filled with 255. Everything else is 0.
pub fn filter_small_regions(mask: &Mask, fraction: f32) -> Mask {
    let (width, height) = mask.dimensions();
    let mut grid = Grid {
        width: width as i64,
        height: height as i64,
        labels: vec![UNLABELLED; (width as usize) * (height as usize)],
    };
    mark_outside(mask, &mut grid);
    let starts = label_regions(&mut grid);

    let limit = (width as f64) * (height as f64) * fraction as f64;
    let keep: Vec<bool> = starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let contour = trace_boundary(&grid, i as u32 + 1, start);
            polygon_area(&contour) > limit
        })
        .collect();

    let mut out = Mask::new(width, height);
    for (px, &label) in out.pixels_mut().zip(&grid.labels) {
        if label != OUTSIDE && label != UNLABELLED && keep[label as usize - 1] {
            px.0[0] = 255;
        }
    }
    out
}
