//! Hole filling of backmap cells.

use crate::alg::geoloc::storage::BackmapStorage;
use crate::errors::Result;

const DIRECTIONS: [(isize, isize); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (1, -1),
    (-1, 1),
    (1, 1),
];

fn neighbour(size: (usize, usize), x: usize, y: usize, dx: isize, dy: isize) -> Option<(usize, usize)> {
    let nx = x.checked_add_signed(dx)?;
    let ny = y.checked_add_signed(dy)?;
    (nx < size.0 && ny < size.1).then_some((nx, ny))
}

/// Fills empty cells from the valid cells found within `max_search_dist`
/// along the eight principal directions, weighted by inverse squared
/// distance, then smooths the filled cells with `smoothing_iterations`
/// passes of a 3x3 mean. Returns the number of filled cells.
pub fn fill_nodata(
    cells: &mut dyn BackmapStorage,
    max_search_dist: f64,
    smoothing_iterations: usize,
) -> Result<usize> {
    let size = cells.size();
    let mut filled = Vec::new();

    for y in 0..size.1 {
        for x in 0..size.0 {
            if cells.value(x, y)?.is_some() {
                continue;
            }
            let mut sum = [0.0f64; 2];
            let mut total_weight = 0.0f64;
            for (dx, dy) in DIRECTIONS {
                let unit = ((dx * dx + dy * dy) as f64).sqrt();
                let mut step = 1;
                while step as f64 * unit <= max_search_dist {
                    let Some((nx, ny)) = neighbour(size, x, y, dx * step, dy * step) else {
                        break;
                    };
                    if let Some([vx, vy]) = cells.value(nx, ny)? {
                        let dist = step as f64 * unit;
                        let weight = 1.0 / (dist * dist);
                        sum[0] += weight * vx as f64;
                        sum[1] += weight * vy as f64;
                        total_weight += weight;
                        break;
                    }
                    step += 1;
                }
            }
            if total_weight > 0.0 {
                let value = [(sum[0] / total_weight) as f32, (sum[1] / total_weight) as f32];
                filled.push((x, y, value));
            }
        }
    }
    // written once every hole has been looked at
    for &(x, y, value) in &filled {
        cells.set_value(x, y, Some(value))?;
    }

    for _ in 0..smoothing_iterations {
        let mut smoothed = Vec::with_capacity(filled.len());
        for &(x, y, _) in &filled {
            let mut sum = [0.0f64; 2];
            let mut count = 0usize;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if let Some((nx, ny)) = neighbour(size, x, y, dx, dy) {
                        if let Some([vx, vy]) = cells.value(nx, ny)? {
                            sum[0] += vx as f64;
                            sum[1] += vy as f64;
                            count += 1;
                        }
                    }
                }
            }
            // count includes the cell itself
            smoothed.push((x, y, [(sum[0] / count as f64) as f32, (sum[1] / count as f64) as f32]));
        }
        for (x, y, value) in smoothed {
            cells.set_value(x, y, Some(value))?;
        }
    }

    Ok(filled.len())
}

/// Row by row, interpolates linearly across runs of empty cells whose two
/// bounding valid cells differ by at most `max_difference` on both axes.
pub fn fill_line_gaps(cells: &mut dyn BackmapStorage, max_difference: f32) -> Result<()> {
    let (width, height) = cells.size();
    for y in 0..height {
        let row = (0..width)
            .map(|x| cells.value(x, y))
            .collect::<Result<Vec<_>>>()?;
        let mut last_valid: Option<usize> = None;
        for (ix, value) in row.iter().enumerate() {
            let Some(end) = *value else {
                continue;
            };
            if let Some(start_ix) = last_valid {
                if ix > start_ix + 1 {
                    if let Some(start) = row[start_ix] {
                        let close = (end[0] - start[0]).abs() <= max_difference
                            && (end[1] - start[1]).abs() <= max_difference;
                        if close {
                            let span = (ix - start_ix) as f32;
                            for inner in start_ix + 1..ix {
                                let alpha = (inner - start_ix) as f32 / span;
                                let value = [
                                    (1.0 - alpha) * start[0] + alpha * end[0],
                                    (1.0 - alpha) * start[1] + alpha * end[1],
                                ];
                                cells.set_value(inner, y, Some(value))?;
                            }
                        }
                    }
                }
            }
            last_valid = Some(ix);
        }
    }
    Ok(())
}
