//! 8-connected component labelling of foreground masks.

use stagecut_models::{Blob, BoundingBox, Point};

use super::morphology::ForegroundMask;

/// Extract connected foreground regions of at least `min_area` pixels.
///
/// Blobs are ordered by descending area, then by top-left position, so the
/// result is deterministic for a given mask.
pub fn find_blobs(mask: &ForegroundMask, min_area: u32) -> Vec<Blob> {
    let (w, h) = (mask.width() as i64, mask.height() as i64);
    let bits = mask.bits();
    let mut visited = vec![false; bits.len()];
    let mut stack: Vec<(i64, i64)> = Vec::new();
    let mut blobs = Vec::new();

    for start in 0..bits.len() {
        if !bits[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push((start as i64 % w, start as i64 / w));

        let mut area: u64 = 0;
        let (mut sum_x, mut sum_y) = (0u64, 0u64);
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (i64::MAX, i64::MAX, 0i64, 0i64);

        while let Some((x, y)) = stack.pop() {
            area += 1;
            sum_x += x as u64;
            sum_y += y as u64;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let idx = (ny * w + nx) as usize;
                    if bits[idx] && !visited[idx] {
                        visited[idx] = true;
                        stack.push((nx, ny));
                    }
                }
            }
        }

        if area < min_area as u64 {
            continue;
        }

        // Pixel (x, y) covers [x, x+1) so its centre is at +0.5
        let centroid = Point::new(
            sum_x as f64 / area as f64 + 0.5,
            sum_y as f64 / area as f64 + 0.5,
        );
        blobs.push(Blob {
            centroid,
            bbox: BoundingBox::from_extents(min_x as u32, min_y as u32, max_x as u32, max_y as u32),
            area: area as u32,
        });
    }

    blobs.sort_by(|a, b| {
        b.area
            .cmp(&a.area)
            .then(a.bbox.y.total_cmp(&b.bbox.y))
            .then(a.bbox.x.total_cmp(&b.bbox.x))
    });
    blobs
}
