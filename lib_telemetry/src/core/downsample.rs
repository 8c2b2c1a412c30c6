//! # Largest-Triangle-Three-Buckets Downsampling
//!
//! Reduces a long aggregate series to a bounded number of visually
//! representative points for rendering. First and last points are always
//! kept; the interior is partitioned into buckets of roughly equal size and
//! each bucket contributes the point forming the largest triangle with the
//! previously selected point and the next bucket's average.
//!
//! Reference: Sveinn Steinarsson, "Downsampling Time Series for Visual
//! Representation".

use crate::error::PipelineError;
use crate::model::Aggregate;

/// Downsamples `series` to exactly `min(target_points, series.len())`
/// points, using `window_start_ms` as x and `avg` as y.
///
/// `target_points < 3` fails with `InvalidTargetPoints`: the algorithm needs
/// the first point, the last point and at least one interior bucket. A
/// series no longer than the target is returned unchanged.
pub fn downsample(
    series: &[Aggregate],
    target_points: usize,
) -> Result<Vec<Aggregate>, PipelineError> {
    if target_points < 3 {
        return Err(PipelineError::InvalidTargetPoints(target_points));
    }
    let len = series.len();
    if len <= target_points {
        return Ok(series.to_vec());
    }

    let mut result = Vec::with_capacity(target_points);
    result.push(series[0].clone());

    // Interior bucket width, excluding the fixed first and last points.
    let bucket_size = (len - 2) as f64 / (target_points - 2) as f64;
    let mut selected = 0usize; // index of the previously selected point

    for bucket in 0..(target_points - 2) {
        let bucket_start = (bucket as f64 * bucket_size).floor() as usize + 1;
        let bucket_end = (((bucket + 1) as f64) * bucket_size).floor() as usize + 1;
        let bucket_end = bucket_end.min(len - 1);

        // Average point of the next bucket, the third triangle corner.
        let next_start = bucket_end;
        let next_end = ((((bucket + 2) as f64) * bucket_size).floor() as usize + 1).min(len);
        let (avg_x, avg_y) = if next_start < next_end {
            let count = (next_end - next_start) as f64;
            let sum_x: f64 = series[next_start..next_end]
                .iter()
                .map(|a| a.window_start_ms as f64)
                .sum();
            let sum_y: f64 = series[next_start..next_end].iter().map(|a| a.avg).sum();
            (sum_x / count, sum_y / count)
        } else {
            (series[len - 1].window_start_ms as f64, series[len - 1].avg)
        };

        let a_x = series[selected].window_start_ms as f64;
        let a_y = series[selected].avg;

        let mut max_area = -1.0f64;
        let mut max_index = bucket_start;
        for candidate in bucket_start..bucket_end {
            let c_x = series[candidate].window_start_ms as f64;
            let c_y = series[candidate].avg;
            // Twice the triangle area via the shoelace formula; the factor
            // of 0.5 does not change the argmax.
            let area = ((a_x - avg_x) * (c_y - a_y) - (a_x - c_x) * (avg_y - a_y)).abs();
            if area > max_area {
                max_area = area;
                max_index = candidate;
            }
        }

        result.push(series[max_index].clone());
        selected = max_index;
    }

    result.push(series[len - 1].clone());
    Ok(result)
}
