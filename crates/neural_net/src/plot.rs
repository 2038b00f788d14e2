//! Loss-curve rendering
//!
//! Draws epoch vs. loss into an in-memory RGB buffer with plotters and
//! writes it out as PNG. No font backend is enabled, so the chart carries a
//! grid but no text; identical curves give byte-identical files.

use plotters::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::trainer::EpochRecord;

/// Plot file written when no other path is configured
pub const DEFAULT_PLOT_PATH: &str = "output.png";
pub const DEFAULT_PLOT_SIZE: (u32, u32) = (640, 480);

const GRID_LINES: usize = 5;

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("no epochs to plot")]
    Empty,

    #[error("plot size {0}x{1} is not drawable")]
    InvalidSize(u32, u32),

    #[error("drawing failed: {0}")]
    Draw(String),

    #[error("cannot write '{}': {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Render `records` as a line chart and save it to `path` as PNG
pub fn render_loss_curve(
    records: &[EpochRecord],
    path: &Path,
    size: (u32, u32),
) -> Result<(), PlotError> {
    if records.is_empty() {
        return Err(PlotError::Empty);
    }
    let (width, height) = size;
    if width < 64 || height < 64 {
        return Err(PlotError::InvalidSize(width, height));
    }

    let mut buf = vec![0u8; (width as usize) * (height as usize) * 3];
    match catch_unwind(AssertUnwindSafe(|| draw(records, &mut buf, size))) {
        Ok(result) => result?,
        Err(_) => return Err(PlotError::Draw("renderer panicked".into())),
    }

    image::save_buffer_with_format(
        path,
        &buf,
        width,
        height,
        image::ColorType::Rgb8,
        image::ImageFormat::Png,
    )
    .map_err(|source| PlotError::Save {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!("Loss curve saved to {}", path.display());
    Ok(())
}

fn draw(records: &[EpochRecord], buf: &mut [u8], size: (u32, u32)) -> Result<(), PlotError> {
    let draw_err = |err: &dyn std::fmt::Display| PlotError::Draw(err.to_string());

    let root = BitMapBackend::with_buffer(buf, size).into_drawing_area();
    root.fill(&WHITE).map_err(|e| draw_err(&e))?;

    let last_epoch = records.last().map_or(1, |r| r.epoch).max(2) as f64;
    let (y_min, y_max) = loss_range(records);

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(1f64..last_epoch, y_min..y_max)
        .map_err(|e| draw_err(&e))?;

    let grid = RGBColor(220, 220, 220);
    for i in 0..=GRID_LINES {
        let t = i as f64 / GRID_LINES as f64;
        let y = y_min + (y_max - y_min) * t;
        let x = 1.0 + (last_epoch - 1.0) * t;
        chart
            .draw_series(LineSeries::new(vec![(1.0, y), (last_epoch, y)], &grid))
            .map_err(|e| draw_err(&e))?;
        chart
            .draw_series(LineSeries::new(vec![(x, y_min), (x, y_max)], &grid))
            .map_err(|e| draw_err(&e))?;
    }

    chart
        .draw_series(LineSeries::new(
            records.iter().map(|r| (r.epoch as f64, r.loss)),
            RED.stroke_width(2),
        ))
        .map_err(|e| draw_err(&e))?;

    root.present().map_err(|e| draw_err(&e))?;
    Ok(())
}

/// Y-axis bounds with a little headroom; flat curves get a unit band
fn loss_range(records: &[EpochRecord]) -> (f64, f64) {
    let (min, max) = records
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
            (lo.min(r.loss), hi.max(r.loss))
        });
    let span = max - min;
    if !span.is_finite() || span <= f64::EPSILON * max.abs().max(1.0) {
        return (min - 0.5, max + 0.5);
    }
    let pad = span * 0.05;
    let (lo, hi) = (min - pad, (max + pad).min(f64::MAX));
    if (hi - lo).is_finite() {
        (lo, hi)
    } else {
        (min, max)
    }
}
