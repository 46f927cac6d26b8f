// src/plot/mod.rs
use anyhow::{anyhow, Context, Result};
use plotters::prelude::{ChartBuilder, Color, IntoDrawingArea, Rectangle, SVGBackend, BLUE, WHITE};
use std::{fs, path::Path};

/// Equal-width bin counts over `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.counts.len() as f64
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Bin `values` into `bins` equal-width bins spanning the data. The maximum
/// lands in the last bin. A single distinct value is centred in a range one
/// unit wide. Returns `None` when there is nothing to count.
pub fn histogram_counts(values: &[f64], bins: usize) -> Option<Histogram> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (mut min, mut max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if bins == 0 || min > max {
        return None;
    }
    if min == max {
        min -= 0.5;
        max += 0.5;
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in values.iter().filter(|v| v.is_finite()) {
        let idx = (((v - min) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    Some(Histogram { min, max, counts })
}

/// Draw `histogram` as a bar chart into an SVG at `path`.
pub fn render_histogram(
    path: &Path,
    caption: &str,
    histogram: &Histogram,
    size: (u32, u32),
) -> Result<()> {
    let mut svg = String::new();
    draw_bars(&mut svg, caption, histogram, size)?;
    fs::write(path, svg).with_context(|| format!("writing {}", path.display()))
}

fn draw_bars(
    svg: &mut String,
    caption: &str,
    histogram: &Histogram,
    size: (u32, u32),
) -> Result<()> {
    let y_max = histogram.counts.iter().copied().max().unwrap_or(0).max(1) as f64;
    let width = histogram.bin_width();

    let root = SVGBackend::with_string(svg, size).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("clearing canvas: {}", e))?;
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(histogram.min..histogram.max, 0.0..(y_max * 1.1))
        .map_err(|e| anyhow!("building chart: {}", e))?;

    chart
        .configure_mesh()
        .x_desc("rate")
        .y_desc("states")
        .x_labels(11)
        .draw()
        .map_err(|e| anyhow!("drawing axes: {}", e))?;

    chart
        .draw_series(
            histogram
                .counts
                .iter()
                .enumerate()
                .filter(|(_, c)| **c > 0)
                .map(|(i, &c)| {
                    let x0 = histogram.min + i as f64 * width;
                    Rectangle::new([(x0, 0.0), (x0 + width, c as f64)], BLUE.mix(0.6).filled())
                }),
        )
        .map_err(|e| anyhow!("drawing bars: {}", e))?;

    root.present()
        .map_err(|e| anyhow!("finishing svg: {}", e))?;
    Ok(())
}
