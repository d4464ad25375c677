// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Source resolution detection.
//
// Scans are rasterized at the resolution of the images embedded in them so
// that recognition sees the original pixels.  `pdfimages -list` reports one
// row per embedded image with `x-ppi`/`y-ppi` columns; the largest value wins.

use std::path::Path;

use scanlayer_core::OcrConfig;
use tracing::{debug, info, warn};

use crate::command::{CommandRunner, ToolInvocation, ToolRole};

/// Resolution used when neither the caller nor the source provides one.
pub const DEFAULT_DPI: u32 = 300;
pub const MIN_DPI: u32 = 72;
pub const MAX_DPI: u32 = 1200;

/// Pick the rasterization resolution: explicit, then detected, then
/// [`DEFAULT_DPI`], clamped to `[MIN_DPI, MAX_DPI]`.
pub fn resolve_dpi(explicit: Option<u32>, detected: Option<u32>) -> u32 {
    explicit
        .filter(|dpi| *dpi > 0)
        .or(detected.filter(|dpi| *dpi > 0))
        .unwrap_or(DEFAULT_DPI)
        .clamp(MIN_DPI, MAX_DPI)
}

/// Run the introspection tool once and return the highest embedded image
/// resolution, or `None` if it cannot be determined.  Never fails the job.
pub async fn detect_dpi(runner: &dyn CommandRunner, config: &OcrConfig, source: &Path) -> Option<u32> {
    let invocation = ToolInvocation::new(ToolRole::Inspector, &config.tools.inspector)
        .arg("-list")
        .arg(source)
        .timeout(config.tool_timeout());
    let tool = invocation.tool_name();

    let output = match runner.run(&invocation).await {
        Ok(output) => output,
        Err(err) => {
            warn!(%err, "resolution probe unavailable");
            return None;
        }
    };
    if let Err(err) = output.require_success(&tool, &[]) {
        warn!(%err, "resolution probe failed");
        return None;
    }

    let detected = parse_image_list(&output.stdout);
    match detected {
        Some(dpi) => info!(dpi, "detected source resolution"),
        None => debug!("source lists no embedded image resolution"),
    }
    detected
}

/// Extract the maximum `x-ppi`/`y-ppi` value from `pdfimages -list` output.
///
/// ```text
/// page   num  type   width height color comp bpc  enc interp  object ID x-ppi y-ppi size ratio
/// --------------------------------------------------------------------------------------------
///    1     0 image    2480  3508  gray    1   8  jpeg   no        12  0   300   300  412K 4.8%
/// ```
pub fn parse_image_list(listing: &str) -> Option<u32> {
    let mut lines = listing.lines();
    let header: Vec<&str> = lines
        .by_ref()
        .find(|line| line.contains("x-ppi"))?
        .split_whitespace()
        .collect();
    let x_col = header.iter().position(|h| *h == "x-ppi")?;
    let y_col = header.iter().position(|h| *h == "y-ppi")?;

    let mut best: Option<f64> = None;
    for line in lines {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() <= x_col.max(y_col) || cols[0].starts_with('-') {
            continue;
        }
        for col in [x_col, y_col] {
            let ppi = cols[col].parse::<f64>().ok().filter(|ppi| ppi.is_finite() && *ppi > 0.0);
            if let Some(ppi) = ppi {
                best = Some(best.map_or(ppi, |b| b.max(ppi)));
            }
        }
    }
    best.map(|ppi| ppi.round() as u32)
}
