// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster probing — pixel dimensions of a rasterized page, read from the image
// header only.  The pixel data is never decoded.

use std::path::Path;

use scanlayer_core::error::ScanlayerError;
use tracing::debug;

/// Width and height in pixels of the image at `path`.
///
/// Fails if the header cannot be read or either dimension is zero.
pub fn image_dimensions(path: &Path) -> Result<(u32, u32), ScanlayerError> {
    let (width, height) = image::image_dimensions(path).map_err(|err| {
        ScanlayerError::ImageError(format!(
            "cannot read dimensions of {}: {}",
            path.display(),
            err
        ))
    })?;

    if width == 0 || height == 0 {
        return Err(ScanlayerError::ImageError(format!(
            "{} has non-positive dimensions {}x{}",
            path.display(),
            width,
            height
        )));
    }

    debug!(width, height, path = %path.display(), "raster dimensions probed");
    Ok((width, height))
}
