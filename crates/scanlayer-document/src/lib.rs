// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanlayer-document — Document handling for the Scanlayer OCR pipeline.
//
// Provides read-only inspection of source PDFs (page count, page boxes),
// construction of the page-aligned overlay document that carries recognized
// text into the merge step, and header-only raster dimension probing.

pub mod pdf;
pub mod raster;

// Re-export the primary structs so callers can use `scanlayer_document::SourceDocument` etc.
pub use pdf::overlay::{OverlayBuilder, build_overlay};
pub use pdf::source::{PageBox, SourceDocument};
pub use raster::image_dimensions;
