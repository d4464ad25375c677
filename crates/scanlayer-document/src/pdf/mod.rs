// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — source inspection and overlay construction.

pub mod overlay;
pub mod source;

pub use overlay::OverlayBuilder;
pub use source::SourceDocument;
