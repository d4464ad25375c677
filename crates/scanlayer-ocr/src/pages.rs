// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page selection expressions such as `1-3,7,12-10`.

use std::collections::BTreeSet;

use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_core::types::PageRequest;

/// Parse a comma-separated list of pages and inclusive ranges.
///
/// Ranges may be written backwards.  Pages outside `1..=page_count` are
/// dropped; the result is sorted and free of duplicates.
pub fn parse_page_selection(expr: &str, page_count: u32) -> Result<Vec<u32>> {
    let mut pages = BTreeSet::new();

    for part in expr.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (lo, hi) = match part.split_once('-') {
            Some((a, b)) => {
                let a = parse_number(a, part)?;
                let b = parse_number(b, part)?;
                (a.min(b), a.max(b))
            }
            None => {
                let p = parse_number(part, part)?;
                (p, p)
            }
        };
        pages.extend(lo.max(1)..=hi.min(page_count));
    }

    Ok(pages.into_iter().collect())
}

/// Every page of a `page_count`-page document with the same languages.
pub fn all_pages(page_count: u32, languages: &[String]) -> Vec<PageRequest> {
    (1..=page_count)
        .map(|page_number| PageRequest {
            page_number,
            languages: languages.to_vec(),
        })
        .collect()
}

fn parse_number(raw: &str, part: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| ScanlayerError::Config(format!("invalid page selection part {part:?}")))
}
