// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tabular word report parser.
//
// The recognition engine writes one tab-separated row per layout element.
// Only word rows (level 5) carry text; they are grouped back into lines by
// their (block, paragraph, line) numbers.

use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_core::types::Word;

const WORD_LEVEL: u32 = 5;

/// Words and page text extracted from one report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReport {
    pub words: Vec<Word>,
    /// Words of a line joined by spaces, lines joined by newlines.
    pub text: String,
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    level: usize,
    block: usize,
    par: usize,
    line: usize,
    left: usize,
    top: usize,
    width: usize,
    height: usize,
    conf: usize,
    text: usize,
}

impl ColumnIndex {
    fn from_header(header: &str) -> Result<Self> {
        let names: Vec<&str> = header.split('\t').map(str::trim).collect();
        if names.first() != Some(&"level") {
            return Err(ScanlayerError::Parse(
                "word report does not start with a level header".into(),
            ));
        }
        let find = |name: &str| {
            names.iter().position(|n| *n == name).ok_or_else(|| {
                ScanlayerError::Parse(format!("word report is missing the {name} column"))
            })
        };
        Ok(Self {
            level: 0,
            block: find("block_num")?,
            par: find("par_num")?,
            line: find("line_num")?,
            left: find("left")?,
            top: find("top")?,
            width: find("width")?,
            height: find("height")?,
            conf: find("conf")?,
            text: find("text")?,
        })
    }
}

/// Parse a word report, keeping words whose confidence is at least
/// `min_confidence`.
///
/// Rows that are too short or carry malformed numbers are skipped; only a
/// missing or foreign header is an error.
pub fn parse_tsv(report: &str, min_confidence: f32) -> Result<ParsedReport> {
    let mut rows = report.lines();
    let header = rows
        .next()
        .ok_or_else(|| ScanlayerError::Parse("word report is empty".into()))?;
    let cols = ColumnIndex::from_header(header)?;

    let mut words = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<(u32, u32, u32)> = None;

    for row in rows {
        let fields: Vec<&str> = row.split('\t').collect();
        let Some(level) = field_u32(&fields, cols.level) else {
            continue;
        };
        if level != WORD_LEVEL {
            continue;
        }
        let text = fields.get(cols.text).map(|t| t.trim()).unwrap_or("");
        if text.is_empty() {
            continue;
        }
        let confidence = fields
            .get(cols.conf)
            .and_then(|c| c.trim().parse::<f32>().ok())
            .unwrap_or(-1.0);
        if confidence < min_confidence {
            continue;
        }
        let (Some(x), Some(y), Some(width), Some(height)) = (
            field_u32(&fields, cols.left),
            field_u32(&fields, cols.top),
            field_u32(&fields, cols.width),
            field_u32(&fields, cols.height),
        ) else {
            continue;
        };

        let key = (
            field_u32(&fields, cols.block).unwrap_or(0),
            field_u32(&fields, cols.par).unwrap_or(0),
            field_u32(&fields, cols.line).unwrap_or(0),
        );
        match lines.last_mut() {
            Some(line) if current_key == Some(key) => {
                line.push(' ');
                line.push_str(text);
            }
            _ => {
                lines.push(text.to_string());
                current_key = Some(key);
            }
        }

        words.push(Word {
            text: text.to_string(),
            x,
            y,
            width,
            height,
        });
    }

    Ok(ParsedReport {
        words,
        text: lines.join("\n"),
    })
}

fn field_u32(fields: &[&str], index: usize) -> Option<u32> {
    fields.get(index)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_tsv;

    #[test]
    fn groups_words_into_lines() {
        let parsed = parse_tsv(&sample_tsv(3), 0.0).expect("parse");
        assert_eq!(parsed.text, "Page 3\nscanned");
        assert_eq!(parsed.words.len(), 3);
        assert_eq!(
            parsed.words[0],
            Word {
                text: "Page".into(),
                x: 10,
                y: 10,
                width: 30,
                height: 12
            }
        );
    }

    #[test]
    fn confidence_threshold_filters_words() {
        let parsed = parse_tsv(&sample_tsv(3), 95.5).expect("parse");
        let texts: Vec<_> = parsed.words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, ["Page"]);
        assert_eq!(parsed.text, "Page");
    }

    #[test]
    fn negative_threshold_keeps_unscored_words() {
        let parsed = parse_tsv(&sample_tsv(1), -1.0).expect("parse");
        assert_eq!(parsed.words.len(), 4);
        assert_eq!(parsed.text, "Page 1\nscanned ~");
    }

    #[test]
    fn header_only_report_is_empty() {
        let header = sample_tsv(1).lines().next().expect("header").to_string();
        let parsed = parse_tsv(&header, 0.0).expect("parse");
        assert!(parsed.words.is_empty());
        assert_eq!(parsed.text, "");
    }

    #[test]
    fn foreign_report_is_rejected() {
        assert!(parse_tsv("", 0.0).is_err());
        assert!(parse_tsv("word\tx\ty\nhello\t1\t2", 0.0).is_err());
        let missing_conf = "level\tblock_num\tpar_num\tline_num\tleft\ttop\twidth\theight\ttext";
        assert!(parse_tsv(missing_conf, 0.0).is_err());
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let report = format!("{}5\t1\t1\t1\t3\t1\tten\t0\t5\t5\t90\tbroken\n5\t1", sample_tsv(2));
        let parsed = parse_tsv(&report, 0.0).expect("parse");
        assert_eq!(parsed.words.len(), 3);
    }

    #[test]
    fn separate_blocks_start_new_lines() {
        let report = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                      5\t1\t1\t1\t1\t1\t0\t0\t5\t5\t90\tleft\n\
                      5\t1\t2\t1\t1\t1\t50\t0\t5\t5\t90\tright\n";
        assert_eq!(parse_tsv(report, 0.0).expect("parse").text, "left\nright");
    }
}
