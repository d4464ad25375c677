// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command line definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Turn scanned PDFs into searchable documents.
#[derive(Debug, Parser)]
#[command(name = "scanlayer", version, about)]
#[command(after_help = "environment:\n  SCANLAYER_CONFIG  JSON configuration file\n  RUST_LOG          log filter (default: info)")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Recognize a scanned PDF and write a searchable copy
    Ocr(OcrArgs),
    /// Check that the external tools are installed
    Doctor,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct OcrArgs {
    /// Scanned PDF to recognize
    pub input: PathBuf,

    /// Pages to recognize, e.g. 1-3,7 (default: all)
    #[arg(long)]
    pub pages: Option<String>,

    /// Recognition languages, e.g. eng+deu
    #[arg(long = "lang", value_delimiter = '+')]
    pub languages: Vec<String>,

    /// Render resolution (default: detected, else 300)
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Searchable output (default: <input>.ocr.pdf)
    #[arg(long = "out")]
    pub output: Option<PathBuf>,

    /// Write word indexes next to this path
    #[arg(long)]
    pub working_copy: Option<PathBuf>,

    /// Print job events as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl OcrArgs {
    /// `--out`, or `<input stem>.ocr.pdf` beside the input.
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let stem = self
                .input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output".to_string());
            self.input.with_file_name(format!("{stem}.ocr.pdf"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("scanlayer").chain(line.split_whitespace()))
            .map(|cli| cli.command)
    }

    #[test]
    fn full_ocr_invocation() {
        let cmd = parse(
            "ocr scan.pdf --pages 1-3,5 --lang eng+deu --dpi 400 --out out.pdf --working-copy wc.pdf --json",
        )
        .expect("parse");
        let Command::Ocr(ocr) = cmd else {
            panic!("expected ocr command");
        };
        assert_eq!(ocr.input, PathBuf::from("scan.pdf"));
        assert_eq!(ocr.pages.as_deref(), Some("1-3,5"));
        assert_eq!(ocr.languages, ["eng", "deu"]);
        assert_eq!(ocr.dpi, Some(400));
        assert_eq!(ocr.output_path(), PathBuf::from("out.pdf"));
        assert_eq!(ocr.working_copy, Some(PathBuf::from("wc.pdf")));
        assert!(ocr.json);
    }

    #[test]
    fn default_output_sits_beside_input() {
        let Command::Ocr(ocr) = parse("ocr /books/scan.pdf").expect("parse") else {
            panic!("expected ocr command");
        };
        assert_eq!(ocr.output_path(), PathBuf::from("/books/scan.ocr.pdf"));
        assert!(ocr.languages.is_empty());
        assert!(!ocr.json);
    }

    #[test]
    fn doctor_command() {
        assert_eq!(parse("doctor").expect("parse"), Command::Doctor);
    }

    #[test]
    fn help_is_reported_as_display_help() {
        let err = parse("--help").expect_err("help exits early");
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn bad_invocations_are_rejected() {
        assert!(parse("").is_err());
        assert!(parse("print scan.pdf").is_err());
        assert!(parse("ocr").is_err());
        assert!(parse("ocr scan.pdf --dpi high").is_err());
        assert!(parse("ocr scan.pdf --pages").is_err());
        assert!(parse("ocr scan.pdf --colour").is_err());
        assert!(parse("ocr a.pdf b.pdf").is_err());
    }

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
