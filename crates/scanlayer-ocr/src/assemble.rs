// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Searchable document assembly: page-aligned overlay + merge onto the source.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use scanlayer_core::OcrConfig;
use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_document::{SourceDocument, build_overlay};
use tracing::{debug, info, instrument};

use crate::command::{CommandRunner, ToolInvocation, ToolRole};
use crate::temp::TempRegistry;

/// Write the overlay for the document at `source_path` to `overlay_path`:
/// one page per source page, the text-only fragment where recognition
/// succeeded and a blank page of the same size elsewhere.  Returns the
/// overlay's page count.
pub fn write_overlay(
    source_path: &Path,
    fragments: &BTreeMap<u32, PathBuf>,
    overlay_path: &Path,
) -> Result<usize> {
    let source = SourceDocument::open(source_path)?;
    let overlay = build_overlay(&source, fragments)?;
    let pages = overlay.page_count();
    overlay.save(overlay_path)?;
    Ok(pages)
}

/// Build the overlay from `fragments` (page number → text-only fragment) and
/// merge it onto `source_path`.  Returns the path of the merged document
/// inside the job directory.
///
/// Exit code 0 and the configured warnings code count as success; every
/// other outcome is a job-level [`ScanlayerError::Merge`].
#[instrument(skip_all, fields(fragments = fragments.len()))]
pub async fn assemble(
    runner: &dyn CommandRunner,
    config: &OcrConfig,
    source_path: &Path,
    fragments: BTreeMap<u32, PathBuf>,
    temp: &TempRegistry,
) -> Result<PathBuf> {
    let overlay_path = temp.file("overlay.pdf");
    let (source, target) = (source_path.to_path_buf(), overlay_path.clone());
    let pages = tokio::task::spawn_blocking(move || write_overlay(&source, &fragments, &target))
        .await
        .map_err(|err| ScanlayerError::PdfError(format!("overlay construction aborted: {err}")))??;
    debug!(pages, "overlay written");

    let output = temp.file("searchable.pdf");
    let invocation = ToolInvocation::new(ToolRole::Merger, &config.tools.merger)
        .arg(source_path)
        .arg("--overlay")
        .arg(&overlay_path)
        .arg("--")
        .arg(&output)
        .timeout(config.tool_timeout());
    let tool = invocation.tool_name();

    let merged = runner
        .run(&invocation)
        .await
        .and_then(|out| out.require_success(&tool, &[config.merge_warning_code]));
    if let Err(err) = merged {
        return Err(ScanlayerError::Merge(err.to_string()));
    }
    if !output.exists() {
        return Err(ScanlayerError::Merge(format!("{tool} produced no output")));
    }

    info!(output = %output.display(), "searchable document merged");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use scanlayer_core::types::JobId;

    use super::*;
    use crate::testing::{ScriptedRunner, blank_pdf};

    struct Fixture {
        _dir: tempfile::TempDir,
        temp: TempRegistry,
        source_path: PathBuf,
    }

    fn fixture(pages: usize) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let temp = TempRegistry::create(dir.path(), JobId::new()).expect("temp");
        let source_path = temp.file("input.pdf");
        std::fs::write(&source_path, blank_pdf(pages)).expect("write source");
        Fixture {
            _dir: dir,
            temp,
            source_path,
        }
    }

    #[tokio::test]
    async fn merges_overlay_onto_source() {
        let fx = fixture(3);
        let runner = ScriptedRunner::default();
        let out = assemble(
            &runner,
            &OcrConfig::default(),
            &fx.source_path,
            BTreeMap::new(),
            &fx.temp,
        )
        .await
        .expect("assemble");
        assert!(out.exists());

        let merge = &runner.calls_for(ToolRole::Merger)[0];
        assert_eq!(merge.args[0].as_os_str(), fx.source_path.as_os_str());
        assert_eq!(merge.arg_after("--overlay"), Some(fx.temp.root().join("overlay.pdf").as_path()));
        assert_eq!(merge.arg_after("--"), Some(out.as_path()));

        let overlay = SourceDocument::open(fx.temp.root().join("overlay.pdf")).expect("overlay");
        assert_eq!(overlay.page_count(), 3);
    }

    #[test]
    fn overlay_keeps_page_alignment_with_unreadable_fragment() {
        let fx = fixture(3);
        let bogus = fx.temp.file("p0002_ocr.pdf");
        std::fs::write(&bogus, b"not a pdf").expect("write");
        let fragments = BTreeMap::from([(2, bogus)]);
        let overlay = fx.temp.file("overlay.pdf");
        let pages = write_overlay(&fx.source_path, &fragments, &overlay).expect("overlay");
        assert_eq!(pages, 3);
    }

    #[tokio::test]
    async fn warnings_exit_code_is_success() {
        let fx = fixture(1);
        let runner = ScriptedRunner::default().merge_exit(3);
        let out = assemble(
            &runner,
            &OcrConfig::default(),
            &fx.source_path,
            BTreeMap::new(),
            &fx.temp,
        )
        .await;
        assert!(out.is_ok());
    }

    #[tokio::test]
    async fn hard_merge_failure_is_job_level() {
        let fx = fixture(1);
        let runner = ScriptedRunner::default().merge_exit(2);
        let err = assemble(
            &runner,
            &OcrConfig::default(),
            &fx.source_path,
            BTreeMap::new(),
            &fx.temp,
        )
        .await
        .expect_err("merge fails");
        assert!(matches!(err, ScanlayerError::Merge(_)));
        assert!(err.to_string().contains("qpdf exited with code 2"));
    }
}
