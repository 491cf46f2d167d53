//! Predefined progress stages for the built-in operations.
//!
//! Real operation bodies (scraper, resume parser, generator) live outside
//! this service and report through the same three-call contract; these tables
//! drive the test tasks and document the expected stage shape.

use anyhow::{bail, Result};
use std::time::Duration;

use crate::models::task::ResultPayload;
use crate::tasks::reporter::ProgressReporter;

pub struct Stage {
    pub progress: u8,
    pub status: &'static str,
    pub label: &'static str,
}

const fn stage(progress: u8, status: &'static str, label: &'static str) -> Stage {
    Stage {
        progress,
        status,
        label,
    }
}

pub const JOB_SCRAPE_STAGES: &[Stage] = &[
    stage(5, "Validating URL...", "1/6"),
    stage(15, "Fetching job page...", "2/6"),
    stage(35, "Parsing HTML content...", "3/6"),
    stage(60, "Extracting job details...", "4/6"),
    stage(80, "Processing requirements...", "5/6"),
    stage(95, "Structuring data...", "6/6"),
    stage(100, "Complete!", "6/6"),
];

pub const RESUME_PARSE_STAGES: &[Stage] = &[
    stage(10, "Uploading file...", "1/6"),
    stage(25, "Validating file format...", "2/6"),
    stage(45, "Extracting text content...", "3/6"),
    stage(65, "Parsing sections...", "4/6"),
    stage(85, "Structuring data...", "5/6"),
    stage(95, "Finalizing profile...", "6/6"),
    stage(100, "Complete!", "6/6"),
];

pub const GENERATION_STAGES: &[Stage] = &[
    stage(10, "Analyzing job posting...", "1/5"),
    stage(30, "Processing user profile...", "2/5"),
    stage(60, "Generating content...", "3/5"),
    stage(85, "Formatting output...", "4/5"),
    stage(95, "Finalizing documents...", "5/5"),
    stage(100, "Complete!", "5/5"),
];

/// Walks a stage table against the reporter: one `update` per intermediate
/// stage, a final `complete` carrying the result payload, and a cooperative
/// cancel check between stages.
pub async fn run_staged(
    reporter: &ProgressReporter,
    stages: &[Stage],
    step_delay: Duration,
    result: ResultPayload,
) -> Result<()> {
    let Some((last, steps)) = stages.split_last() else {
        bail!("stage table is empty");
    };
    for stage in steps {
        if reporter.cancel_requested().await? {
            return reporter.fail("cancelled by client").await;
        }
        reporter
            .update(stage.progress, stage.status, stage.label)
            .await?;
        tokio::time::sleep(step_delay).await;
    }
    if reporter.cancel_requested().await? {
        return reporter.fail("cancelled by client").await;
    }
    reporter.complete(last.status, result).await
}
