use anyhow::{bail, Context, Result};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Table};
use std::sync::Arc;

use crate::auth::{AssertionSigner, TokenExchanger};
use crate::build::{BuildOrchestrator, CommandBuilder, RunReport, TargetReport, TargetStage};
use crate::config::Settings;
use crate::target::Target;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::upload::UploadDispatcher;

/// Build every target and upload its artifacts
pub async fn publish_command(settings: &Settings, targets: &[Target]) -> Result<()> {
    let program = settings
        .build
        .program
        .as_deref()
        .context("No build tool configured. Set [build] program in the config file")?;

    let targets = if targets.is_empty() {
        settings.build.targets.as_slice()
    } else {
        targets
    };

    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new(settings.request_timeout()));
    let orchestrator = BuildOrchestrator::new(
        Arc::new(CommandBuilder::new(program, settings.build.args.clone())),
        TokenExchanger::new(
            AssertionSigner::new(settings.identity(), settings.assertion_settings()),
            transport.clone(),
        ),
        UploadDispatcher::new(
            transport,
            &settings.storage.upload_base_url,
            &settings.storage.bucket,
        ),
        &settings.build.output_dir,
    );

    let report = orchestrator.run_all(targets).await;
    println!("{}", render_report(&report));

    if !report.is_success() {
        bail!("Publish finished with failures");
    }

    Ok(())
}

fn render_report(report: &RunReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("TARGET").add_attribute(Attribute::Bold),
            Cell::new("STATUS").add_attribute(Attribute::Bold),
            Cell::new("UPLOADED").add_attribute(Attribute::Bold),
            Cell::new("FAILED").add_attribute(Attribute::Bold),
            Cell::new("DETAILS").add_attribute(Attribute::Bold),
        ]);

    for target in &report.targets {
        let status = status_label(target);

        let (uploaded, failed, details) = match &target.upload {
            Some(upload) => {
                let errors: Vec<String> = upload
                    .outcomes
                    .iter()
                    .filter_map(|o| {
                        o.result
                            .as_ref()
                            .err()
                            .map(|e| format!("{}: {}", o.object_name, e))
                    })
                    .collect();
                (
                    upload.succeeded().to_string(),
                    upload.failed().to_string(),
                    errors.join("\n"),
                )
            }
            None => (
                "-".to_string(),
                "-".to_string(),
                target.error.clone().unwrap_or_default(),
            ),
        };

        table.add_row(vec![
            Cell::new(target.target),
            Cell::new(&status),
            Cell::new(&uploaded),
            Cell::new(&failed),
            Cell::new(&details),
        ]);
    }

    table
}

fn status_label(target: &TargetReport) -> String {
    match (target.stage, target.failed_at) {
        (TargetStage::Failed, Some(reached)) => format!("failed after {}", reached),
        (stage, _) => stage.to_string(),
    }
}
