use crate::cli::RunArgs;
use crate::config::{AppConfig, StageCommand, build_config};
use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use crate::weights::WeightsManager;
use abflow::core::io::hlt::HltFile;
use abflow::core::io::traits::StructureFile;
use abflow::engine::error::EngineError;
use abflow::engine::external::ExternalStage;
use abflow::engine::progress::ProgressReporter;
use abflow::engine::stage::StageKind;
use abflow::workflows::{
    self,
    pipeline::{PipelineInputs, PipelineSummary, StageAdapters},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(args: RunArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    info!("Initializing weights manager...");
    let weights = WeightsManager::new()?;

    info!("Merging configuration layers...");
    let app = build_config(&args, &weights)?;

    let inputs = load_inputs(&app)?;
    let [mut backbone, mut sequence, mut prediction] = external_stages(&app);

    let cancel = Arc::new(AtomicBool::new(false));
    let signal_task = {
        let cancel = Arc::clone(&cancel);
        let notices = ui_sender.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current item.");
                cancel.store(true, Ordering::SeqCst);
                let _ = notices
                    .send(UiEvent::Log(
                        "Interrupted: finishing the current item, press Ctrl-C again to abort."
                            .to_string(),
                    ))
                    .await;
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            }
        })
    };

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Starting design campaign of {} design(s) in {}",
        app.core_config.num_designs,
        app.core_config.run_dir.display()
    );
    info!("Invoking the core pipeline workflow...");

    let result = tokio::task::block_in_place(|| {
        let adapters = StageAdapters {
            backbone: &mut backbone,
            sequence: &mut sequence,
            prediction: &mut prediction,
        };
        workflows::pipeline::run(&inputs, &app.core_config, adapters, &reporter, &cancel)
    });
    signal_task.abort();

    let summary = match result {
        Ok(summary) => summary,
        Err(EngineError::Cancelled) => {
            println!(
                "Run interrupted. Resume it with the same configuration and --resume (run directory: {}).",
                app.core_config.run_dir.display()
            );
            return Err(EngineError::Cancelled.into());
        }
        Err(e) => return Err(e.into()),
    };

    for line in summary_lines(&summary) {
        println!("{line}");
    }

    if let Some(dir) = &args.export_dir {
        let exported = workflows::pipeline::export(&app.core_config.run_dir, dir, args.force)?;
        println!(
            "✓ Exported {} design(s) to {}",
            exported.written.len(),
            dir.display()
        );
        if !exported.skipped.is_empty() {
            eprintln!(
                "Skipped {} existing file(s) (use --force to overwrite)",
                exported.skipped.len()
            );
        }
    }

    Ok(())
}

fn load_inputs(app: &AppConfig) -> Result<PipelineInputs> {
    info!("Loading target from {:?}", &app.target_path);
    let target =
        HltFile::read_target_from_path(&app.target_path).map_err(|e| CliError::FileParsing {
            path: app.target_path.clone(),
            source: e.into(),
        })?;

    info!("Loading framework from {:?}", &app.framework_path);
    let framework =
        HltFile::read_from_path(&app.framework_path).map_err(|e| CliError::FileParsing {
            path: app.framework_path.clone(),
            source: e.into(),
        })?;

    Ok(PipelineInputs { target, framework })
}

fn external_stage(kind: StageKind, command: &StageCommand, app: &AppConfig) -> ExternalStage {
    ExternalStage::new(
        kind,
        command.program.clone(),
        command.args.clone(),
        app.scratch_dir.clone(),
    )
    .keep_scratch(app.keep_scratch)
}

fn external_stages(app: &AppConfig) -> [ExternalStage; 3] {
    [
        external_stage(StageKind::Backbone, &app.backbone_command, app),
        external_stage(StageKind::Sequence, &app.sequence_command, app),
        external_stage(StageKind::Prediction, &app.prediction_command, app),
    ]
}

fn summary_lines(summary: &PipelineSummary) -> Vec<String> {
    let mut lines: Vec<String> = summary
        .stages
        .iter()
        .map(|s| {
            format!(
                "  {:<10} skipped {:>4}  attempted {:>4}  done {:>4}  failed {:>4}",
                s.kind.as_str(),
                s.skipped,
                s.attempted,
                s.done,
                s.failed
            )
        })
        .collect();
    lines.push(format!(
        "✓ {} final design(s) in {}",
        summary.final_tags.len(),
        summary.final_archive.display()
    ));
    lines
}
