mod args;

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;

use dnn_desktop::log_collector::resolve_logs_path;
use dnn_desktop::{
    AppConfig, AppError, ExperimentContext, ExperimentEvent, LogCollector, LogLine, ResultsPanel,
    SettingsManager, SettingsSource,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = args::Args::parse();

    let settings = SettingsManager::load(args.config.as_deref())
        .map_err(|e| anyhow!(AppError::from(e).user_message()))?;
    let mut config = settings.config.clone();
    if let Some(timeout) = args.startup_timeout {
        config.classification_startup_timeout_seconds = timeout;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }

    if let SettingsSource::Fallback { path, reason } = &settings.source {
        eprintln!(
            "WARNING: Ignoring settings file {}: {}",
            path.display(),
            reason
        );
    }

    if args.list {
        print_catalog(&config);
        return Ok(());
    }

    // =========================================================================
    // LOGGING - disk persistence plus the log window channel
    // =========================================================================
    let (log_ui_tx, mut log_ui_rx) = mpsc::channel::<LogLine>(1024);
    let log_collector = start_logging(&config, log_ui_tx, args.verbose)
        .map_err(|e| anyhow!(e.user_message()))?;
    log::info!("DNN Desktop {} starting", dnn_desktop::VERSION);
    settings.log_source();

    config
        .validate()
        .map_err(|e| anyhow!(AppError::from(e).user_message()))?;

    let program = match &args.program {
        Some(name) => config.find_program(name)?.clone(),
        None => config.programs.first().cloned().ok_or_else(|| anyhow!("No programs configured"))?,
    };
    let model = match &args.model {
        Some(name) => config.find_model(name)?.clone(),
        None => config.models.first().cloned().ok_or_else(|| anyhow!("No models configured"))?,
    };
    let dataset = match &args.dataset {
        Some(name) => config.find_dataset(name)?.clone(),
        None => config.datasets.first().cloned().ok_or_else(|| anyhow!("No datasets configured"))?,
    };
    let batch_size = config.batch_size;

    println!("Program: {} ({})", program.title, program.uoa);
    println!("Model:   {} ({})", model.title, model.uoa);
    println!("Dataset: {} ({})", dataset.title, dataset.val_uoa);
    println!();

    let mut context = ExperimentContext::new(config).with_log_collector(log_collector.clone());
    let mut events = context
        .start(program, model, dataset, batch_size)
        .map_err(|e| anyhow!(e.user_message()))?;

    let mut had_error = false;
    let mut interrupt_requested = false;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match context.handle_event(event) {
                    ExperimentEvent::ResultReady { image, result } => {
                        println!("{}  {}", image.image_file, ResultsPanel::status_line(&result));
                    }
                    ExperimentEvent::Error(message) => {
                        had_error = true;
                        eprintln!("ERROR: {}", message);
                    }
                    ExperimentEvent::Finished { outcome, elapsed } => {
                        println!();
                        println!("{}", ResultsPanel::render(context.experiment_result()));
                        println!(
                            "Stopped after {:.1} s, {} images ({:?})",
                            elapsed.as_secs_f64(),
                            outcome.images(),
                            outcome
                        );
                        break;
                    }
                }
            }
            line = log_ui_rx.recv(), if args.verbose => {
                if let Some(line) = line {
                    eprintln!("[{}] {}", line.timestamp, line.message);
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupt_requested => {
                interrupt_requested = true;
                eprintln!("Interrupt received, stopping experiment...");
                context.stop();
            }
        }
    }

    if let Err(e) = log_collector.wait_for_empty().await {
        eprintln!("WARNING: Failed to flush logs: {}", e);
    }

    if had_error {
        std::process::exit(1);
    }
    Ok(())
}

fn start_logging(
    config: &AppConfig,
    ui_tx: mpsc::Sender<LogLine>,
    verbose: bool,
) -> Result<Arc<LogCollector>, AppError> {
    let log_dir = resolve_logs_path(&config.log_dir).map_err(AppError::Logging)?;
    let collector = Arc::new(LogCollector::new(log_dir, ui_tx).map_err(AppError::Logging)?);
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    collector
        .clone()
        .init_global_logger(level)
        .map_err(AppError::Logging)?;
    Ok(collector)
}

fn print_catalog(config: &AppConfig) {
    println!("Programs:");
    for p in &config.programs {
        println!("  {:<32} {}", p.uoa, p.title);
    }
    println!("Models:");
    for m in &config.models {
        println!("  {:<32} {}", m.uoa, m.title);
    }
    println!("Datasets:");
    for d in &config.datasets {
        println!("  {:<32} {} (aux: {})", d.val_uoa, d.title, d.aux_uoa);
    }
}
