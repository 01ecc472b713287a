//! mocap-actions - Motion Capture Action Recognition
//!
//! Featurizes labelled motion recordings, trains frame-window classifiers and
//! scores them with temporal smoothing across a parameter sweep.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use log::{info, warn};
use tracing_subscriber::EnvFilter;

use mocap_actions::app::{Cli, Commands, Config};
use mocap_actions::classify::{load_classifier, ClassifierKind};
use mocap_actions::correction::{actions_from_predictions, correct_actions, Recipe};
use mocap_actions::features::{load_split, WindowFeaturizer};
use mocap_actions::labels::LabelSet;
use mocap_actions::pipeline::{
    discover_recordings, evaluate, group_name, preprocess_batch, run_sweep, train_or_load,
    BatchOptions, SweepContext,
};
use mocap_actions::report::{render_results, render_steps, summary, TimelineComparison};
use mocap_actions::state::{self, DbConnection};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Commands::InitConfig { path, force } = &cli.command {
        return run_init_config(path.clone().or_else(|| cli.config.clone()), *force);
    }

    let config = Config::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Preprocess {
            input,
            output,
            window,
            gap,
            pick,
            force,
        } => {
            let input = input.unwrap_or_else(|| config.experiment.input_dir.clone());
            run_preprocess(&config, &input, output, window, gap, pick, force).await?;
        }
        Commands::Train {
            data,
            test,
            model,
            out,
        } => {
            run_train(&config, &data, &test, &model, &out)?;
        }
        Commands::Evaluate {
            data,
            model,
            test,
            smoothing,
            timeline,
            rows_per_second,
            recipe,
        } => {
            let smoothing = smoothing.unwrap_or(config.smoothing.window_size);
            let recipe = recipe.or_else(|| config.correction.recipe.clone());
            run_evaluate(
                &config,
                &data,
                &model,
                &test,
                smoothing,
                timeline,
                rows_per_second,
                recipe.as_deref(),
            )?;
        }
        Commands::Sweep { keys, no_ledger } => {
            run_sweep_command(config, keys, no_ledger).await?;
        }
        Commands::Results { test_group } => {
            run_results(&config, test_group.as_deref())?;
        }
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

/// Label catalog from the configured file, or from the annotations under `input_dir`
fn load_label_set(config: &Config, input_dir: &Path) -> anyhow::Result<LabelSet> {
    let recordings = if config.labels.catalog.is_some() {
        Vec::new()
    } else {
        discover_recordings(input_dir, None)
            .with_context(|| format!("no label catalog and no recordings in {}", input_dir.display()))?
    };
    Ok(config.labels.build_label_set(&recordings)?)
}

fn open_ledger(config: &Config) -> anyhow::Result<DbConnection> {
    let path = match &config.experiment.ledger_path {
        Some(path) => path.clone(),
        None => state::default_ledger_path()?,
    };
    info!("Ledger: {}", path.display());
    Ok(state::init_db(&path)?)
}

async fn run_preprocess(
    config: &Config,
    input: &Path,
    output: PathBuf,
    window: Option<usize>,
    gap: Option<usize>,
    pick: Vec<String>,
    force: bool,
) -> anyhow::Result<()> {
    let mut featurizer_config = config.featurizer.clone();
    if let Some(window) = window {
        featurizer_config.window_size = window;
    }
    if let Some(gap) = gap {
        featurizer_config.gap_size = gap;
    }
    let featurizer = WindowFeaturizer::new(featurizer_config)?;

    let pick = if pick.is_empty() { None } else { Some(pick) };
    let recordings = discover_recordings(input, pick.as_deref())?;
    let label_set = load_label_set(config, input)?;
    info!("Preprocessing {} recordings into {}", recordings.len(), output.display());

    let summary = preprocess_batch(
        recordings,
        Arc::new(label_set),
        Arc::new(featurizer),
        BatchOptions {
            output_dir: output,
            force,
            jobs: config.experiment.jobs,
        },
    )
    .await;

    for (name, error) in summary.failed() {
        warn!("{} failed: {}", name, error);
    }
    println!(
        "{} written, {} cached, {} failed",
        summary.written(),
        summary.cached(),
        summary.failed().len()
    );
    if !summary.failed().is_empty() {
        bail!("{} recordings failed", summary.failed().len());
    }
    Ok(())
}

fn run_train(
    config: &Config,
    data: &Path,
    test: &[String],
    model: &str,
    out: &Path,
) -> anyhow::Result<()> {
    let kind = ClassifierKind::from_tag(model)?;
    let label_set = load_label_set(config, &config.experiment.input_dir)?;
    let split = load_split(data, test)?;
    if split.train.is_empty() {
        bail!("no training rows in {} outside {}", data.display(), group_name(test));
    }

    let classifier = train_or_load(kind, label_set.len(), &split.train, out)?;
    println!(
        "{} model for {} classes at {}",
        classifier.kind().tag(),
        classifier.num_classes(),
        out.display()
    );
    Ok(())
}

fn run_evaluate(
    config: &Config,
    data: &Path,
    model: &Path,
    test: &[String],
    smoothing: usize,
    timeline: bool,
    rows_per_second: f64,
    recipe: Option<&Path>,
) -> anyhow::Result<()> {
    let classifier = load_classifier(model)?;
    let split = load_split(data, test)?;
    if split.test.is_empty() {
        bail!("no test rows for {}", group_name(test));
    }

    let evaluation = evaluate(
        classifier.as_ref(),
        &split.test,
        smoothing,
        config.smoothing.top_k,
        config.smoothing.alignment,
    )?;
    print!("{}", summary(&evaluation.record, config.smoothing.top_k));

    if !timeline && recipe.is_none() {
        return Ok(());
    }
    let label_set = load_label_set(config, &config.experiment.input_dir)?;

    if timeline {
        let truth = split.test.labels();
        let aligned = config.smoothing.alignment.slice(&truth, smoothing);
        let comparison = TimelineComparison::new(aligned, &evaluation.smoothed, &label_set);
        print!("{}", comparison.render(rows_per_second));
    }

    if let Some(path) = recipe {
        let recipe = Recipe::load(path)
            .with_context(|| format!("failed to load recipe {}", path.display()))?;
        let probabilities = config
            .smoothing
            .alignment
            .slice(&evaluation.probabilities, smoothing);
        let actions =
            actions_from_predictions(&evaluation.smoothed, probabilities, &label_set, rows_per_second);
        let corrected = correct_actions(
            &actions,
            &recipe.steps,
            config.correction.alternative_threshold,
        )?;
        println!("-- {} --", recipe.name);
        print!("{}", render_steps(&corrected));
    }
    Ok(())
}

async fn run_sweep_command(config: Config, keys: Vec<String>, no_ledger: bool) -> anyhow::Result<()> {
    let mut experiment = config.experiment.clone();
    if !keys.is_empty() {
        experiment.key_filter = Some(keys);
    }

    let label_set = load_label_set(&config, &experiment.input_dir)?;
    let ledger = if experiment.use_ledger && !no_ledger {
        Some(open_ledger(&config)?)
    } else {
        None
    };

    let ctx = SweepContext {
        config: experiment,
        channels: config.featurizer.channels.clone(),
        top_k: config.smoothing.top_k,
        alignment: config.smoothing.alignment,
        label_set: Arc::new(label_set),
        ledger,
    };

    let summary = run_sweep(ctx).await?;
    for (key, group, record) in &summary.completed {
        println!(
            "{} [{}]  acc {:.4}  smoothed {:.4}  top-k {:.4}",
            key, group, record.accuracy, record.smoothed_accuracy, record.top_k_accuracy
        );
    }
    for (key, group, error) in &summary.failed {
        println!("{} [{}]  FAILED: {}", key, group, error);
    }
    info!(
        "Sweep finished: {} completed, {} failed",
        summary.completed.len(),
        summary.failed.len()
    );
    Ok(())
}

fn run_results(config: &Config, test_group: Option<&str>) -> anyhow::Result<()> {
    let db = open_ledger(config)?;
    let results = state::list_results(&db, test_group)?;
    print!("{}", render_results(&results));
    Ok(())
}

fn run_init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(Config::default_path);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
