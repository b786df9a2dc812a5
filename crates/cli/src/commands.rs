//! Command Implementations

use crate::cli::{Commands, OutputFormat};
use crate::settings::AppConfig;
use anyhow::{bail, Context, Result};
use classifier::{EpochEvent, TrainingReport};
use dataset::{read_dataset, read_raw_table, write_dataset, Dataset};
use evaluator::{cross_validate, train_and_evaluate, HoldoutReport};
use feature_engine::{CorrelatedPair, CorrelationMatrix, FeatureEngineer, RETENTION_PREFERENCE};
use inference_engine::{CappingPolicy, InferenceService, ModelArtifact, Prediction};
use preprocessing::{ClassBalancer, OutlierCapper};
use serde::Serialize;
use significance::{anova, AnovaOutcome};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Serialize)]
struct CorrelationSummary<'a> {
    threshold: f64,
    pairs: &'a [CorrelatedPair],
    suggested_drops: &'a [String],
}

#[derive(Serialize)]
struct TrainingSummary<'a> {
    training: &'a TrainingReport,
    holdout: &'a HoldoutReport,
}

/// Dispatch one subcommand
pub fn run(command: Commands, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Prepare {
            input,
            output,
            balanced_output,
        } => prepare(&input, &output, balanced_output.as_deref(), config),
        Commands::Correlate {
            input,
            threshold,
            format,
        } => correlate(&input, threshold.unwrap_or(config.correlation_threshold), format, config),
        Commands::Anova {
            input,
            raw,
            alpha,
            format,
        } => run_anova(
            &load_dataset(&input, raw, config)?,
            alpha.unwrap_or(config.significance_alpha),
            format,
        ),
        Commands::Train {
            input,
            raw,
            model,
            report,
        } => train(&load_dataset(&input, raw, config)?, &model, report.as_deref(), config),
        Commands::CrossValidate {
            input,
            raw,
            folds,
            format,
        } => cross_validation(
            &load_dataset(&input, raw, config)?,
            folds.unwrap_or(config.cv_folds),
            format,
            config,
        ),
        Commands::Predict {
            model,
            input,
            value,
            no_capping,
            format,
        } => predict(&model, input.as_deref(), &value, no_capping, format, config),
        Commands::GenConfig => {
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
    }
}

fn engineer(config: &AppConfig) -> Result<FeatureEngineer> {
    FeatureEngineer::with_retained(&config.retained_features)
        .context("Invalid retained feature list")
}

/// Engineered checkpoint, or a raw table engineered on the fly
fn load_dataset(path: &Path, raw: bool, config: &AppConfig) -> Result<Dataset> {
    if raw {
        let table = read_raw_table(path, &config.label_column)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(engineer(config)?.engineer_table(&table)?)
    } else {
        read_dataset(path, Some(config.retained_features.as_slice()), &config.label_column)
            .with_context(|| format!("Failed to read checkpoint {}", path.display()))
    }
}

fn prepare(input: &Path, output: &Path, balanced: Option<&Path>, config: &AppConfig) -> Result<()> {
    let table = read_raw_table(input, &config.label_column)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let dataset = engineer(config)?.engineer_table(&table)?;
    write_dataset(output, &dataset, &config.label_column)?;
    println!(
        "Engineered {} rows into {} features -> {}",
        dataset.len(),
        dataset.n_features(),
        output.display()
    );

    if let Some(path) = balanced {
        let mut inspected = dataset.clone();
        let (_, capped) = OutlierCapper::new(config.pipeline.capping.clone())?.cap(&mut inspected)?;
        let balance = ClassBalancer::new(config.pipeline.balancing.clone())?.balance(&mut inspected)?;
        write_dataset(path, &inspected, &config.label_column)?;
        println!(
            "Capped {} values, synthesized {} {} rows -> {}",
            capped.total(),
            balance.synthesized,
            balance.minority_label,
            path.display()
        );
    }
    Ok(())
}

fn correlate(input: &Path, threshold: f64, format: OutputFormat, config: &AppConfig) -> Result<()> {
    let table = read_raw_table(input, &config.label_column)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let matrix = CorrelationMatrix::compute(&table.to_raw_dataset()?);
    let pairs = matrix.redundant_pairs(threshold);
    let drops = matrix.suggest_drops(threshold, &RETENTION_PREFERENCE);

    match format {
        OutputFormat::Json => {
            let summary = CorrelationSummary {
                threshold,
                pairs: &pairs,
                suggested_drops: &drops,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            println!("Pairs with |r| >= {}:", threshold);
            for pair in &pairs {
                println!("  {:<20} {:<20} {:>8.4}", pair.first, pair.second, pair.coefficient);
            }
            if pairs.is_empty() {
                println!("  (none)");
            }
            println!("Suggested drops: {}", drops.join(", "));
        }
    }
    Ok(())
}

fn run_anova(dataset: &Dataset, alpha: f64, format: OutputFormat) -> Result<()> {
    let report = anova(dataset);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("{:<24} {:>12} {:>12}", "feature", "F", "p-value");
            for entry in &report.features {
                match entry.outcome {
                    AnovaOutcome::Tested {
                        f_statistic,
                        p_value,
                        ..
                    } => {
                        let marker = if p_value < alpha { "*" } else { "" };
                        println!(
                            "{:<24} {:>12.4} {:>12.4e} {}",
                            entry.feature, f_statistic, p_value, marker
                        );
                    }
                    AnovaOutcome::Undefined { reason } => {
                        println!("{:<24} {:>12} {:>12} ({})", entry.feature, "-", "-", reason);
                    }
                }
            }
            println!(
                "{} of {} features significant at alpha = {}",
                report.significant(alpha).len(),
                report.features.len(),
                alpha
            );
        }
    }
    Ok(())
}

fn train(dataset: &Dataset, model: &Path, report_path: Option<&Path>, config: &AppConfig) -> Result<()> {
    let mut log_epoch = |event: &EpochEvent| {
        debug!(
            "Epoch {}: loss {:.4}/{:.4}, accuracy {:.3}/{:.3}, lr {:.2e}",
            event.epoch,
            event.train_loss,
            event.val_loss,
            event.train_accuracy,
            event.val_accuracy,
            event.learning_rate
        );
    };
    let (fitted, holdout) = train_and_evaluate(dataset, &config.pipeline, &mut log_epoch)?;

    let artifact = ModelArtifact::new(
        fitted.labels().clone(),
        fitted.capping().cloned(),
        fitted.scaling().clone(),
        fitted.network().clone(),
    )
    .with_training(fitted.report());
    artifact
        .save(model)
        .with_context(|| format!("Failed to write model {}", model.display()))?;

    for warning in &fitted.report().warnings {
        println!("warning: {}", warning);
    }
    println!(
        "Test accuracy {:.4}, loss {:.4} over {} samples",
        holdout.accuracy,
        holdout.loss,
        holdout.confusion.total()
    );
    println!("Confusion matrix (rows predicted, columns actual):");
    println!("{}", holdout.confusion);
    for class in holdout.confusion.per_class() {
        println!(
            "  {:<16} precision {:.3} recall {:.3} f1 {:.3} support {}",
            class.label, class.precision, class.recall, class.f1, class.support
        );
    }

    if let Some(path) = report_path {
        let summary = TrainingSummary {
            training: fitted.report(),
            holdout: &holdout,
        };
        fs::write(path, serde_json::to_vec_pretty(&summary)?)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Wrote training report to {}", path.display());
    }
    Ok(())
}

fn cross_validation(dataset: &Dataset, k: usize, format: OutputFormat, config: &AppConfig) -> Result<()> {
    let report = cross_validate(dataset, k, &config.pipeline)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            for fold in &report.folds {
                println!(
                    "Fold {}: accuracy {:.4} ({} train, {} test, {} epochs)",
                    fold.fold + 1,
                    fold.accuracy,
                    fold.train_size,
                    fold.test_size,
                    fold.epochs
                );
            }
            println!(
                "Mean accuracy {:.4} +/- {:.4}",
                report.mean_accuracy, report.std_accuracy
            );
        }
    }
    Ok(())
}

fn predict(
    model: &Path,
    input: Option<&Path>,
    pairs: &[(String, f64)],
    no_capping: bool,
    format: OutputFormat,
    config: &AppConfig,
) -> Result<()> {
    let policy = if no_capping {
        CappingPolicy::Skip
    } else {
        config.capping_policy
    };
    let service = InferenceService::load(model)
        .with_context(|| format!("Failed to load model {}", model.display()))?
        .with_capping(policy);

    let predictions: Vec<Prediction> = match input {
        Some(path) => {
            let table = read_raw_table(path, &config.label_column)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            service.predict_table(&table)?
        }
        None if !pairs.is_empty() => vec![service.predict_named(pairs)?],
        None => bail!("predict needs --input or --value"),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&predictions)?),
        OutputFormat::Text => {
            for (i, prediction) in predictions.iter().enumerate() {
                println!("{}: {} ({:.3})", i, prediction.label, prediction.confidence);
            }
        }
    }
    Ok(())
}
