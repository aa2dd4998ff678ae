use std::{path::Path, time::Instant};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use machine_learning::{
    MlErr,
    arch::{Model, StateDict, loss::LossFn},
    dataset::{Batch, BatchSource},
    metrics::MetricRegistry,
    ops,
    optimization::Optimizer,
};
use ndarray::Axis;

use crate::{
    Result, TrainErr, checkpoint, dispatch,
    logbook::CsvLog,
    options::{LossKind, TrainOptions},
    phase::{Dataloaders, Phase},
    summary::BatchSummary,
};

/// The metric that decides which epoch's weights are kept.
pub const SELECTION_METRIC: &str = "spectrum_score";

const PROGRESS_TEMPLATE: &str = "{prefix:>5} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} loss:{msg}";

/// The best epoch seen so far.
///
/// `loss` follows the Test loss of the improving epoch instead of staying at its initial `1e10`,
/// so `Lowest Loss` reports the loss of the kept weights.
#[derive(Debug, Clone)]
struct BestState {
    loss: f32,
    spectrum_score: f64,
    weights: StateDict,
}

impl BestState {
    fn new(weights: StateDict) -> Self {
        Self {
            loss: 1e10,
            spectrum_score: 1.,
            weights,
        }
    }
}

/// Trains `model` for `options.num_epochs` epochs, each made of a Train and a Test phase.
///
/// Every epoch appends a row to `log_3.csv` in `out_dir` (the header is written to `log_4.csv`
/// once, at start). Whenever the epoch's `Test_spectrum_score` is strictly lower than the best so
/// far the weights are kept and a snapshot is written to
/// `weights_<epoch + epoch_offset>.safetensors`.
///
/// # Arguments
/// * `model` - The model to train.
/// * `criterion` - The loss function.
/// * `dataloaders` - The batches of both phases.
/// * `optimizer` - Updates the model's parameters after every training batch.
/// * `metrics` - The metrics computed on every batch, must contain `spectrum_score`.
/// * `out_dir` - Where the logs and the snapshots are written.
/// * `options` - The knobs of the run.
///
/// # Returns
/// The model reloaded to the best weights found (the initial ones if no epoch improved), or the
/// first error raised by any collaborator.
pub fn train_model<M, L, D, O>(
    mut model: M,
    criterion: &L,
    dataloaders: &mut Dataloaders<D>,
    optimizer: &mut O,
    metrics: &MetricRegistry,
    out_dir: impl AsRef<Path>,
    options: &TrainOptions,
) -> Result<M>
where
    M: Model,
    L: LossFn + ?Sized,
    D: BatchSource,
    O: Optimizer + ?Sized,
{
    if !metrics.contains(SELECTION_METRIC) {
        return Err(TrainErr::MissingSelectionMetric(SELECTION_METRIC));
    }

    let duplicated = dispatch::duplicates(metrics, options.dispatch);
    if !duplicated.is_empty() {
        warn!(
            "metric dispatch {:?} records {} twice per batch",
            options.dispatch,
            duplicated.join(", ")
        );
    }

    let out_dir = out_dir.as_ref();
    let since = Instant::now();
    let mut best = BestState::new(model.state_dict());

    let fieldnames = BatchSummary::new(metrics).fieldnames();
    let log = CsvLog::create(out_dir, &fieldnames)?;

    let mut loss = None;

    for epoch in 1..=options.num_epochs {
        info!("Epoch {epoch}/{}", options.num_epochs);
        info!("{}", "-".repeat(10));

        let mut summary = BatchSummary::new(metrics);
        let mut losses = [0.; 2];
        model.clear_cache();

        for (phase, phase_loss) in Phase::ALL.into_iter().zip(&mut losses) {
            model.set_mode(phase.mode());

            let source = dataloaders.get_mut(phase);
            let progress = progress_bar(phase, source.num_batches());

            for (i, batch) in source.batches().enumerate() {
                let batch_loss = run_batch(&mut model, criterion, optimizer, metrics, &mut summary, phase, &batch, options)?;
                debug!(phase = phase.as_str(), batch = i; "batch loss {batch_loss:.4}");
                loss = Some(batch_loss);

                progress.set_message(format!("{batch_loss:.4}"));
                progress.inc(1);
            }

            progress.finish_and_clear();

            *phase_loss = loss.ok_or(TrainErr::EmptyPhase(phase))?;
            info!("{phase} Loss: {:.4}", *phase_loss);
        }

        let row = summary.finish(epoch, (losses[0], losses[1]));
        debug!("{row:?}");
        log.append(&row)?;

        let field = Phase::Test.field(SELECTION_METRIC);
        let score = row
            .get(&field)
            .ok_or(TrainErr::MissingSelectionMetric(SELECTION_METRIC))?;

        if score < best.spectrum_score {
            best.spectrum_score = score;
            best.loss = row.test_loss;
            best.weights = model.state_dict();
            model.load_state_dict(&best.weights)?;

            let abs_epoch = epoch + options.epoch_offset;
            let path = checkpoint::snapshot_path(out_dir, abs_epoch);
            checkpoint::save(&model, &path, abs_epoch, score)?;
            info!("new best {field} {score:.4}, saved {}", path.display());
        }
    }

    let elapsed = since.elapsed().as_secs_f64();
    info!(
        "Training complete in {:.0}m {:.0}s",
        (elapsed / 60.).floor(),
        elapsed % 60.
    );
    info!("Lowest Loss: {:.4}", best.loss);

    model.load_state_dict(&best.weights)?;
    Ok(model)
}

/// Creates the progress bar of a phase's batch loop.
fn progress_bar(phase: Phase, len: usize) -> ProgressBar {
    let progress = ProgressBar::new(len as u64);
    progress.set_style(ProgressStyle::with_template(PROGRESS_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_bar()));
    progress.set_prefix(phase.as_str());
    progress
}

/// Runs a single batch: forward pass, loss, metrics and, in the Train phase, the backward pass
/// and an optimizer step.
///
/// # Returns
/// The batch's loss.
#[allow(clippy::too_many_arguments)]
fn run_batch<M, L, O>(
    model: &mut M,
    criterion: &L,
    optimizer: &mut O,
    metrics: &MetricRegistry,
    summary: &mut BatchSummary,
    phase: Phase,
    batch: &Batch,
    options: &TrainOptions,
) -> Result<f32>
where
    M: Model,
    L: LossFn + ?Sized,
    O: Optimizer + ?Sized,
{
    let inputs = ops::nhwc_to_nchw(batch.image.view());
    model.zero_grad();

    let logits = model.forward(inputs.view())?;
    let (b, c, h, w) = logits.dim();
    let probs = ops::softmax(logits.view(), Axis(1));
    let y_pred = ops::argmax(logits.view(), Axis(1));
    let spectrum = ops::spectrum(probs.view())?;

    let (loss, d_logits) = match options.loss_kind {
        LossKind::CrossEntropy => {
            let rows = ops::nchw_to_rows(logits.view())?;
            let targets = ops::one_hot(batch.mask.view(), c)?;
            let loss = criterion.loss(rows.view(), targets.view())?;

            let d = match phase {
                Phase::Train => {
                    let d = criterion.loss_prime(rows.view(), targets.view())?;
                    Some(ops::rows_to_nchw(d, (b, h, w))?)
                }
                Phase::Test => None,
            };

            (loss, d)
        }
        LossKind::Spectrum => {
            let targets = batch
                .mask
                .mapv(|m| m as f32)
                .into_shape_with_order((1, batch.mask.len()))
                .map_err(MlErr::from)?;
            let loss = criterion.loss(spectrum.view(), targets.view())?;

            let d = match phase {
                Phase::Train => {
                    let d = criterion.loss_prime(spectrum.view(), targets.view())?;
                    Some(ops::spectrum_prime(probs.view(), d.view())?)
                }
                Phase::Test => None,
            };

            (loss, d)
        }
    };

    let y_true: Vec<i64> = batch.mask.iter().copied().collect();
    let y_pred: Vec<i64> = y_pred.iter().copied().collect();
    dispatch::record_metrics(summary, phase.as_str(), metrics, &y_true, &y_pred, options.dispatch)?;

    if let Some(d) = d_logits {
        model.backward(d.view())?;
        let (params, grad) = model.params_and_grad();
        optimizer.update_params(grad, params)?;
    }

    Ok(loss)
}

#[cfg(test)]
mod tests {
    use machine_learning::{
        arch::{Sequential, layers::Layer, loss::CrossEntropy},
        optimization::GradientDescent,
    };
    use ndarray::{Array3, Array4};

    use super::*;

    fn batch() -> Batch {
        Batch {
            image: Array4::from_shape_fn((2, 3, 3, 2), |(b, h, w, c)| (b + h + w + c) as f32 * 0.1),
            mask: Array3::from_shape_fn((2, 3, 3), |(b, h, w)| ((b + h * w) % 4) as i64),
        }
    }

    #[test]
    fn eval_batches_leave_the_parameters_alone() {
        let mut model = Sequential::new([Layer::dense((2, 4), None)]);
        model.set_mode(Phase::Test.mode());
        let before = model.params().to_vec();

        let metrics = MetricRegistry::from_names(["spectrum_score"]).unwrap();
        let mut summary = BatchSummary::new(&metrics);
        let mut optimizer = GradientDescent::new(1.);

        run_batch(
            &mut model,
            &CrossEntropy,
            &mut optimizer,
            &metrics,
            &mut summary,
            Phase::Test,
            &batch(),
            &TrainOptions::default(),
        )
        .unwrap();

        assert_eq!(model.params(), before);
        assert_eq!(summary.values("Test_spectrum_score").unwrap().len(), 2);
    }

    #[test]
    fn train_batches_step_the_optimizer() {
        let mut model = Sequential::new([Layer::dense((2, 4), None)]);
        let metrics = MetricRegistry::from_names(["spectrum_score"]).unwrap();
        let mut summary = BatchSummary::new(&metrics);
        let mut optimizer = GradientDescent::new(1.);

        for loss_kind in [LossKind::CrossEntropy, LossKind::Spectrum] {
            let before = model.params().to_vec();
            let options = TrainOptions {
                loss_kind,
                ..TrainOptions::default()
            };

            let criterion: Box<dyn LossFn> = match loss_kind {
                LossKind::CrossEntropy => Box::new(CrossEntropy),
                LossKind::Spectrum => Box::new(machine_learning::arch::loss::Mse),
            };

            run_batch(
                &mut model,
                criterion.as_ref(),
                &mut optimizer,
                &metrics,
                &mut summary,
                Phase::Train,
                &batch(),
                &options,
            )
            .unwrap();

            assert_ne!(model.params(), before);
        }
    }

    #[test]
    fn cross_entropy_loss_sees_logits_and_one_hot_masks() {
        // Zero weights give uniform logits, so the loss is ln(classes) whatever the masks.
        let mut model = Sequential::new([Layer::dense((2, 4), None)]);
        model.set_mode(Phase::Test.mode());

        let metrics = MetricRegistry::from_names(["spectrum_score"]).unwrap();
        let mut summary = BatchSummary::new(&metrics);
        let mut optimizer = GradientDescent::new(1.);

        let loss = run_batch(
            &mut model,
            &CrossEntropy,
            &mut optimizer,
            &metrics,
            &mut summary,
            Phase::Test,
            &batch(),
            &TrainOptions::default(),
        )
        .unwrap();

        assert!((loss - 4f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn progress_bars_span_the_phase_batches() {
        let mut loaders = Dataloaders::new(vec![batch(); 3], vec![batch()]);

        for (phase, len) in [(Phase::Train, 3), (Phase::Test, 1)] {
            let source = loaders.get_mut(phase);
            let progress = progress_bar(phase, source.num_batches());

            assert_eq!(progress.length(), Some(len));
            assert_eq!(progress.prefix(), phase.as_str());
        }
    }

    #[test]
    fn the_progress_template_is_valid() {
        assert!(ProgressStyle::with_template(PROGRESS_TEMPLATE).is_ok());
    }
}
