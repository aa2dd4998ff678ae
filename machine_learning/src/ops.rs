//! Tensor plumbing shared by the models and the training loop.
//!
//! Image tensors travel as `[batch, channel, height, width]` once they enter a model, while the
//! dataloaders produce `[batch, height, width, channel]`. Per-pixel computations work on
//! `[pixels, classes]` rows where the pixel index runs over `(batch, height, width)` in
//! row-major order.

use ndarray::{Array, Array2, Array4, ArrayView, ArrayView2, ArrayView4, Axis, Dimension, RemoveAxis};

use crate::{MlErr, Result};

/// The weights of the spectrum projection, one per severity class.
pub const SPECTRUM_WEIGHTS: [f32; 4] = [0.0, 1.0, 2.0, 3.0];

/// The amount of severity classes a segmentation model must predict.
pub const NUM_CLASSES: usize = SPECTRUM_WEIGHTS.len();

/// Rearranges an image batch from `[batch, height, width, channel]` into a contiguous
/// `[batch, channel, height, width]` tensor.
pub fn nhwc_to_nchw(x: ArrayView4<f32>) -> Array4<f32> {
    x.permuted_axes([0, 3, 1, 2]).as_standard_layout().into_owned()
}

/// Flattens a `[batch, channel, height, width]` tensor into `[pixels, channel]` rows.
///
/// # Arguments
/// * `x` - The tensor to flatten.
///
/// # Returns
/// The rows, or an error if the tensor couldn't be reshaped.
pub fn nchw_to_rows(x: ArrayView4<f32>) -> Result<Array2<f32>> {
    let (b, c, h, w) = x.dim();
    let rows = x
        .permuted_axes([0, 2, 3, 1])
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((b * h * w, c))?;

    Ok(rows)
}

/// Inverse of `nchw_to_rows`.
///
/// # Arguments
/// * `rows` - The `[pixels, channel]` rows.
/// * `(b, h, w)` - The batch size and spatial dimensions the rows were flattened from.
///
/// # Returns
/// The `[batch, channel, height, width]` tensor, or an error if the sizes don't add up.
pub fn rows_to_nchw(rows: Array2<f32>, (b, h, w): (usize, usize, usize)) -> Result<Array4<f32>> {
    let c = rows.ncols();
    let nhwc = rows.into_shape_with_order((b, h, w, c))?;
    Ok(nhwc.permuted_axes([0, 3, 1, 2]).as_standard_layout().into_owned())
}

/// Computes the softmax of `x` along `axis`.
pub fn softmax<D: Dimension>(x: ArrayView<f32, D>, axis: Axis) -> Array<f32, D> {
    let mut out = x.to_owned();

    for mut lane in out.lanes_mut(axis) {
        let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        lane.mapv_inplace(|v| (v - max).exp());
        let sum = lane.sum();
        lane.mapv_inplace(|v| v / sum);
    }

    out
}

/// Returns the index of the maximum value along `axis`. Ties resolve to the lowest index.
pub fn argmax<D: RemoveAxis>(x: ArrayView<f32, D>, axis: Axis) -> Array<i64, D::Smaller> {
    x.map_axis(axis, |lane| {
        let mut best = 0;
        let mut max = f32::NEG_INFINITY;

        for (i, &v) in lane.iter().enumerate() {
            if v > max {
                max = v;
                best = i;
            }
        }

        best as i64
    })
}

/// Projects per-class probabilities onto a continuous severity value.
///
/// The probabilities are laid out as `[classes, pixels]` and multiplied by the row vector of
/// `SPECTRUM_WEIGHTS`, yielding one value per pixel.
///
/// # Arguments
/// * `probs` - A `[batch, class, height, width]` probability tensor.
///
/// # Returns
/// A `[1, batch * height * width]` tensor, or an error if the class axis doesn't match the
/// amount of spectrum weights.
pub fn spectrum(probs: ArrayView4<f32>) -> Result<Array2<f32>> {
    let (b, c, h, w) = probs.dim();
    if c != NUM_CLASSES {
        return Err(MlErr::SizeMismatch {
            what: "spectrum classes",
            got: c,
            expected: NUM_CLASSES,
        });
    }

    let ravel = probs
        .permuted_axes([1, 0, 2, 3])
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((c, b * h * w))?;

    let weights = ArrayView2::from_shape((1, c), &SPECTRUM_WEIGHTS)?;
    Ok(weights.dot(&ravel))
}

/// Backpropagates a gradient with respect to the spectrum values into a gradient with respect to
/// the logits the probabilities were computed from.
///
/// For `s = Σ w_k p_k` with `p = softmax(z)`, `ds/dz_j = p_j (w_j - s)`.
///
/// # Arguments
/// * `probs` - The `[batch, class, height, width]` softmax probabilities.
/// * `d_spectrum` - The `[1, pixels]` gradient of the loss with respect to the spectrum.
///
/// # Returns
/// The gradient with respect to the logits, shaped like `probs`.
pub fn spectrum_prime(probs: ArrayView4<f32>, d_spectrum: ArrayView2<f32>) -> Result<Array4<f32>> {
    let (b, c, h, w) = probs.dim();
    if c != NUM_CLASSES {
        return Err(MlErr::SizeMismatch {
            what: "spectrum classes",
            got: c,
            expected: NUM_CLASSES,
        });
    }

    if d_spectrum.len() != b * h * w {
        return Err(MlErr::SizeMismatch {
            what: "spectrum gradient",
            got: d_spectrum.len(),
            expected: b * h * w,
        });
    }

    let mut grad = probs.as_standard_layout().into_owned();

    for (mut lane, &d) in grad.lanes_mut(Axis(1)).into_iter().zip(d_spectrum.iter()) {
        let s: f32 = lane.iter().zip(SPECTRUM_WEIGHTS).map(|(p, w)| p * w).sum();

        lane.iter_mut()
            .zip(SPECTRUM_WEIGHTS)
            .for_each(|(p, w)| *p = d * *p * (w - s));
    }

    Ok(grad)
}

/// One-hot encodes a tensor of class labels into `[labels, classes]` rows.
///
/// # Arguments
/// * `labels` - The class labels, flattened in row-major order.
/// * `classes` - The amount of classes.
///
/// # Returns
/// The encoded rows, or an error if a label is outside `0..classes`.
pub fn one_hot<D: Dimension>(labels: ArrayView<i64, D>, classes: usize) -> Result<Array2<f32>> {
    let mut rows = Array2::zeros((labels.len(), classes));

    for (mut row, &label) in rows.rows_mut().into_iter().zip(labels.iter()) {
        let class = usize::try_from(label)
            .ok()
            .filter(|&class| class < classes)
            .ok_or(MlErr::InvalidInput("class label out of range"))?;

        row[class] = 1.0;
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, array};

    fn one_hot_probs(k: usize, (b, h, w): (usize, usize, usize)) -> Array4<f32> {
        Array4::from_shape_fn((b, NUM_CLASSES, h, w), |(_, c, _, _)| {
            if c == k { 1.0 } else { 0.0 }
        })
    }

    #[test]
    fn spectrum_of_a_one_hot_tensor_is_the_class_index() {
        for k in 0..NUM_CLASSES {
            let probs = one_hot_probs(k, (2, 3, 2));
            let spec = spectrum(probs.view()).unwrap();

            assert_eq!(spec.dim(), (1, 12));
            assert!(spec.iter().all(|&v| v == k as f32));
        }
    }

    #[test]
    fn spectrum_keeps_the_batch_major_pixel_order() {
        let mut probs = Array4::zeros((2, NUM_CLASSES, 1, 2));
        probs[[0, 1, 0, 0]] = 1.0;
        probs[[0, 2, 0, 1]] = 1.0;
        probs[[1, 0, 0, 0]] = 1.0;
        probs[[1, 3, 0, 1]] = 1.0;

        let spec = spectrum(probs.view()).unwrap();
        assert_eq!(spec, array![[1.0, 2.0, 0.0, 3.0]]);
    }

    #[test]
    fn spectrum_rejects_the_wrong_amount_of_classes() {
        let probs = Array4::zeros((1, 3, 2, 2));
        assert!(matches!(
            spectrum(probs.view()),
            Err(MlErr::SizeMismatch { got: 3, .. })
        ));
    }

    #[test]
    fn softmax_lanes_sum_to_one() {
        let x = Array4::from_shape_fn((2, 4, 3, 3), |(b, c, h, w)| (b + 2 * c + h * w) as f32 * 0.3);
        let p = softmax(x.view(), Axis(1));

        for lane in p.lanes(Axis(1)) {
            assert!((lane.sum() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn argmax_picks_the_first_maximum() {
        let x = array![[0.1, 0.7, 0.7, 0.2], [3.0, 1.0, 2.0, 0.0]];
        assert_eq!(argmax(x.view(), Axis(1)), array![1, 0]);
    }

    #[test]
    fn rows_round_trip_through_nchw() {
        let x = Array4::from_shape_fn((2, 3, 2, 2), |(b, c, h, w)| (b * 100 + c * 10 + h * 2 + w) as f32);
        let rows = nchw_to_rows(x.view()).unwrap();

        assert_eq!(rows.dim(), (8, 3));
        assert_eq!(rows.row(5).to_vec(), vec![101.0, 111.0, 121.0]);
        assert_eq!(rows_to_nchw(rows, (2, 2, 2)).unwrap(), x);
    }

    #[test]
    fn nhwc_images_are_permuted_channel_first() {
        let x = Array4::from_shape_fn((1, 2, 2, 3), |(_, h, w, c)| (h * 100 + w * 10 + c) as f32);
        let y = nhwc_to_nchw(x.view());

        assert_eq!(y.dim(), (1, 3, 2, 2));
        assert_eq!(y[[0, 2, 1, 0]], 102.0);
        assert!(y.is_standard_layout());
    }

    #[test]
    fn spectrum_prime_matches_finite_differences() {
        let z = Array4::from_shape_fn((1, 4, 1, 2), |(_, c, _, w)| (c as f32 - 1.5) * (w as f32 + 0.5));
        let probs = softmax(z.view(), Axis(1));
        let ones = Array2::ones((1, 2));
        let grad = spectrum_prime(probs.view(), ones.view()).unwrap();

        let eps = 1e-3;
        for c in 0..4 {
            let mut zp = z.clone();
            zp[[0, c, 0, 1]] += eps;
            let mut zm = z.clone();
            zm[[0, c, 0, 1]] -= eps;

            let sp = spectrum(softmax(zp.view(), Axis(1)).view()).unwrap().sum();
            let sm = spectrum(softmax(zm.view(), Axis(1)).view()).unwrap().sum();
            let numeric = (sp - sm) / (2.0 * eps);

            assert!((grad[[0, c, 0, 1]] - numeric).abs() < 1e-2);
        }
    }

    #[test]
    fn one_hot_rejects_out_of_range_labels() {
        let labels = Array3::from_elem((1, 1, 2), 4_i64);
        assert!(one_hot(labels.view(), 4).is_err());

        let labels = array![2_i64, 0];
        assert_eq!(one_hot(labels.view(), 3).unwrap(), array![[0.0, 0.0, 1.0], [1.0, 0.0, 0.0]]);
    }
}
