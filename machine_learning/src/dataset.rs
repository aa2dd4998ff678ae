use std::num::NonZeroUsize;

use ndarray::{Array3, Array4, Axis, Zip};
use ndarray_rand::RandomExt;
use rand::{Rng, rngs::StdRng, seq::SliceRandom};
use rand_distr::{Normal, Uniform};

use crate::{MlErr, Result, ops::NUM_CLASSES};

/// A batch of images and their segmentation masks.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// `[batch, height, width, channel]` images.
    pub image: Array4<f32>,
    /// `[batch, height, width]` class labels.
    pub mask: Array3<i64>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.mask.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An in-memory collection of images with one class label per pixel.
#[derive(Debug, Clone)]
pub struct SegmentationDataset {
    images: Array4<f32>,
    masks: Array3<i64>,
}

impl SegmentationDataset {
    /// Creates a new `SegmentationDataset`.
    ///
    /// # Arguments
    /// * `images` - `[samples, height, width, channel]` images.
    /// * `masks` - `[samples, height, width]` class labels.
    ///
    /// # Returns
    /// A new dataset or an error if the images and masks don't line up.
    pub fn new(images: Array4<f32>, masks: Array3<i64>) -> Result<Self> {
        let (n, h, w, _) = images.dim();
        if masks.dim() != (n, h, w) {
            return Err(MlErr::SizeMismatch {
                what: "dataset masks",
                got: masks.len(),
                expected: n * h * w,
            });
        }

        Ok(Self { images, masks })
    }

    /// Generates a dataset whose first channel encodes each pixel's class plus gaussian noise,
    /// while the remaining channels are pure noise.
    ///
    /// # Arguments
    /// * `samples` - The amount of images.
    /// * `(height, width)` - The size of each image.
    /// * `channels` - The amount of channels of each image.
    /// * `rng` - A random number generator.
    ///
    /// # Returns
    /// The dataset or an error if `channels` is zero.
    pub fn synthetic<R: Rng + ?Sized>(
        samples: usize,
        (height, width): (usize, usize),
        channels: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if channels == 0 {
            return Err(MlErr::InvalidInput("synthetic images need at least one channel"));
        }

        let labels = Uniform::new(0, NUM_CLASSES as i64).map_err(|e| MlErr::InvalidSpec(e.to_string()))?;
        let noise = Normal::new(0., 0.05).map_err(|e| MlErr::InvalidSpec(e.to_string()))?;

        let masks = Array3::random_using((samples, height, width), labels, rng);
        let mut images = Array4::random_using((samples, height, width, channels), noise, rng);

        let max_class = (NUM_CLASSES - 1) as f32;
        Zip::from(images.index_axis_mut(Axis(3), 0))
            .and(&masks)
            .for_each(|x, &class| *x += class as f32 / max_class);

        Self::new(images, masks)
    }

    pub fn len(&self) -> usize {
        self.masks.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gathers the given samples into a batch, in the given order.
    ///
    /// # Panics
    /// If an index is out of bounds.
    pub fn select(&self, indices: &[usize]) -> Batch {
        Batch {
            image: self.images.select(Axis(0), indices),
            mask: self.masks.select(Axis(0), indices),
        }
    }

    /// Splits the dataset in two, the second part holding `round(len * fraction)` samples taken
    /// from the end.
    ///
    /// # Arguments
    /// * `fraction` - The share of samples for the second part, in `[0, 1]`.
    ///
    /// # Returns
    /// Both parts or an error if `fraction` is out of range.
    pub fn split(self, fraction: f32) -> Result<(Self, Self)> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(MlErr::InvalidInput("split fraction must be in [0, 1]"));
        }

        let len = self.len();
        let tail = ((len as f32 * fraction).round() as usize).min(len);
        let (images_a, images_b) = self.images.view().split_at(Axis(0), len - tail);
        let (masks_a, masks_b) = self.masks.view().split_at(Axis(0), len - tail);

        Ok((
            Self {
                images: images_a.to_owned(),
                masks: masks_a.to_owned(),
            },
            Self {
                images: images_b.to_owned(),
                masks: masks_b.to_owned(),
            },
        ))
    }
}

/// Anything that can be iterated in batches once per phase.
pub trait BatchSource {
    /// Returns the batches of a single pass over the data.
    fn batches(&mut self) -> impl Iterator<Item = Batch> + '_;

    /// Returns the amount of batches `batches` yields.
    fn num_batches(&self) -> usize;
}

impl BatchSource for Vec<Batch> {
    fn batches(&mut self) -> impl Iterator<Item = Batch> + '_ {
        self.iter().cloned()
    }

    fn num_batches(&self) -> usize {
        self.len()
    }
}

/// Iterates a dataset in batches of `batch_size` samples, optionally reshuffling on every pass.
/// The last batch may be smaller.
pub struct DataLoader {
    dataset: SegmentationDataset,
    batch_size: NonZeroUsize,
    rng: Option<StdRng>,
}

impl DataLoader {
    /// Creates a new `DataLoader` that iterates the dataset in order.
    ///
    /// # Arguments
    /// * `dataset` - The samples to iterate.
    /// * `batch_size` - The maximum amount of samples per batch.
    ///
    /// # Returns
    /// A new `DataLoader` instance.
    pub fn new(dataset: SegmentationDataset, batch_size: NonZeroUsize) -> Self {
        Self {
            dataset,
            batch_size,
            rng: None,
        }
    }

    /// Makes the loader reshuffle the samples on every pass.
    pub fn shuffled(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn dataset(&self) -> &SegmentationDataset {
        &self.dataset
    }

    /// Returns the amount of batches in a pass.
    pub fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size.get())
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }
}

impl BatchSource for DataLoader {
    fn batches(&mut self) -> impl Iterator<Item = Batch> + '_ {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(rng) = &mut self.rng {
            order.shuffle(rng);
        }

        let batch_size = self.batch_size.get();
        let dataset = &self.dataset;

        (0..order.len())
            .step_by(batch_size)
            .map(move |start| {
                let end = (start + batch_size).min(order.len());
                dataset.select(&order[start..end])
            })
    }

    fn num_batches(&self) -> usize {
        self.len()
    }
}
