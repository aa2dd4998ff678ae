#![allow(dead_code)]

use std::{env, fs, path::PathBuf};

use machine_learning::{
    MlErr,
    arch::{Mode, Model},
    dataset::Batch,
    ops::NUM_CLASSES,
};
use ndarray::{Array3, Array4, ArrayView4};

/// A fresh scratch directory for a test.
pub fn scratch(name: &str) -> PathBuf {
    let dir = env::temp_dir().join(format!("corrosion-trainer-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// A batch of `n` single channel 2x2 images whose pixels are all labelled `class`.
pub fn batch(n: usize, class: i64) -> Batch {
    Batch {
        image: Array4::from_elem((n, 2, 2, 1), 0.5),
        mask: Array3::from_elem((n, 2, 2), class),
    }
}

/// A model whose predictions follow a script instead of its parameters.
///
/// In evaluation mode every pixel is confidently assigned the scripted class of the current
/// epoch; epochs are counted by the switches to evaluation mode. In training mode the logits are
/// uniform and every backward pass adds one to each gradient entry.
#[derive(Debug)]
pub struct ScriptedModel {
    script: Vec<usize>,
    evals: usize,
    mode: Mode,
    params: Vec<f32>,
    grad: Vec<f32>,
}

impl ScriptedModel {
    pub fn new(script: Vec<usize>, params: Vec<f32>) -> Self {
        let grad = vec![0.; params.len()];
        Self {
            script,
            evals: 0,
            mode: Mode::Train,
            params,
            grad,
        }
    }
}

impl Model for ScriptedModel {
    fn size(&self) -> usize {
        self.params.len()
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        if mode == Mode::Eval && self.mode != Mode::Eval {
            self.evals += 1;
        }
        self.mode = mode;
    }

    fn forward(&mut self, x: ArrayView4<f32>) -> Result<Array4<f32>, MlErr> {
        let (b, _, h, w) = x.dim();

        let logits = match self.mode {
            Mode::Train => Array4::zeros((b, NUM_CLASSES, h, w)),
            Mode::Eval => {
                let class = self.script[(self.evals - 1).min(self.script.len() - 1)];
                Array4::from_shape_fn((b, NUM_CLASSES, h, w), |(_, c, _, _)| if c == class { 10. } else { 0. })
            }
        };

        Ok(logits)
    }

    fn backward(&mut self, _d: ArrayView4<f32>) -> Result<(), MlErr> {
        self.grad.iter_mut().for_each(|g| *g += 1.);
        Ok(())
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_and_grad(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.params, &self.grad)
    }

    fn zero_grad(&mut self) {
        self.grad.fill(0.);
    }
}
