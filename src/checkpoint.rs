use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use machine_learning::{
    arch::{Model, Sequential, StateDict},
    builder::ComponentBuilder,
    specs::ModelSpec,
};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{Result, TrainErr};

const PARAMS_TENSOR: &str = "params";
const ARCH_KEY: &str = "arch";
const EPOCH_KEY: &str = "epoch";
const SCORE_KEY: &str = "spectrum_score";

/// Returns the path of the snapshot of an absolute epoch.
pub fn snapshot_path(dir: impl AsRef<Path>, epoch: usize) -> PathBuf {
    dir.as_ref().join(format!("weights_{epoch}.safetensors"))
}

/// A snapshot read back from disk.
#[derive(Debug)]
pub struct Snapshot {
    pub state: StateDict,
    pub arch: Option<ModelSpec>,
    pub epoch: Option<usize>,
    pub spectrum_score: Option<f64>,
}

impl Snapshot {
    /// Rebuilds the model the snapshot was taken from.
    ///
    /// # Returns
    /// The model or an error if the snapshot has no architecture or it doesn't fit the parameters.
    pub fn into_model(self) -> Result<Sequential> {
        let arch = self
            .arch
            .ok_or_else(|| TrainErr::Checkpoint("the snapshot has no architecture".into()))?;

        let mut model = ComponentBuilder::new().build_model(&arch)?;
        model.load_state_dict(&self.state)?;
        Ok(model)
    }
}

/// Writes a full snapshot of `model`: its parameters plus, when the model can describe itself,
/// its architecture, so it can be rebuilt without any other information.
///
/// # Arguments
/// * `model` - The model to snapshot.
/// * `path` - Where to write the snapshot.
/// * `epoch` - The absolute epoch the snapshot belongs to.
/// * `spectrum_score` - The score that made this snapshot the best so far.
///
/// # Returns
/// An error if the snapshot couldn't be encoded or written.
pub fn save<M: Model + ?Sized>(model: &M, path: impl AsRef<Path>, epoch: usize, spectrum_score: f64) -> Result<()> {
    let params = model.params();
    let bytes: &[u8] = bytemuck::cast_slice(params);
    let view = TensorView::new(Dtype::F32, vec![params.len()], bytes)?;

    let mut metadata = HashMap::new();
    metadata.insert(EPOCH_KEY.to_string(), epoch.to_string());
    metadata.insert(SCORE_KEY.to_string(), spectrum_score.to_string());
    if let Some(arch) = model.spec() {
        metadata.insert(ARCH_KEY.to_string(), serde_json::to_string(&arch)?);
    }

    let encoded = safetensors::serialize([(PARAMS_TENSOR, view)], &Some(metadata))?;
    fs::write(path, encoded)?;
    Ok(())
}

/// Reads a snapshot written by `save`.
///
/// # Arguments
/// * `path` - The snapshot's path.
///
/// # Returns
/// The snapshot or an error if it couldn't be read or decoded.
pub fn load(path: impl AsRef<Path>) -> Result<Snapshot> {
    let buffer = fs::read(path)?;
    let (_, header) = SafeTensors::read_metadata(&buffer)?;
    let tensors = SafeTensors::deserialize(&buffer)?;

    let tensor = tensors.tensor(PARAMS_TENSOR)?;
    if tensor.dtype() != Dtype::F32 {
        return Err(TrainErr::Checkpoint(format!(
            "expected f32 parameters, found {:?}",
            tensor.dtype()
        )));
    }

    let params: Vec<f32> = bytemuck::pod_collect_to_vec(tensor.data());
    let metadata = header.metadata().clone().unwrap_or_default();

    let arch = metadata
        .get(ARCH_KEY)
        .map(|arch| serde_json::from_str(arch))
        .transpose()?;

    Ok(Snapshot {
        state: StateDict::new(params),
        arch,
        epoch: metadata.get(EPOCH_KEY).and_then(|v| v.parse().ok()),
        spectrum_score: metadata.get(SCORE_KEY).and_then(|v| v.parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use std::env;

    use machine_learning::{
        arch::layers::Layer,
        arch::activations::ActFn,
    };

    use super::*;

    #[test]
    fn snapshots_rebuild_the_model() {
        let dir = env::temp_dir().join(format!("corrosion-checkpoint-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let layers = [
            Layer::dense((2, 3), Some(ActFn::relu())),
            Layer::dense((3, 4), None),
        ];
        let params = (0..9 + 16).map(|i| i as f32 * 0.5 - 3.).collect();
        let model = Sequential::with_params(layers, params).unwrap();

        let path = snapshot_path(&dir, 7);
        assert!(path.ends_with("weights_7.safetensors"));
        save(&model, &path, 7, 0.125).unwrap();

        let snapshot = load(&path).unwrap();
        assert_eq!(snapshot.epoch, Some(7));
        assert_eq!(snapshot.spectrum_score, Some(0.125));
        assert_eq!(snapshot.arch, model.spec());

        let restored = snapshot.into_model().unwrap();
        assert_eq!(restored.params(), model.params());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_files_fail() {
        let path = env::temp_dir().join("corrosion-checkpoint-missing.safetensors");
        assert!(matches!(load(path), Err(TrainErr::Io(_))));
    }
}
