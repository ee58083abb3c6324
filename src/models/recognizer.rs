//! Model inference seam and its ONNX Runtime implementation

use std::borrow::Cow;
use std::path::Path;

use ndarray::{Array2, Array3, Array4};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputValue, SessionInputs};
use ort::value::TensorRef;
use tracing::{debug, info};

use super::errors::EnsembleError;

/// A trained sequence recognizer treated as a black box.
///
/// Takes a batch of images `(N, 3, H, W)` and the encoded dummy targets
/// `(N, L)`, and returns per-position class scores shaped
/// `(N, positions, classes)`.
pub trait SequenceRecognizer {
    fn name(&self) -> &str;

    fn forward(
        &mut self,
        images: &Array4<f32>,
        targets: &Array2<i64>,
    ) -> Result<Array3<f32>, EnsembleError>;
}

/// Recognizer backed by an ONNX Runtime session.
///
/// The first graph input receives the images. When the graph declares a
/// second input it receives the targets. The first graph output is read as
/// the score tensor.
pub struct OnnxRecognizer {
    name: String,
    session: Session,
    image_input: String,
    target_input: Option<String>,
    output_name: String,
}

impl OnnxRecognizer {
    /// Load an ONNX graph with `threads` intra-op threads.
    pub fn load<P: AsRef<Path>>(path: P, name: &str, threads: usize) -> Result<Self, EnsembleError> {
        let path = path.as_ref();
        let wrap = |source| EnsembleError::Inference {
            model: name.to_string(),
            source,
        };

        info!(model = %name, path = %path.display(), threads = threads, "Loading ONNX model");

        let session = Session::builder()
            .map_err(wrap)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(wrap)?
            .with_intra_threads(threads.max(1))
            .map_err(wrap)?
            .commit_from_file(path)
            .map_err(wrap)?;

        let signature_error = |message: &str| EnsembleError::ModelSignature {
            model: name.to_string(),
            message: message.to_string(),
        };
        let image_input = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| signature_error("graph declares no inputs"))?;
        let target_input = session.inputs.get(1).map(|i| i.name.clone());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| signature_error("graph declares no outputs"))?;

        info!(
            model = %name,
            image_input = %image_input,
            target_input = ?target_input,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(Self {
            name: name.to_string(),
            session,
            image_input,
            target_input,
            output_name,
        })
    }
}

impl SequenceRecognizer for OnnxRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(
        &mut self,
        images: &Array4<f32>,
        targets: &Array2<i64>,
    ) -> Result<Array3<f32>, EnsembleError> {
        let model = self.name.clone();
        let wrap = |source| EnsembleError::Inference {
            model: model.clone(),
            source,
        };
        let non_contiguous = |what: &str| EnsembleError::UnexpectedOutput {
            model: model.clone(),
            message: format!("{what} tensor is not contiguous in memory"),
        };

        let image_dims: Vec<i64> = images.shape().iter().map(|&d| d as i64).collect();
        let image_data = images.as_slice().ok_or_else(|| non_contiguous("image"))?;
        let image_ref = TensorRef::from_array_view((image_dims, image_data)).map_err(wrap)?;

        let mut feeds: Vec<(Cow<'_, str>, SessionInputValue<'_>)> =
            vec![(Cow::Borrowed(self.image_input.as_str()), image_ref.into())];

        if let Some(target_input) = &self.target_input {
            let target_dims: Vec<i64> = targets.shape().iter().map(|&d| d as i64).collect();
            let target_data = targets.as_slice().ok_or_else(|| non_contiguous("target"))?;
            let target_ref =
                TensorRef::from_array_view((target_dims, target_data)).map_err(wrap)?;
            feeds.push((Cow::Borrowed(target_input.as_str()), target_ref.into()));
        }

        let inputs: SessionInputs<'_, '_, 0> = SessionInputs::ValueMap(feeds);
        let outputs = self.session.run(inputs).map_err(wrap)?;

        let value = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| EnsembleError::UnexpectedOutput {
                model: model.clone(),
                message: format!("output \"{}\" missing from session results", self.output_name),
            })?;
        let (shape, data) = value.try_extract_tensor::<f32>().map_err(wrap)?;
        let scores = scores_from_tensor(&self.name, shape, data)?;

        debug!(
            model = %self.name,
            shape = ?scores.shape(),
            "Forward pass complete"
        );
        Ok(scores)
    }
}

/// Copy a flat score tensor into `(batch, positions, classes)`.
///
/// Anything but a rank-3 shape with non-negative dimensions whose product
/// matches `data.len()` is an `UnexpectedOutput`.
pub(crate) fn scores_from_tensor(
    model: &str,
    shape: &[i64],
    data: &[f32],
) -> Result<Array3<f32>, EnsembleError> {
    let unexpected = |message: String| EnsembleError::UnexpectedOutput {
        model: model.to_string(),
        message,
    };

    let &[batch, positions, classes] = shape else {
        return Err(unexpected(format!(
            "expected a rank-3 score tensor, got shape {shape:?}"
        )));
    };
    let dim = |d: i64| {
        usize::try_from(d).map_err(|_| unexpected(format!("negative dimension in shape {shape:?}")))
    };
    let (batch, positions, classes) = (dim(batch)?, dim(positions)?, dim(classes)?);

    Array3::from_shape_vec((batch, positions, classes), data.to_vec())
        .map_err(|e| unexpected(format!("shape {shape:?} does not fit {} values: {e}", data.len())))
}
