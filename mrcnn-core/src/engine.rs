//! Boundary with the external inference engine.

use std::sync::Arc;

use ndarray::ArrayView2;
use tract_onnx::prelude::{DatumType, Tensor};

use crate::error::{MrcnnError, Result};

/// Executes a model on named input tensors and returns the requested outputs in order.
///
/// Loading and running the model is entirely the implementation's concern.
pub trait InferenceEngine: Send + Sync {
    fn run(&self, inputs: &[(&str, &Tensor)], outputs: &[&str]) -> anyhow::Result<Vec<Tensor>>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for &E {
    fn run(&self, inputs: &[(&str, &Tensor)], outputs: &[&str]) -> anyhow::Result<Vec<Tensor>> {
        (**self).run(inputs, outputs)
    }
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Arc<E> {
    fn run(&self, inputs: &[(&str, &Tensor)], outputs: &[&str]) -> anyhow::Result<Vec<Tensor>> {
        (**self).run(inputs, outputs)
    }
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn run(&self, inputs: &[(&str, &Tensor)], outputs: &[&str]) -> anyhow::Result<Vec<Tensor>> {
        (**self).run(inputs, outputs)
    }
}

/// Run `engine`, wrapping its failure in [`MrcnnError::Engine`].
pub fn run_engine<E: InferenceEngine + ?Sized>(
    engine: &E,
    inputs: &[(&str, &Tensor)],
    outputs: &[&str],
) -> Result<Vec<Tensor>> {
    engine.run(inputs, outputs).map_err(MrcnnError::Engine)
}

/// Check that the engine produced a usable float matrix and view its rows.
///
/// The first result must be `f32` with shape `[N, C]` or `[1, N, C]` and `N > 0`.
pub fn validate_results(results: &[Tensor]) -> Result<ArrayView2<'_, f32>> {
    let Some(first) = results.first() else {
        return Err(MrcnnError::engine_result("result is empty"));
    };
    float_rows(first)
}

/// View one result tensor as `[N, C]` float rows.
pub fn float_rows(tensor: &Tensor) -> Result<ArrayView2<'_, f32>> {
    let datum_type = tensor.datum_type();
    let shape = tensor.shape();
    if datum_type != DatumType::F32 {
        return Err(MrcnnError::engine_result(format!(
            "result has unexpected type {datum_type:?} with shape {shape:?}; expected f32 rows"
        )));
    }
    let (rows, cols) = match *shape {
        [rows, cols] => (rows, cols),
        [1, rows, cols] => (rows, cols),
        _ => {
            return Err(MrcnnError::engine_result(format!(
                "result has unexpected shape {shape:?} ({datum_type:?}); expected [N, C] or [1, N, C]"
            )));
        }
    };
    if rows == 0 {
        return Err(MrcnnError::engine_result(format!(
            "predictions are empty (shape {shape:?})"
        )));
    }

    let slice = tensor
        .as_slice::<f32>()
        .map_err(|e| MrcnnError::engine_result(format!("result is not readable as f32: {e}")))?;
    ArrayView2::from_shape((rows, cols), slice)
        .map_err(|e| MrcnnError::engine_result(format!("result data is not contiguous: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FailingEngine;

    impl InferenceEngine for FailingEngine {
        fn run(&self, _: &[(&str, &Tensor)], _: &[&str]) -> anyhow::Result<Vec<Tensor>> {
            anyhow::bail!("session closed")
        }
    }

    fn matrix(shape: &[usize], values: &[f32]) -> Tensor {
        Tensor::from_shape(shape, values).unwrap()
    }

    #[test]
    fn accepts_plain_and_batched_matrices() {
        let results = [matrix(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])];
        let rows = validate_results(&results).unwrap();
        assert_eq!(rows.dim(), (2, 3));
        assert_eq!(rows[(1, 2)], 6.0);

        let results = [matrix(&[1, 1, 2], &[0.25, 0.75])];
        let rows = validate_results(&results).unwrap();
        assert_eq!(rows.dim(), (1, 2));
        assert_eq!(rows[(0, 1)], 0.75);
    }

    #[test]
    fn empty_results_are_rejected() {
        let err = validate_results(&[]).unwrap_err();
        assert!(matches!(err, MrcnnError::EngineResult(_)));
        assert!(err.to_string().contains("result is empty"));

        let results = [matrix(&[0, 7], &[])];
        let err = validate_results(&results).unwrap_err();
        assert!(err.to_string().contains("predictions are empty"));
    }

    #[test]
    fn wrong_type_or_rank_names_what_was_observed() {
        let ints = [Tensor::from_shape(&[2, 2], &[1i32, 2, 3, 4]).unwrap()];
        let message = validate_results(&ints).unwrap_err().to_string();
        assert!(message.contains("I32"), "{message}");
        assert!(message.contains("[2, 2]"), "{message}");

        let cube = [matrix(&[2, 1, 1], &[0.0, 1.0])];
        let message = validate_results(&cube).unwrap_err().to_string();
        assert!(message.contains("[2, 1, 1]"), "{message}");

        let flat = [matrix(&[3], &[0.0, 1.0, 2.0])];
        assert!(matches!(
            validate_results(&flat),
            Err(MrcnnError::EngineResult(_))
        ));
    }

    #[test]
    fn engine_failures_keep_their_source() {
        let err = run_engine(&FailingEngine, &[], &["out"]).unwrap_err();
        assert!(matches!(err, MrcnnError::Engine(_)));
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "session closed");
    }
}
