//! Regression model execution.
//!
//! The registered model is an ONNX graph taking a `[1, width]` f32 row and producing a
//! single value on the log1p scale. `inverse_log1p` maps it back to dollars.

use anyhow::{anyhow, bail, Result};
use std::io::Cursor;
use tract_onnx::prelude::*;
use tract_onnx::tract_core::internal::DimLike;

pub trait Regressor: Send + Sync {
    /// Number of f32 inputs the model consumes.
    fn input_width(&self) -> usize;
    /// Raw model output for one preprocessed row.
    fn predict(&self, row: &[f32]) -> Result<f32>;
}

/// `exp(raw) - 1`, undoing the log1p applied to the training target.
pub fn inverse_log1p(raw: f32) -> f64 { f64::from(raw).exp_m1() }

pub struct OnnxRegressor {
    plan: TypedRunnableModel<TypedModel>,
    width: usize,
}

impl OnnxRegressor {
    /// Loads and optimizes an ONNX graph with its input pinned to `[1, width]`. The width
    /// is the graph's own feature axis; `width_hint` only stands in when that axis is
    /// symbolic too.
    pub fn from_bytes(bytes: &[u8], width_hint: Option<usize>) -> Result<Self> {
        let width = match (declared_width(bytes), width_hint) {
            (Ok(w), _) => w,
            (Err(_), Some(w)) => w,
            (Err(e), None) => return Err(e),
        };
        let plan = tract_onnx::onnx()
            .model_for_read(&mut Cursor::new(bytes))?
            .with_input_fact(0, f32::fact([1, width]).into())?
            .into_optimized()?
            .into_runnable()?;
        Ok(Self { plan, width })
    }
}

/// Size of the last input axis as declared by the graph. Exported models usually leave
/// the batch axis symbolic, which is fine here.
fn declared_width(bytes: &[u8]) -> Result<usize> {
    let typed = tract_onnx::onnx().model_for_read(&mut Cursor::new(bytes))?.into_typed()?;
    let fact = typed.input_fact(0)?;
    let last = fact.shape.last().ok_or_else(|| anyhow!("model input has no axes"))?;
    last.to_usize().map_err(|_| anyhow!("model feature axis {last} is symbolic"))
}

impl Regressor for OnnxRegressor {
    fn input_width(&self) -> usize { self.width }

    fn predict(&self, row: &[f32]) -> Result<f32> {
        if row.len() != self.width { bail!("model expects {} inputs, got {}", self.width, row.len()); }
        let input = Tensor::from_shape(&[1, row.len()], row)?;
        let outputs = self.plan.run(tvec!(input.into()))?;
        let out = outputs.first().ok_or_else(|| anyhow!("model produced no outputs"))?;
        let value = out.to_array_view::<f32>()?.iter().next().copied();
        value.ok_or_else(|| anyhow!("model output tensor is empty"))
    }
}
