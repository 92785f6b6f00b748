//! A one-hidden-layer MLP backend over flattened planes, loaded from a
//! safetensors file.
//!
//! Tensor names: `fc1.weight` [hidden, 7168], `fc1.bias` [hidden],
//! `policy.weight` [4192, hidden], `policy.bias` [4192], `value.weight`
//! [1, hidden], `value.bias` [1]. All f32, row-major.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use safetensors::tensor::TensorView;
use safetensors::SafeTensors;

use sb_chess::POLICY_SIZE;

use crate::backend::{NetError, Network, NetworkComputation};
use crate::encoder::{Plane, INPUT_PLANES};

const INPUT_SIZE: usize = INPUT_PLANES * 64;

#[derive(Debug)]
struct Linear {
    weight: Vec<f32>,
    bias: Vec<f32>,
    out: usize,
    input: usize,
}

impl Linear {
    fn forward(&self, x: &[f32], out: &mut [f32]) {
        debug_assert_eq!(x.len(), self.input);
        debug_assert_eq!(out.len(), self.out);
        for (o, (row, b)) in out
            .iter_mut()
            .zip(self.weight.chunks_exact(self.input).zip(&self.bias))
        {
            let mut acc = *b;
            for (w, v) in row.iter().zip(x) {
                acc += w * v;
            }
            *o = acc;
        }
    }
}

fn load_linear(st: &SafeTensors, name: &str, out: usize, input: usize) -> Result<Linear, NetError> {
    let weight = load_f32(st, &format!("{name}.weight"))?;
    let bias = load_f32(st, &format!("{name}.bias"))?;
    if weight.len() != out * input || bias.len() != out {
        return Err(NetError::WeightsLoad(format!(
            "tensor `{name}` has shape {}x{}, expected {}x{}",
            bias.len(),
            if bias.is_empty() { 0 } else { weight.len() / bias.len() },
            out,
            input
        )));
    }
    Ok(Linear {
        weight,
        bias,
        out,
        input,
    })
}

fn load_f32(st: &SafeTensors, name: &str) -> Result<Vec<f32>, NetError> {
    let view: TensorView = st
        .tensor(name)
        .map_err(|e| NetError::WeightsLoad(format!("missing tensor `{name}`: {e}")))?;
    if view.dtype() != safetensors::Dtype::F32 {
        return Err(NetError::WeightsLoad(format!(
            "tensor `{name}` is not f32"
        )));
    }
    Ok(bytemuck::pod_collect_to_vec(view.data()))
}

#[derive(Debug)]
struct DenseWeights {
    fc1: Linear,
    policy: Linear,
    value: Linear,
}

/// The loaded MLP. Hidden width is whatever the weights file says.
#[derive(Debug)]
pub struct DenseNetwork {
    weights: Arc<DenseWeights>,
}

impl DenseNetwork {
    pub fn load(path: &Path) -> Result<Self, NetError> {
        if !path.is_file() {
            return Err(NetError::WeightsNotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path).map_err(|e| NetError::WeightsLoad(e.to_string()))?;
        let st = SafeTensors::deserialize(&bytes)
            .map_err(|e| NetError::WeightsLoad(e.to_string()))?;

        let fc1_bias = load_f32(&st, "fc1.bias")?;
        let hidden = fc1_bias.len();
        if hidden == 0 {
            return Err(NetError::WeightsLoad("fc1.bias is empty".to_string()));
        }
        Ok(Self {
            weights: Arc::new(DenseWeights {
                fc1: load_linear(&st, "fc1", hidden, INPUT_SIZE)?,
                policy: load_linear(&st, "policy", POLICY_SIZE, hidden)?,
                value: load_linear(&st, "value", 1, hidden)?,
            }),
        })
    }
}

impl Network for DenseNetwork {
    fn new_computation(&self) -> Box<dyn NetworkComputation> {
        Box::new(DenseComputation {
            weights: self.weights.clone(),
            inputs: Vec::new(),
            policies: Vec::new(),
            values: Vec::new(),
        })
    }
}

struct DenseComputation {
    weights: Arc<DenseWeights>,
    inputs: Vec<Vec<f32>>,
    policies: Vec<Vec<f32>>,
    values: Vec<f32>,
}

fn flatten(planes: &[Plane]) -> Vec<f32> {
    let mut out = vec![0.0f32; INPUT_SIZE];
    for (i, plane) in planes.iter().enumerate() {
        let base = i * 64;
        let mut mask = plane.mask;
        while mask != 0 {
            let sq = mask.trailing_zeros() as usize;
            out[base + sq] = plane.value;
            mask &= mask - 1;
        }
    }
    out
}

impl NetworkComputation for DenseComputation {
    fn add_input(&mut self, planes: Vec<Plane>) {
        self.inputs.push(flatten(&planes));
    }

    fn batch_size(&self) -> usize {
        self.inputs.len()
    }

    fn compute(&mut self) -> Result<(), NetError> {
        let net = &self.weights;
        self.policies.clear();
        self.values.clear();
        let mut hidden = vec![0.0f32; net.fc1.out];
        for input in &self.inputs {
            net.fc1.forward(input, &mut hidden);
            for h in &mut hidden {
                *h = h.max(0.0);
            }

            let mut logits = vec![0.0f32; POLICY_SIZE];
            net.policy.forward(&hidden, &mut logits);
            softmax_in_place(&mut logits);
            self.policies.push(logits);

            let mut v = [0.0f32];
            net.value.forward(&hidden, &mut v);
            self.values.push(v[0].tanh());
        }
        Ok(())
    }

    fn value(&self, idx: usize) -> f32 {
        self.values[idx]
    }

    fn policy(&self, idx: usize, nn_index: u16) -> f32 {
        self.policies[idx][nn_index as usize]
    }
}

fn softmax_in_place(logits: &mut [f32]) {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for l in logits.iter_mut() {
        *l = (*l - max).exp();
        sum += *l;
    }
    if sum > 0.0 {
        for l in logits.iter_mut() {
            *l /= sum;
        }
    }
}
