//! First-order optimization: Adam with a warmup-then-decay learning rate.

use serde::{Deserialize, Serialize};

/// Learning rate that moves linearly from `init_value` to `peak_value` over
/// `warmup_steps`, then decays by `decay_rate` every `transition_steps`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupExponentialDecay {
    pub init_value: f64,
    pub peak_value: f64,
    pub warmup_steps: usize,
    pub transition_steps: usize,
    pub decay_rate: f64,
}

impl Default for WarmupExponentialDecay {
    fn default() -> Self {
        Self {
            init_value: 0.1,
            peak_value: 0.05,
            warmup_steps: 500,
            transition_steps: 200,
            decay_rate: 0.5,
        }
    }
}

impl WarmupExponentialDecay {
    /// Learning rate at `step` (zero-based).
    pub fn learning_rate(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            let frac = step as f64 / self.warmup_steps as f64;
            return self.init_value + (self.peak_value - self.init_value) * frac;
        }
        let decay_steps = (step - self.warmup_steps) as f64 / self.transition_steps.max(1) as f64;
        self.peak_value * self.decay_rate.powf(decay_steps)
    }
}

/// Scale `grad` in place so its Euclidean norm is at most `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_by_global_norm(grad: &mut [f64], max_norm: f64) -> f64 {
    let norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        grad.iter_mut().for_each(|g| *g *= scale);
    }
    norm
}

/// Adam moment estimates.
#[derive(Debug, Clone)]
pub struct Adam {
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    m: Vec<f64>,
    v: Vec<f64>,
    t: i32,
}

impl Adam {
    pub fn new(dim: usize) -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            m: vec![0.0; dim],
            v: vec![0.0; dim],
            t: 0,
        }
    }

    /// Apply one update of size `lr` to `params` in place.
    pub fn step(&mut self, params: &mut [f64], grad: &[f64], lr: f64) {
        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t);
        let bc2 = 1.0 - self.beta2.powi(self.t);
        for i in 0..params.len() {
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * grad[i];
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * grad[i] * grad[i];
            let m_hat = self.m[i] / bc1;
            let v_hat = self.v[i] / bc2;
            params[i] -= lr * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }
}

/// Settings of [`minimize_adam`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    pub steps: usize,
    pub max_grad_norm: f64,
    pub schedule: WarmupExponentialDecay,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            steps: 1200,
            max_grad_norm: 1.0,
            schedule: WarmupExponentialDecay::default(),
        }
    }
}

/// Result of [`minimize_adam`].
#[derive(Debug, Clone)]
pub struct AdamResult {
    pub params: Vec<f64>,
    pub loss: f64,
    pub steps: usize,
}

/// Minimize a differentiable objective with clipped, scheduled Adam.
///
/// `objective` returns the loss and its gradient. `project` is applied to
/// the parameters after every update.
pub fn minimize_adam<F, P>(
    mut objective: F,
    initial: &[f64],
    config: &AdamConfig,
    mut project: P,
) -> AdamResult
where
    F: FnMut(&[f64]) -> (f64, Vec<f64>),
    P: FnMut(&mut [f64]),
{
    let mut params = initial.to_vec();
    let mut adam = Adam::new(params.len());
    for step in 0..config.steps {
        let (_, mut grad) = objective(&params);
        clip_by_global_norm(&mut grad, config.max_grad_norm);
        adam.step(&mut params, &grad, config.schedule.learning_rate(step));
        project(&mut params);
    }
    let (loss, _) = objective(&params);
    AdamResult {
        params,
        loss,
        steps: config.steps,
    }
}
