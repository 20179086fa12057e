//! Second-order gradient-boosted regression trees with a custom
//! multi-output objective.
//!
//! Every round evaluates the objective once for all rows, then grows one
//! tree per output on that output's gradient and hessian. Splits maximize
//!
//! `½ [G_L² / (H_L + λ) + G_R² / (H_R + λ) - G² / (H + λ)] - γ`
//!
//! and leaves take `-η G / (H + λ)`. Missing feature values follow a
//! learned default direction.

use crate::error::{ForecastError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Row-wise gradient and hessian of a multi-output loss.
pub trait MultiOutputObjective {
    /// Fill `grad` and `hess` for one row given its current margins.
    fn gradients(&self, margin: &[f64], target: &[f64], grad: &mut [f64], hess: &mut [f64]);
}

/// Boosting settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_rounds: usize,
    pub max_depth: usize,
    /// Learning rate.
    pub eta: f64,
    /// L2 penalty on leaf values.
    pub lambda: f64,
    /// Minimum gain of a split.
    pub gamma: f64,
    /// Minimum hessian sum of a child.
    pub min_child_weight: f64,
    /// Fraction of rows sampled per round.
    pub subsample: f64,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_rounds: 100,
            max_depth: 6,
            eta: 0.3,
            lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            subsample: 1.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        default_left: bool,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    default_left,
                    left,
                    right,
                } => {
                    let v = x.get(*feature).copied().unwrap_or(f64::NAN);
                    let go_left = if v.is_nan() { *default_left } else { v < *threshold };
                    i = if go_left { *left } else { *right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

struct SplitCandidate {
    gain: f64,
    feature: usize,
    threshold: f64,
    default_left: bool,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a BoostingParams,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn score(&self, g: f64, h: f64) -> Option<f64> {
        let denom = h + self.params.lambda;
        (denom > 0.0).then(|| g * g / denom)
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.params.lambda;
        if denom > 0.0 {
            -self.params.eta * g / denom
        } else {
            0.0
        }
    }

    fn build(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hess[i]).sum();
        let split = if depth < self.params.max_depth && rows.len() > 1 {
            self.best_split(&rows, g, h)
        } else {
            None
        };

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(g, h),
        });
        let Some(split) = split else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows.into_iter().partition(|&i| {
            let v = self.x[i][split.feature];
            if v.is_nan() {
                split.default_left
            } else {
                v < split.threshold
            }
        });
        let left = self.build(left_rows, depth + 1);
        let right = self.build(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            default_left: split.default_left,
            left,
            right,
        };
        idx
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent = self.score(g, h)?;
        let n_features = self.x.first().map_or(0, Vec::len);
        let mut best: Option<SplitCandidate> = None;

        for feature in 0..n_features {
            let mut present: Vec<(f64, f64, f64)> = Vec::with_capacity(rows.len());
            let (mut g_missing, mut h_missing) = (0.0, 0.0);
            for &i in rows {
                let v = self.x[i][feature];
                if v.is_nan() {
                    g_missing += self.grad[i];
                    h_missing += self.hess[i];
                } else {
                    present.push((v, self.grad[i], self.hess[i]));
                }
            }
            present.sort_by(|a, b| a.0.total_cmp(&b.0));

            let (mut gl, mut hl) = (0.0, 0.0);
            for k in 0..present.len().saturating_sub(1) {
                gl += present[k].1;
                hl += present[k].2;
                if present[k].0 == present[k + 1].0 {
                    continue;
                }
                let threshold = 0.5 * (present[k].0 + present[k + 1].0);
                for default_left in [true, false] {
                    let (gl_, hl_) = if default_left {
                        (gl + g_missing, hl + h_missing)
                    } else {
                        (gl, hl)
                    };
                    let (gr_, hr_) = (g - gl_, h - hl_);
                    if hl_ < self.params.min_child_weight || hr_ < self.params.min_child_weight {
                        continue;
                    }
                    let (Some(sl), Some(sr)) = (self.score(gl_, hl_), self.score(gr_, hr_)) else {
                        continue;
                    };
                    let gain = 0.5 * (sl + sr - parent) - self.params.gamma;
                    if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                        best = Some(SplitCandidate {
                            gain,
                            feature,
                            threshold,
                            default_left,
                        });
                    }
                }
            }
        }
        best
    }
}

/// Boosted ensemble of trees, one sequence per output.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoosting {
    params: BoostingParams,
    n_outputs: usize,
    /// `rounds[r][j]` is the tree of output `j` grown in round `r`.
    rounds: Vec<Vec<RegressionTree>>,
}

impl GradientBoosting {
    /// Fit on row-major features `x` and targets `y` (one row per sample).
    pub fn fit<O: MultiOutputObjective>(
        params: BoostingParams,
        x: &[Vec<f64>],
        y: &[Vec<f64>],
        objective: &O,
    ) -> Result<Self> {
        let n = x.len();
        if n == 0 {
            return Err(ForecastError::EmptyData);
        }
        if y.len() != n {
            return Err(ForecastError::DimensionMismatch {
                expected: n,
                got: y.len(),
            });
        }
        let n_outputs = y[0].len();
        if n_outputs == 0 || y.iter().any(|row| row.len() != n_outputs) {
            return Err(ForecastError::InvalidParameter(
                "every target row needs the same non-zero number of outputs".into(),
            ));
        }
        let n_features = x[0].len();
        if let Some(bad) = x.iter().find(|row| row.len() != n_features) {
            return Err(ForecastError::DimensionMismatch {
                expected: n_features,
                got: bad.len(),
            });
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut margins = vec![vec![0.0; n_outputs]; n];
        let mut grad = vec![vec![0.0; n]; n_outputs];
        let mut hess = vec![vec![0.0; n]; n_outputs];
        let mut g_row = vec![0.0; n_outputs];
        let mut h_row = vec![0.0; n_outputs];
        let mut rounds = Vec::with_capacity(params.n_rounds);

        for round in 0..params.n_rounds {
            for i in 0..n {
                objective.gradients(&margins[i], &y[i], &mut g_row, &mut h_row);
                for j in 0..n_outputs {
                    grad[j][i] = g_row[j];
                    hess[j][i] = h_row[j];
                }
            }
            let rows: Vec<usize> = if params.subsample < 1.0 {
                (0..n).filter(|_| rng.gen::<f64>() < params.subsample).collect()
            } else {
                (0..n).collect()
            };

            let trees: Vec<RegressionTree> = (0..n_outputs)
                .map(|j| {
                    let mut builder = TreeBuilder {
                        x,
                        grad: &grad[j],
                        hess: &hess[j],
                        params: &params,
                        nodes: Vec::new(),
                    };
                    builder.build(rows.clone(), 0);
                    RegressionTree {
                        nodes: builder.nodes,
                    }
                })
                .collect();

            for (i, row) in x.iter().enumerate() {
                for (j, tree) in trees.iter().enumerate() {
                    margins[i][j] += tree.predict(row);
                }
            }
            if round == 0 || round + 1 == params.n_rounds {
                debug!(
                    round,
                    leaves = trees.iter().map(RegressionTree::n_leaves).sum::<usize>(),
                    "boosting round"
                );
            }
            rounds.push(trees);
        }

        Ok(Self {
            params,
            n_outputs,
            rounds,
        })
    }

    /// Raw margins of one feature row.
    pub fn predict_margin(&self, x: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_outputs];
        for trees in &self.rounds {
            for (j, tree) in trees.iter().enumerate() {
                out[j] += tree.predict(x);
            }
        }
        out
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }
}
