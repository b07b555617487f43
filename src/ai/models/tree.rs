//! # Regression Tree
//!
//! $$
//! w^\*_j=-\frac{G_j}{H_j+\lambda},\qquad
//! \text{gain}=\frac12\left[\frac{G_L^2}{H_L+\lambda}+\frac{G_R^2}{H_R+\lambda}-\frac{(G_L+G_R)^2}{H_L+H_R+\lambda}\right]-\gamma
//! $$
//!
//! Greedy binary tree grown on per-row gradients and hessians. With `g = -y`, `h = 1`
//! and `lambda = gamma = 0` the leaves are sample means and the gain is the squared-error
//! reduction, which makes this the CART learner for the bagged and boosted ensembles as
//! well as the second-order learner for XGBoost-style boosting.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

/// Growth controls.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeParams {
  pub max_depth: usize,
  /// L2 penalty on leaf weights.
  pub lambda: f64,
  /// Minimum gain for a split to be kept.
  pub gamma: f64,
  /// Minimum hessian sum in each child.
  pub min_child_weight: f64,
}

impl TreeParams {
  /// Squared-error CART with single-row leaves allowed.
  pub fn cart(max_depth: usize) -> Self {
    Self {
      max_depth,
      lambda: 0.0,
      gamma: 0.0,
      min_child_weight: 1.0,
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
enum Node {
  Leaf(f64),
  Split {
    feature: usize,
    threshold: f64,
    left: usize,
    right: usize,
  },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegressionTree {
  nodes: Vec<Node>,
  n_features: usize,
}

struct Split {
  feature: usize,
  threshold: f64,
  gain: f64,
}

struct Grower<'a> {
  x: &'a Array2<f64>,
  grad: &'a [f64],
  hess: &'a [f64],
  params: &'a TreeParams,
  nodes: Vec<Node>,
}

impl RegressionTree {
  /// Grow on `rows` (duplicates allowed, as in a bootstrap sample).
  pub fn grow(
    x: &Array2<f64>,
    grad: &[f64],
    hess: &[f64],
    rows: &[usize],
    params: &TreeParams,
  ) -> Self {
    let mut grower = Grower {
      x,
      grad,
      hess,
      params,
      nodes: Vec::new(),
    };
    grower.build(rows.to_vec(), 0);
    Self {
      nodes: grower.nodes,
      n_features: x.ncols(),
    }
  }

  /// Squared-error tree whose leaves are the mean target of their rows.
  pub fn fit_mean(x: &Array2<f64>, y: &[f64], rows: &[usize], max_depth: usize) -> Self {
    let grad: Vec<f64> = y.iter().map(|v| -v).collect();
    let hess = vec![1.0; y.len()];
    Self::grow(x, &grad, &hess, rows, &TreeParams::cart(max_depth))
  }

  pub fn n_features(&self) -> usize {
    self.n_features
  }

  pub fn n_leaves(&self) -> usize {
    self
      .nodes
      .iter()
      .filter(|n| matches!(n, Node::Leaf(_)))
      .count()
  }

  pub fn depth(&self) -> usize {
    fn walk(nodes: &[Node], i: usize) -> usize {
      match nodes[i] {
        Node::Leaf(_) => 0,
        Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
      }
    }
    if self.nodes.is_empty() {
      0
    } else {
      walk(&self.nodes, 0)
    }
  }

  pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
    let mut i = 0;
    loop {
      match self.nodes.get(i) {
        Some(Node::Leaf(v)) => return *v,
        Some(Node::Split {
          feature,
          threshold,
          left,
          right,
        }) => {
          i = if row[*feature] <= *threshold { *left } else { *right };
        }
        None => return 0.0,
      }
    }
  }

  pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
    Array1::from_iter(x.rows().into_iter().map(|r| self.predict_row(r)))
  }
}

impl Grower<'_> {
  fn build(&mut self, rows: Vec<usize>, depth: usize) -> usize {
    let g: f64 = rows.iter().map(|&r| self.grad[r]).sum();
    let h: f64 = rows.iter().map(|&r| self.hess[r]).sum();
    let id = self.nodes.len();
    self.nodes.push(Node::Leaf(self.leaf_weight(g, h)));

    if depth >= self.params.max_depth || rows.len() < 2 {
      return id;
    }
    let Some(split) = self.best_split(&rows, g, h) else {
      return id;
    };

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
      .into_iter()
      .partition(|&r| self.x[[r, split.feature]] <= split.threshold);
    let left = self.build(left_rows, depth + 1);
    let right = self.build(right_rows, depth + 1);
    self.nodes[id] = Node::Split {
      feature: split.feature,
      threshold: split.threshold,
      left,
      right,
    };
    id
  }

  fn leaf_weight(&self, g: f64, h: f64) -> f64 {
    let denom = h + self.params.lambda;
    if denom > 0.0 {
      -g / denom
    } else {
      0.0
    }
  }

  fn score(&self, g: f64, h: f64) -> f64 {
    let denom = h + self.params.lambda;
    if denom > 0.0 {
      g * g / denom
    } else {
      0.0
    }
  }

  fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<Split> {
    let parent = self.score(g, h);
    let mut best: Option<Split> = None;
    let mut sorted = rows.to_vec();

    for f in 0..self.x.ncols() {
      sorted.sort_by(|&a, &b| self.x[[a, f]].total_cmp(&self.x[[b, f]]));
      let (mut gl, mut hl) = (0.0, 0.0);

      for i in 0..sorted.len() - 1 {
        let r = sorted[i];
        gl += self.grad[r];
        hl += self.hess[r];

        let lo = self.x[[r, f]];
        let hi = self.x[[sorted[i + 1], f]];
        if lo == hi {
          continue;
        }
        let (gr, hr) = (g - gl, h - hl);
        if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
          continue;
        }

        let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent) - self.params.gamma;
        if gain > 0.0 && best.as_ref().map_or(true, |b| gain > b.gain) {
          let mid = lo + 0.5 * (hi - lo);
          best = Some(Split {
            feature: f,
            threshold: if mid < hi { mid } else { lo },
            gain,
          });
        }
      }
    }
    best
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;
  use crate::ai::models::fixtures;

  #[test]
  fn cart_splits_a_step_exactly() {
    let (x, y) = fixtures::step_dataset(40);
    let rows: Vec<usize> = (0..40).collect();
    let tree = RegressionTree::fit_mean(&x, y.as_slice().unwrap(), &rows, 5);

    assert_eq!(tree.n_leaves(), 2);
    assert_eq!(tree.depth(), 1);
    let pred = tree.predict(&x);
    for (p, t) in pred.iter().zip(y.iter()) {
      assert_abs_diff_eq!(*p, *t);
    }
    assert_eq!(tree.predict_row(array![19.4, 0.0].view()), -1.0);
    assert_eq!(tree.predict_row(array![19.6, 0.0].view()), 3.0);
  }

  #[test]
  fn depth_zero_is_the_mean() {
    let (x, y) = fixtures::step_dataset(10);
    let rows: Vec<usize> = (0..10).collect();
    let tree = RegressionTree::fit_mean(&x, y.as_slice().unwrap(), &rows, 0);
    assert_eq!(tree.n_leaves(), 1);
    assert_abs_diff_eq!(tree.predict_row(x.row(0)), 1.0);
  }

  #[test]
  fn max_depth_is_respected() {
    let (x, y) = fixtures::linear_dataset(200, 0.5, 8);
    let rows: Vec<usize> = (0..200).collect();
    let tree = RegressionTree::fit_mean(&x, y.as_slice().unwrap(), &rows, 3);
    assert!(tree.depth() <= 3);
    assert!(tree.n_leaves() <= 8);
  }

  #[test]
  fn second_order_leaves_are_shrunk_by_lambda() {
    let x = array![[0.0], [0.0], [0.0]];
    let grad = [-1.0, -1.0, -1.0];
    let hess = [1.0, 1.0, 1.0];
    let params = TreeParams {
      max_depth: 3,
      lambda: 1.0,
      gamma: 0.0,
      min_child_weight: 1.0,
    };
    let tree = RegressionTree::grow(&x, &grad, &hess, &[0, 1, 2], &params);
    // G = -3, H = 3: w = 3 / (3 + 1)
    assert_abs_diff_eq!(tree.predict_row(x.row(0)), 0.75);
  }

  #[test]
  fn min_child_weight_blocks_small_children() {
    let x = array![[0.0], [1.0], [2.0], [3.0]];
    let grad = [1.0, 1.0, -1.0, -1.0];
    let hess = [1.0; 4];
    let params = TreeParams {
      max_depth: 5,
      lambda: 0.0,
      gamma: 0.0,
      min_child_weight: 3.0,
    };
    let tree = RegressionTree::grow(&x, &grad, &hess, &[0, 1, 2, 3], &params);
    assert_eq!(tree.n_leaves(), 1);
  }

  #[test]
  fn gamma_prunes_weak_splits() {
    let (x, y) = fixtures::step_dataset(20);
    let grad: Vec<f64> = y.iter().map(|v| -v).collect();
    let hess = vec![1.0; 20];
    let rows: Vec<usize> = (0..20).collect();
    let mut params = TreeParams::cart(4);
    params.gamma = 1e6;
    let tree = RegressionTree::grow(&x, &grad, &hess, &rows, &params);
    assert_eq!(tree.n_leaves(), 1);
  }
}
