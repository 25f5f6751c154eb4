//! Normalization math.
//!
//! The regression link functions and their single- and multi-output
//! application. The probit link integrates the standard normal density with
//! tolerance-bounded adaptive quadrature; every other link is closed-form.

use crate::error::{Result, ScoreError};

/// A regression normalization method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizationMethod {
    #[default]
    None,
    Simplemax,
    Softmax,
    Logit,
    Probit,
    Cloglog,
    Exp,
    Loglog,
    Cauchit,
}

impl NormalizationMethod {
    /// Parse a `normalizationMethod` attribute; unknown values fall back to
    /// `None`.
    pub fn from_name(name: &str) -> NormalizationMethod {
        match name.to_ascii_lowercase().as_str() {
            "simplemax" => NormalizationMethod::Simplemax,
            "softmax" => NormalizationMethod::Softmax,
            "logit" => NormalizationMethod::Logit,
            "probit" => NormalizationMethod::Probit,
            "cloglog" => NormalizationMethod::Cloglog,
            "exp" => NormalizationMethod::Exp,
            "loglog" => NormalizationMethod::Loglog,
            "cauchit" => NormalizationMethod::Cauchit,
            _ => NormalizationMethod::None,
        }
    }

    /// Normalize the single raw score of a regression target. `softmax`
    /// degenerates to the logit link in the single-output case.
    pub fn single(&self, score: f64) -> Result<f64> {
        match self {
            NormalizationMethod::None => Ok(score),
            NormalizationMethod::Softmax | NormalizationMethod::Logit => Ok(logit(score)),
            NormalizationMethod::Probit => Ok(probit(score)),
            NormalizationMethod::Cloglog => Ok(cloglog(score)),
            NormalizationMethod::Exp => Ok(score.exp()),
            NormalizationMethod::Loglog => Ok(loglog(score)),
            NormalizationMethod::Cauchit => Ok(cauchit(score)),
            NormalizationMethod::Simplemax => Err(ScoreError::Parsing(
                "simplemax is not a single-output normalization".to_string(),
            )),
        }
    }

    /// Normalize the per-class raw scores of a classification target.
    pub fn categorical(&self, scores: &[f64]) -> Result<Vec<f64>> {
        match self {
            NormalizationMethod::Softmax => {
                let exps: Vec<f64> = scores.iter().map(|score| score.exp()).collect();
                let sum: f64 = exps.iter().sum();
                Ok(exps.into_iter().map(|value| value / sum).collect())
            }
            NormalizationMethod::Simplemax => {
                let sum: f64 = scores.iter().sum();
                Ok(scores.iter().map(|score| score / sum).collect())
            }
            NormalizationMethod::None => {
                let mut result: Vec<f64> = scores[..scores.len() - 1].to_vec();
                result.push(1.0 - result.iter().sum::<f64>());
                if scores.len() == 2 {
                    result[0] = clamp_unit(result[0]);
                    result[1] = clamp_unit(result[1]);
                }
                Ok(result)
            }
            NormalizationMethod::Logit => two_class(scores, logit, "logit"),
            NormalizationMethod::Probit => two_class(scores, probit, "probit"),
            NormalizationMethod::Cloglog => two_class(scores, cloglog, "cloglog"),
            NormalizationMethod::Loglog => two_class(scores, loglog, "loglog"),
            NormalizationMethod::Cauchit => two_class(scores, cauchit, "cauchit"),
            NormalizationMethod::Exp => Err(ScoreError::Parsing(
                "exp is not a multi-output normalization".to_string(),
            )),
        }
    }
}

/// Binomial links: the first score goes through the link, the second class
/// takes the complement. Any other cardinality is undefined.
fn two_class(scores: &[f64], link: fn(f64) -> f64, name: &str) -> Result<Vec<f64>> {
    if scores.len() != 2 {
        return Err(ScoreError::Math(format!(
            "{name} must have exactly 2 inputs"
        )));
    }
    let first = link(scores[0]);
    Ok(vec![first, 1.0 - first])
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

pub fn logit(a: f64) -> f64 {
    1.0 / (1.0 + (-a).exp())
}

pub fn cloglog(a: f64) -> f64 {
    1.0 - (-a.exp()).exp()
}

pub fn loglog(a: f64) -> f64 {
    (-a.exp()).exp()
}

pub fn cauchit(a: f64) -> f64 {
    0.5 + a.atan() / std::f64::consts::PI
}

/// Standard normal CDF by adaptive quadrature of the density. The lower
/// bound is where the density is numerically negligible.
pub fn probit(a: f64) -> f64 {
    const LOWER_BOUND: f64 = -12.0;
    if a <= LOWER_BOUND {
        return 0.0;
    }
    integral(normal_density, LOWER_BOUND, a, 1e-10)
}

fn normal_density(x: f64) -> f64 {
    (1.0 / (2.0 * std::f64::consts::PI).sqrt()) * (-0.5 * x * x).exp()
}

/// Adaptive Simpson quadrature with an absolute tolerance bound.
fn integral(f: fn(f64) -> f64, lo: f64, hi: f64, tolerance: f64) -> f64 {
    let mid = (lo + hi) / 2.0;
    let whole = simpson(f, lo, hi);
    adaptive(f, lo, mid, hi, whole, tolerance, 48)
}

fn simpson(f: fn(f64) -> f64, lo: f64, hi: f64) -> f64 {
    let mid = (lo + hi) / 2.0;
    (hi - lo) / 6.0 * (f(lo) + 4.0 * f(mid) + f(hi))
}

fn adaptive(
    f: fn(f64) -> f64,
    lo: f64,
    mid: f64,
    hi: f64,
    whole: f64,
    tolerance: f64,
    depth: u32,
) -> f64 {
    let left = simpson(f, lo, mid);
    let right = simpson(f, mid, hi);
    let delta = left + right - whole;
    if depth == 0 || delta.abs() <= 15.0 * tolerance {
        return left + right + delta / 15.0;
    }
    adaptive(f, lo, (lo + mid) / 2.0, mid, left, tolerance / 2.0, depth - 1)
        + adaptive(f, mid, (mid + hi) / 2.0, hi, right, tolerance / 2.0, depth - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_distributes_to_one() {
        let result = NormalizationMethod::Softmax
            .categorical(&[2.0, 0.0, -1.0])
            .unwrap();
        let sum: f64 = result.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!(result[0] > result[1] && result[1] > result[2]);
    }

    #[test]
    fn simplemax_divides_by_the_sum() {
        let result = NormalizationMethod::Simplemax
            .categorical(&[1.0, 3.0])
            .unwrap();
        assert_eq!(result, vec![0.25, 0.75]);
    }

    #[test]
    fn none_with_two_inputs_clamps() {
        let result = NormalizationMethod::None.categorical(&[1.4, 0.2]).unwrap();
        assert_eq!(result[0], 1.0);
        assert_eq!(result[1], 0.0);
    }

    #[test]
    fn none_emits_complement_as_last_component() {
        let result = NormalizationMethod::None
            .categorical(&[0.2, 0.3, 0.0])
            .unwrap();
        assert!((result[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn cauchit_requires_two_inputs() {
        assert!(matches!(
            NormalizationMethod::Cauchit.categorical(&[1.0, 2.0, 3.0]),
            Err(ScoreError::Math(_))
        ));
        let result = NormalizationMethod::Cauchit.categorical(&[0.0, 0.0]).unwrap();
        assert!((result[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn probit_matches_the_normal_cdf() {
        assert!((probit(0.0) - 0.5).abs() < 1e-7);
        assert!((probit(1.959964) - 0.975).abs() < 1e-5);
        assert!((probit(-1.959964) - 0.025).abs() < 1e-5);
        assert!(probit(-20.0).abs() < 1e-12);
    }

    #[test]
    fn single_softmax_is_the_logit_link() {
        assert_eq!(
            NormalizationMethod::Softmax.single(1.3).unwrap(),
            NormalizationMethod::Logit.single(1.3).unwrap()
        );
    }
}
