//! Query-by-Committee.
//!
//! A committee of classifiers is fitted on the labeled data; candidates on
//! which the members disagree most are queried first.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView2};

use super::{QueryRequest, QueryResult, QueryStrategy, select_batch};
use crate::candidates::resolve_candidates;
use crate::error::{QueryError, Result};
use crate::labels::MissingLabel;
use crate::model::ProbabilisticClassifier;
use crate::utils::seeded_rng;

/// Option key controlling whether members are refitted before scoring.
pub const FIT_ENSEMBLE: &str = "fit_ensemble";

// =============================================================================
// CommitteeMethod
// =============================================================================

/// Disagreement measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitteeMethod {
    /// Mean KL divergence of each member from the consensus distribution.
    #[default]
    KlDivergence,
    /// Entropy of the members' hard votes.
    VoteEntropy,
}

impl fmt::Display for CommitteeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitteeMethod::KlDivergence => f.write_str("KL_divergence"),
            CommitteeMethod::VoteEntropy => f.write_str("vote_entropy"),
        }
    }
}

impl FromStr for CommitteeMethod {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "KL_divergence" | "kl_divergence" => Ok(CommitteeMethod::KlDivergence),
            "vote_entropy" => Ok(CommitteeMethod::VoteEntropy),
            other => Err(QueryError::invalid_value(
                "method",
                format!("must be \"KL_divergence\" or \"vote_entropy\", got {other:?}"),
            )),
        }
    }
}

// =============================================================================
// QueryByCommittee
// =============================================================================

/// Query-by-Committee strategy.
///
/// Reads the bool option `fit_ensemble` (default `true`). With `false` the
/// members are used as given and must already be fitted.
#[derive(Debug, Clone)]
pub struct QueryByCommittee<C> {
    /// Committee members; all must share the same classes.
    pub ensemble: Vec<C>,
    /// Disagreement measure.
    pub method: CommitteeMethod,
    /// Missing-label sentinel. Default: `NaN`.
    pub missing_label: MissingLabel,
    /// Seed for tie-breaking.
    pub seed: u64,
}

impl<C: ProbabilisticClassifier> QueryByCommittee<C> {
    pub fn new(ensemble: Vec<C>) -> Self {
        let missing_label = ensemble
            .first()
            .map(|m| m.missing_label())
            .unwrap_or_default();
        Self {
            ensemble,
            method: CommitteeMethod::default(),
            missing_label,
            seed: 0,
        }
    }

    pub fn with_method(mut self, method: CommitteeMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_missing_label(mut self, missing_label: MissingLabel) -> Self {
        self.missing_label = missing_label;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<&[f64]> {
        let first = self
            .ensemble
            .first()
            .ok_or_else(|| QueryError::invalid_value("ensemble", "must contain at least one member"))?;
        let classes = first.classes();
        if let Some(other) = self.ensemble.iter().find(|m| m.classes() != classes) {
            return Err(QueryError::ClassMismatch {
                given: classes.to_vec(),
                model: other.classes().to_vec(),
            });
        }
        Ok(classes)
    }

    /// Class probabilities of every member, fitted on `(x, y)` if requested.
    fn member_probas(
        &self,
        request: &QueryRequest<'_>,
        candidates: ArrayView2<'_, f64>,
        fit: bool,
    ) -> Result<Vec<Array2<f64>>> {
        self.ensemble
            .iter()
            .map(|member| -> Result<Array2<f64>> {
                let proba = if fit {
                    let mut member = member.clone();
                    member.fit(request.x, request.y)?;
                    member.predict_proba(candidates)?
                } else {
                    member.predict_proba(candidates)?
                };
                Ok(proba)
            })
            .collect()
    }
}

impl<C: ProbabilisticClassifier> QueryStrategy for QueryByCommittee<C> {
    fn query(&self, request: &QueryRequest<'_>) -> Result<QueryResult> {
        let classes = self.validate()?;
        request.validate(self.missing_label)?;
        let fit = request.options.get_bool(FIT_ENSEMBLE, true)?;

        let resolved = resolve_candidates(request.x, request.y, &request.candidates, self.missing_label)?;
        tracing::debug!(
            method = %self.method,
            n_members = self.ensemble.len(),
            n_candidates = resolved.n_candidates(),
            fit,
            "query by committee"
        );

        let probas = self.member_probas(request, resolved.features.view(), fit)?;
        let scores = match self.method {
            CommitteeMethod::KlDivergence => average_kl_divergence(&probas),
            CommitteeMethod::VoteEntropy => vote_entropy(&probas, classes.len()),
        };

        let utilities = resolved.scatter(scores.view(), request.x.nrows());
        let mut rng = seeded_rng(self.seed);
        select_batch(utilities, request.batch_size, request.return_utilities, &mut rng)
    }

    fn missing_label(&self) -> MissingLabel {
        self.missing_label
    }
}

// =============================================================================
// Disagreement measures
// =============================================================================

/// Mean KL divergence of each member's distribution from the consensus.
pub fn average_kl_divergence(probas: &[Array2<f64>]) -> Array1<f64> {
    let Some(first) = probas.first() else {
        return Array1::zeros(0);
    };
    let n_members = probas.len() as f64;
    let mut consensus = Array2::<f64>::zeros(first.raw_dim());
    for p in probas {
        consensus += p;
    }
    consensus /= n_members;

    let mut scores = Array1::<f64>::zeros(first.nrows());
    for p in probas {
        for (n, (row, cons)) in p.rows().into_iter().zip(consensus.rows()).enumerate() {
            scores[n] += row
                .iter()
                .zip(cons.iter())
                .filter(|&(&pi, _)| pi > 0.0)
                .map(|(&pi, &ci)| pi * (pi / ci).ln())
                .sum::<f64>();
        }
    }
    scores / n_members
}

/// Entropy of the distribution of hard votes.
pub fn vote_entropy(probas: &[Array2<f64>], n_classes: usize) -> Array1<f64> {
    let Some(first) = probas.first() else {
        return Array1::zeros(0);
    };
    let n_members = probas.len() as f64;
    let mut votes = Array2::<f64>::zeros((first.nrows(), n_classes));
    for p in probas {
        for (n, row) in p.rows().into_iter().enumerate() {
            // First maximum wins, matching a plain arg-max.
            let mut best = 0;
            for (c, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = c;
                }
            }
            votes[[n, best]] += 1.0;
        }
    }
    votes.map_axis(ndarray::Axis(1), |row| {
        -row.iter()
            .filter(|&&v| v > 0.0)
            .map(|&v| {
                let f = v / n_members;
                f * f.ln()
            })
            .sum::<f64>()
    })
}
