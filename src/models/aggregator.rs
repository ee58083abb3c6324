//! Distribution averaging for multi-model ensemble

use ndarray::{Array3, Axis};

use super::errors::EnsembleError;

/// Reorder a `(batch, position, class)` score tensor into
/// `(batch, class, position)` layout.
pub fn align_class_axis(output: &Array3<f32>) -> Array3<f32> {
    output
        .view()
        .permuted_axes([0, 2, 1])
        .as_standard_layout()
        .into_owned()
}

/// Averages per-model score tensors into a single `(batch, class, position)` tensor.
///
/// Every member must produce the same shape as the first one accumulated.
#[derive(Debug, Default)]
pub struct DistributionAverager {
    sum: Option<Array3<f32>>,
    members: usize,
}

impl DistributionAverager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one member's output, given in `(batch, position, class)` layout.
    pub fn accumulate(&mut self, model: &str, output: &Array3<f32>) -> Result<(), EnsembleError> {
        let aligned = align_class_axis(output);
        if let Some(sum) = self.sum.as_mut() {
            if sum.shape() != aligned.shape() {
                return Err(EnsembleError::ShapeMismatch {
                    model: model.to_string(),
                    expected: sum.shape().to_vec(),
                    actual: aligned.shape().to_vec(),
                });
            }
            *sum += &aligned;
        } else {
            self.sum = Some(aligned);
        }
        self.members += 1;
        Ok(())
    }

    /// Number of outputs accumulated so far.
    pub fn member_count(&self) -> usize {
        self.members
    }

    /// Divide the running sum by the member count.
    pub fn finish(self) -> Result<Array3<f32>, EnsembleError> {
        let mut sum = self.sum.ok_or(EnsembleError::NoMembers)?;
        sum /= self.members as f32;
        Ok(sum)
    }
}

/// Arg-max class id at every position of a `(batch, class, position)` tensor.
///
/// Ties resolve to the lowest class id.
pub fn argmax_classes(scores: &Array3<f32>) -> Vec<Vec<usize>> {
    scores
        .axis_iter(Axis(0))
        .map(|sample| {
            sample
                .axis_iter(Axis(1))
                .map(|position| {
                    let mut best = 0;
                    let mut best_score = f32::NEG_INFINITY;
                    for (class, &score) in position.iter().enumerate() {
                        if score > best_score {
                            best = class;
                            best_score = score;
                        }
                    }
                    best
                })
                .collect()
        })
        .collect()
}

/// Count positions where a member's arg-max matches the ensemble's, as `(agreeing, total)`.
///
/// Each row is compared up to and including the ensemble's first `end_id`;
/// the padding after it is never decoded and is not counted.
pub fn agreement(member: &[Vec<usize>], ensemble: &[Vec<usize>], end_id: usize) -> (u64, u64) {
    let mut agree = 0;
    let mut total = 0;
    for (m, e) in member.iter().zip(ensemble) {
        let decoded = e.iter().position(|&id| id == end_id).map_or(e.len(), |p| p + 1);
        for (a, b) in m.iter().zip(e).take(decoded) {
            total += 1;
            if a == b {
                agree += 1;
            }
        }
    }
    (agree, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn output(values: [[f32; 3]; 2]) -> Array3<f32> {
        // one sample, two positions, three classes
        Array3::from_shape_fn((1, 2, 3), |(_, p, c)| values[p][c])
    }

    #[test]
    fn test_align_class_axis() {
        let aligned = align_class_axis(&output([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
        assert_eq!(aligned.shape(), &[1, 3, 2]);
        assert_eq!(aligned[[0, 2, 0]], 3.0);
        assert_eq!(aligned[[0, 0, 1]], 4.0);
    }

    #[test]
    fn test_average_of_two_members() {
        let mut averager = DistributionAverager::new();
        averager
            .accumulate("a", &output([[0.2, 0.8, 0.0], [1.0, 0.0, 0.0]]))
            .unwrap();
        averager
            .accumulate("b", &output([[0.6, 0.0, 0.4], [0.0, 0.0, 1.0]]))
            .unwrap();
        assert_eq!(averager.member_count(), 2);

        let mean = averager.finish().unwrap();
        let expected: Array3<f32> = array![[[0.4, 0.5], [0.4, 0.0], [0.2, 0.5]]];
        for (got, want) in mean.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_average_is_order_independent() {
        let members = [
            output([[0.1, 0.7, 0.2], [0.3, 0.3, 0.4]]),
            output([[0.5, 0.25, 0.25], [0.9, 0.05, 0.05]]),
            output([[0.0, 0.0, 1.0], [0.2, 0.6, 0.2]]),
        ];

        let mean_of = |order: [usize; 3]| {
            let mut averager = DistributionAverager::new();
            for i in order {
                averager.accumulate("m", &members[i]).unwrap();
            }
            averager.finish().unwrap()
        };

        let forward = mean_of([0, 1, 2]);
        let reversed = mean_of([2, 1, 0]);
        for (a, b) in forward.iter().zip(reversed.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let mut averager = DistributionAverager::new();
        averager.accumulate("a", &Array3::zeros((1, 2, 3))).unwrap();

        let err = averager
            .accumulate("b", &Array3::zeros((1, 2, 4)))
            .unwrap_err();
        assert!(matches!(err, EnsembleError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_finish_without_members() {
        let err = DistributionAverager::new().finish().unwrap_err();
        assert!(matches!(err, EnsembleError::NoMembers));
    }

    #[test]
    fn test_argmax_ties_pick_lowest_class() {
        let scores = align_class_axis(&output([[0.5, 0.5, 0.1], [0.0, 0.2, 0.9]]));
        assert_eq!(argmax_classes(&scores), vec![vec![0, 2]]);
    }

    #[test]
    fn test_agreement_counts_positions() {
        let member = vec![vec![1, 2, 3], vec![4]];
        let ensemble = vec![vec![1, 0, 3], vec![4]];
        assert_eq!(agreement(&member, &ensemble, 9), (3, 4));
    }

    #[test]
    fn test_agreement_stops_at_ensemble_end() {
        // end id 1: the ensemble row decodes [5, <EOS>], the rest is padding
        let member = vec![vec![5, 1, 2, 2], vec![6, 7, 1, 3]];
        let ensemble = vec![vec![5, 1, 4, 4], vec![6, 1, 0, 0]];
        assert_eq!(agreement(&member, &ensemble, 1), (3, 4));
    }
}
