//! Tagged forward-pass output

use ndarray::Array2;

/// Output of a forward pass.
///
/// The prediction tensor is always `[batch, pred_dim]`. The extra payloads
/// appear only in the documented configurations: a sparsity term when the
/// tabular branch is attentive, raw tabular features when feature smoothing
/// runs in training mode.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// Plain prediction
    Prediction(Array2<f64>),
    /// Prediction plus the attentive branch's sparsity regularization term
    WithSparsityLoss(Array2<f64>, f64),
    /// Prediction plus the raw pre-smoothing tabular features the trainer
    /// feeds back into the smoothing statistics
    WithFeatures(Array2<f64>, Array2<f64>),
}

impl ModelOutput {
    /// The numeric prediction, whatever the variant
    pub fn prediction(&self) -> &Array2<f64> {
        match self {
            Self::Prediction(p) => p,
            Self::WithSparsityLoss(p, _) => p,
            Self::WithFeatures(p, _) => p,
        }
    }

    /// Consume the output, keeping only the prediction
    pub fn into_prediction(self) -> Array2<f64> {
        match self {
            Self::Prediction(p) => p,
            Self::WithSparsityLoss(p, _) => p,
            Self::WithFeatures(p, _) => p,
        }
    }

    /// Sparsity regularization term, if the configuration produces one
    pub fn sparsity_loss(&self) -> Option<f64> {
        match self {
            Self::WithSparsityLoss(_, loss) => Some(*loss),
            _ => None,
        }
    }

    /// Raw pre-smoothing tabular features, if the configuration produces them
    pub fn raw_features(&self) -> Option<&Array2<f64>> {
        match self {
            Self::WithFeatures(_, features) => Some(features),
            _ => None,
        }
    }

    /// Transform the prediction in place, leaving auxiliary payloads alone
    pub(crate) fn map_prediction<F>(self, f: F) -> Self
    where
        F: FnOnce(&Array2<f64>) -> Array2<f64>,
    {
        match self {
            Self::Prediction(p) => Self::Prediction(f(&p)),
            Self::WithSparsityLoss(p, loss) => Self::WithSparsityLoss(f(&p), loss),
            Self::WithFeatures(p, features) => Self::WithFeatures(f(&p), features),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_per_variant() {
        let pred = Array2::from_elem((2, 1), 0.5);
        let features = Array2::from_elem((2, 4), 1.0);

        let plain = ModelOutput::Prediction(pred.clone());
        assert_eq!(plain.prediction(), &pred);
        assert_eq!(plain.sparsity_loss(), None);
        assert!(plain.raw_features().is_none());

        let sparse = ModelOutput::WithSparsityLoss(pred.clone(), 0.25);
        assert_eq!(sparse.sparsity_loss(), Some(0.25));

        let smoothed = ModelOutput::WithFeatures(pred, features.clone());
        assert_eq!(smoothed.raw_features(), Some(&features));
    }

    #[test]
    fn test_map_prediction_keeps_auxiliaries() {
        let pred = Array2::from_elem((2, 1), -1.0);
        let out = ModelOutput::WithSparsityLoss(pred, 0.5).map_prediction(|p| p.mapv(f64::abs));

        assert_eq!(out.prediction()[[0, 0]], 1.0);
        assert_eq!(out.sparsity_loss(), Some(0.5));
    }
}
