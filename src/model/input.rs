//! Per-branch input batch

use ndarray::Array2;

/// Input batch for a forward pass, one optional tensor per branch.
///
/// The set of inputs supplied must match the set of branches the model was
/// built with: an input for an unconfigured branch and a missing input for a
/// configured branch both fail the forward pass. The branch keys reported in
/// those errors are `wide`, `deeptabular`, `deeptext` and `deepimage`.
#[derive(Debug, Clone, Default)]
pub struct ModelInput {
    wide: Option<Array2<f64>>,
    tabular: Option<Array2<f64>>,
    text: Option<Array2<f64>>,
    image: Option<Array2<f64>>,
}

impl ModelInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wide(mut self, x: Array2<f64>) -> Self {
        self.wide = Some(x);
        self
    }

    pub fn with_tabular(mut self, x: Array2<f64>) -> Self {
        self.tabular = Some(x);
        self
    }

    pub fn with_text(mut self, x: Array2<f64>) -> Self {
        self.text = Some(x);
        self
    }

    pub fn with_image(mut self, x: Array2<f64>) -> Self {
        self.image = Some(x);
        self
    }

    pub fn wide(&self) -> Option<&Array2<f64>> {
        self.wide.as_ref()
    }

    pub fn tabular(&self) -> Option<&Array2<f64>> {
        self.tabular.as_ref()
    }

    pub fn text(&self) -> Option<&Array2<f64>> {
        self.text.as_ref()
    }

    pub fn image(&self) -> Option<&Array2<f64>> {
        self.image.as_ref()
    }

    /// Row count of the first present input, `None` for a batch with no
    /// inputs at all
    pub fn batch_size(&self) -> Option<usize> {
        [&self.wide, &self.tabular, &self.text, &self.image]
            .iter()
            .find_map(|x| x.as_ref().map(|a| a.nrows()))
    }
}
