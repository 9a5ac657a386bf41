//! The Wide & Deep collector
//!
//! Assembles a prediction model from independently built sub-networks: a
//! wide (linear) branch plus up to three deep branches (tabular, text,
//! image), combined additively into a `[batch, pred_dim]` prediction. The
//! deep side is either merged through a combined head or projected per
//! branch; all wiring is validated and frozen at construction.

use std::fmt;

use ndarray::{concatenate, Array1, Array2, Axis};
use tracing::{debug, warn};

use crate::components::{AttentiveComponent, HeadComponent, ModelComponent, TabularComponent};
use crate::error::{Result, WideDeepError};
use crate::fds::{FdsConfig, FdsLayer};
use crate::layers::{offset_seed, Dropout, Linear, Mlp, MlpConfig, PositiveActivation};
use crate::model::input::ModelInput;
use crate::model::output::ModelOutput;

/// Builder for [`WideDeep`].
///
/// Branches and head options are supplied through `with_*` setters; `build`
/// validates the combination and freezes the architecture. All configuration
/// failures surface here, never during a forward pass.
pub struct WideDeepBuilder {
    wide: Option<Box<dyn ModelComponent>>,
    tabular: Option<TabularComponent>,
    text: Option<Box<dyn ModelComponent>>,
    image: Option<Box<dyn ModelComponent>>,
    custom_head: Option<Box<dyn HeadComponent>>,
    head_config: Option<MlpConfig>,
    fds: bool,
    fds_config: Option<FdsConfig>,
    enforce_positive: Option<PositiveActivation>,
    pred_dim: usize,
    random_state: Option<u64>,
}

impl Default for WideDeepBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WideDeepBuilder {
    pub fn new() -> Self {
        Self {
            wide: None,
            tabular: None,
            text: None,
            image: None,
            custom_head: None,
            head_config: None,
            fds: false,
            fds_config: None,
            enforce_positive: None,
            pred_dim: 1,
            random_state: Some(42),
        }
    }

    /// Wide (linear) branch; its output width must equal `pred_dim`
    pub fn with_wide<C: ModelComponent + 'static>(mut self, wide: C) -> Self {
        self.wide = Some(Box::new(wide));
        self
    }

    /// Dense tabular branch
    pub fn with_tabular<C: ModelComponent + 'static>(mut self, tabular: C) -> Self {
        self.tabular = Some(TabularComponent::Dense(Box::new(tabular)));
        self
    }

    /// Attentive tabular branch whose forward also yields a sparsity term
    pub fn with_attentive_tabular<C: AttentiveComponent + 'static>(mut self, tabular: C) -> Self {
        self.tabular = Some(TabularComponent::Attentive(Box::new(tabular)));
        self
    }

    /// Text branch
    pub fn with_text<C: ModelComponent + 'static>(mut self, text: C) -> Self {
        self.text = Some(Box::new(text));
        self
    }

    /// Image branch
    pub fn with_image<C: ModelComponent + 'static>(mut self, image: C) -> Self {
        self.image = Some(Box::new(image));
        self
    }

    /// Caller-built head over the concatenated deep activations
    pub fn with_custom_head<C: HeadComponent + 'static>(mut self, head: C) -> Self {
        self.custom_head = Some(Box::new(head));
        self
    }

    /// Build a dense head over the concatenated deep activations
    pub fn with_head(mut self, config: MlpConfig) -> Self {
        self.head_config = Some(config);
        self
    }

    /// Enable feature distribution smoothing with default settings
    pub fn with_smoothing(mut self) -> Self {
        self.fds = true;
        self
    }

    /// Enable feature distribution smoothing with explicit settings
    pub fn with_smoothing_config(mut self, config: FdsConfig) -> Self {
        self.fds = true;
        self.fds_config = Some(config);
        self
    }

    /// Clamp predictions to be non-negative with the given activation
    pub fn with_enforce_positive(mut self, activation: PositiveActivation) -> Self {
        self.enforce_positive = Some(activation);
        self
    }

    /// Output width of the assembled model (default 1)
    pub fn with_pred_dim(mut self, pred_dim: usize) -> Self {
        self.pred_dim = pred_dim;
        self
    }

    /// Random seed for the projections the model builds itself
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Validate the configuration and assemble the model
    pub fn build(self) -> Result<WideDeep> {
        let WideDeepBuilder {
            wide,
            tabular,
            text,
            image,
            custom_head,
            head_config,
            fds,
            fds_config,
            enforce_positive,
            pred_dim,
            random_state,
        } = self;

        if pred_dim == 0 {
            return Err(WideDeepError::ConfigError(
                "pred_dim must be at least 1".to_string(),
            ));
        }

        let has_deep = tabular.is_some() || text.is_some() || image.is_some();
        if wide.is_none() && !has_deep {
            return Err(WideDeepError::ConfigError(
                "at least one branch is required".to_string(),
            ));
        }

        if let Some(component) = &wide {
            if component.output_dim() != pred_dim {
                return Err(WideDeepError::DimensionMismatch {
                    context: "wide output width".to_string(),
                    expected: pred_dim,
                    actual: component.output_dim(),
                });
            }
        }

        if matches!(&tabular, Some(TabularComponent::Attentive(_)))
            && (wide.is_some() || text.is_some() || image.is_some())
        {
            warn!(
                "Attentive tabular branch combined with other branches; its sparsity \
                 regularization and per-sample importances are diluted"
            );
        }

        if custom_head.is_some() && head_config.is_some() {
            return Err(WideDeepError::ConfigError(
                "custom head and head hidden dims are mutually exclusive".to_string(),
            ));
        }
        if (custom_head.is_some() || head_config.is_some()) && !has_deep {
            return Err(WideDeepError::ConfigError(
                "a combined head requires at least one deep branch".to_string(),
            ));
        }

        let deep_width = tabular.as_ref().map_or(0, |t| t.output_dim())
            + text.as_ref().map_or(0, |c| c.output_dim())
            + image.as_ref().map_or(0, |c| c.output_dim());

        if let Some(head) = &custom_head {
            if head.input_dim() != deep_width {
                return Err(WideDeepError::DimensionMismatch {
                    context: "custom head input width".to_string(),
                    expected: deep_width,
                    actual: head.input_dim(),
                });
            }
        }

        // smoothing preconditions, binding the widths its mode needs
        let smoothing = if fds {
            if custom_head.is_some() || head_config.is_some() {
                return Err(WideDeepError::ConfigError(
                    "feature smoothing cannot be combined with a head".to_string(),
                ));
            }
            if pred_dim != 1 {
                return Err(WideDeepError::ConfigError(format!(
                    "feature smoothing requires pred_dim == 1, got {}",
                    pred_dim
                )));
            }
            let (feature_dim, dropout_rate) = match &tabular {
                Some(TabularComponent::Dense(component)) => {
                    (component.output_dim(), component.dropout_rate())
                }
                Some(TabularComponent::Attentive(_)) => {
                    return Err(WideDeepError::ConfigError(
                        "feature smoothing requires a dense tabular branch".to_string(),
                    ))
                }
                None => {
                    return Err(WideDeepError::ConfigError(
                        "feature smoothing requires a tabular branch".to_string(),
                    ))
                }
            };
            // text and image contributions are added unprojected in this mode
            if let Some(component) = &text {
                if component.output_dim() != pred_dim {
                    return Err(WideDeepError::DimensionMismatch {
                        context: "text branch width under smoothing".to_string(),
                        expected: pred_dim,
                        actual: component.output_dim(),
                    });
                }
            }
            if let Some(component) = &image {
                if component.output_dim() != pred_dim {
                    return Err(WideDeepError::DimensionMismatch {
                        context: "image branch width under smoothing".to_string(),
                        expected: pred_dim,
                        actual: component.output_dim(),
                    });
                }
            }
            Some((feature_dim, dropout_rate))
        } else {
            None
        };

        let mode = if let Some(config) = head_config {
            let net = Mlp::new(deep_width, &config);
            let project = Linear::new(net.output_dim(), pred_dim, offset_seed(random_state, 0));
            debug!(mode = "built head", width = deep_width, "Assembled combine mode");
            CombineMode::Head {
                net: HeadNet::Built(net),
                project,
            }
        } else if let Some(head) = custom_head {
            let project = Linear::new(head.output_dim(), pred_dim, offset_seed(random_state, 0));
            debug!(mode = "custom head", width = deep_width, "Assembled combine mode");
            CombineMode::Head {
                net: HeadNet::Custom(head),
                project,
            }
        } else if let Some((feature_dim, dropout_rate)) = smoothing {
            let mut config = fds_config.unwrap_or_default();
            if config.feature_dim == 0 {
                config.feature_dim = feature_dim;
            } else if config.feature_dim != feature_dim {
                return Err(WideDeepError::DimensionMismatch {
                    context: "smoothing feature width".to_string(),
                    expected: feature_dim,
                    actual: config.feature_dim,
                });
            }
            let layer = FdsLayer::new(config)?;
            let dropout = Dropout::new(dropout_rate, offset_seed(random_state, 4));
            let project = Linear::new(feature_dim, pred_dim, offset_seed(random_state, 0));
            debug!(mode = "smoothed", width = feature_dim, "Assembled combine mode");
            CombineMode::Smoothed {
                fds: layer,
                dropout,
                project,
            }
        } else {
            let tabular_project = tabular.as_ref().map(|tab| match tab {
                TabularComponent::Dense(component) => Linear::new(
                    component.output_dim(),
                    pred_dim,
                    offset_seed(random_state, 1),
                ),
                // the attentive prediction projection carries no bias
                TabularComponent::Attentive(component) => Linear::without_bias(
                    component.output_dim(),
                    pred_dim,
                    offset_seed(random_state, 1),
                ),
            });
            let text_project = text
                .as_ref()
                .map(|c| Linear::new(c.output_dim(), pred_dim, offset_seed(random_state, 2)));
            let image_project = image
                .as_ref()
                .map(|c| Linear::new(c.output_dim(), pred_dim, offset_seed(random_state, 3)));
            debug!(mode = "per branch", "Assembled combine mode");
            CombineMode::PerBranch {
                tabular_project,
                text_project,
                image_project,
            }
        };

        Ok(WideDeep {
            wide,
            tabular,
            text,
            image,
            mode,
            pred_dim,
            enforce_positive,
            training: true,
        })
    }
}

/// How the deep side is folded into the prediction, fixed at construction.
enum CombineMode {
    /// A head (built or caller-supplied) over the concatenated deep
    /// activations, followed by a terminal projection to `pred_dim`
    Head { net: HeadNet, project: Linear },
    /// Feature distribution smoothing over the dense tabular activations,
    /// then a direct projection to the single output
    Smoothed {
        fds: FdsLayer,
        dropout: Dropout,
        project: Linear,
    },
    /// One terminal projection per present deep branch
    PerBranch {
        tabular_project: Option<Linear>,
        text_project: Option<Linear>,
        image_project: Option<Linear>,
    },
}

enum HeadNet {
    Built(Mlp),
    Custom(Box<dyn HeadComponent>),
}

impl CombineMode {
    fn label(&self) -> &'static str {
        match self {
            Self::Head {
                net: HeadNet::Built(_),
                ..
            } => "built head",
            Self::Head {
                net: HeadNet::Custom(_),
                ..
            } => "custom head",
            Self::Smoothed { .. } => "smoothed",
            Self::PerBranch { .. } => "per branch",
        }
    }
}

/// Multi-branch additive prediction model.
///
/// The wide branch contributes directly to the prediction (a zero tensor
/// stands in when no wide branch is configured); deep branches contribute
/// through the combine mode chosen at construction. The only mutable toggle
/// after `build` is the training flag, which propagates to every owned layer
/// and sub-network.
pub struct WideDeep {
    wide: Option<Box<dyn ModelComponent>>,
    tabular: Option<TabularComponent>,
    text: Option<Box<dyn ModelComponent>>,
    image: Option<Box<dyn ModelComponent>>,
    mode: CombineMode,
    pred_dim: usize,
    enforce_positive: Option<PositiveActivation>,
    training: bool,
}

impl WideDeep {
    /// Start assembling a model
    pub fn builder() -> WideDeepBuilder {
        WideDeepBuilder::new()
    }

    pub fn pred_dim(&self) -> usize {
        self.pred_dim
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Set training mode on the model, its layers and its sub-networks
    pub fn train(&mut self) {
        self.set_training(true);
    }

    /// Set evaluation mode on the model, its layers and its sub-networks
    pub fn eval(&mut self) {
        self.set_training(false);
    }

    /// The smoothing layer, if the model was built with one
    pub fn smoothing(&self) -> Option<&FdsLayer> {
        match &self.mode {
            CombineMode::Smoothed { fds, .. } => Some(fds),
            _ => None,
        }
    }

    /// Mutable access to the smoothing layer for the trainer-side hooks
    pub fn smoothing_mut(&mut self) -> Option<&mut FdsLayer> {
        match &mut self.mode {
            CombineMode::Smoothed { fds, .. } => Some(fds),
            _ => None,
        }
    }

    /// Run a forward pass.
    ///
    /// In training mode a model built with smoothing needs
    /// [`forward_with_targets`](Self::forward_with_targets) instead.
    pub fn forward(&mut self, input: &ModelInput) -> Result<ModelOutput> {
        self.forward_impl(input, None)
    }

    /// Run a forward pass with targets and the current epoch.
    ///
    /// Targets are consulted only by the smoothing path while training; any
    /// other configuration behaves exactly like [`forward`](Self::forward).
    pub fn forward_with_targets(
        &mut self,
        input: &ModelInput,
        targets: &Array1<f64>,
        epoch: usize,
    ) -> Result<ModelOutput> {
        self.forward_impl(input, Some((targets, epoch)))
    }

    fn forward_impl(
        &mut self,
        input: &ModelInput,
        targets: Option<(&Array1<f64>, usize)>,
    ) -> Result<ModelOutput> {
        self.check_inputs(input)?;
        let batch = match input.batch_size() {
            Some(n) if n > 0 => n,
            _ => return Err(WideDeepError::EmptyBatch),
        };

        let Self {
            wide,
            tabular,
            text,
            image,
            mode,
            pred_dim,
            enforce_positive,
            training,
        } = self;
        let pred_dim = *pred_dim;
        let enforce_positive = *enforce_positive;
        let training = *training;

        // wide contribution, or the additive identity without a wide branch
        let mut sum = match (wide.as_mut(), input.wide()) {
            (Some(component), Some(x)) => {
                let out = component.forward(x)?;
                check_output("wide", &out, batch, pred_dim)?;
                out
            }
            _ => Array2::zeros((batch, pred_dim)),
        };

        let output = match mode {
            CombineMode::Head { net, project } => {
                let mut sparsity = None;
                let mut parts: Vec<Array2<f64>> = Vec::new();

                if let (Some(tab), Some(x)) = (tabular.as_mut(), input.tabular()) {
                    let out = match tab {
                        TabularComponent::Dense(component) => {
                            let out = component.forward(x)?;
                            check_output("deeptabular", &out, batch, component.output_dim())?;
                            out
                        }
                        TabularComponent::Attentive(component) => {
                            let (out, loss) = component.forward(x)?;
                            check_output("deeptabular", &out, batch, component.output_dim())?;
                            sparsity = Some(loss);
                            out
                        }
                    };
                    parts.push(out);
                }
                if let (Some(component), Some(x)) = (text.as_mut(), input.text()) {
                    let out = component.forward(x)?;
                    check_output("deeptext", &out, batch, component.output_dim())?;
                    parts.push(out);
                }
                if let (Some(component), Some(x)) = (image.as_mut(), input.image()) {
                    let out = component.forward(x)?;
                    check_output("deepimage", &out, batch, component.output_dim())?;
                    parts.push(out);
                }

                let views: Vec<_> = parts.iter().map(|a| a.view()).collect();
                let deep = concatenate(Axis(1), &views)?;

                let head_out = match net {
                    HeadNet::Built(mlp) => mlp.forward(&deep),
                    HeadNet::Custom(head) => {
                        let out = head.forward(&deep)?;
                        check_output("custom head", &out, batch, head.output_dim())?;
                        out
                    }
                };
                sum += &project.forward(&head_out);

                match sparsity {
                    Some(loss) => ModelOutput::WithSparsityLoss(sum, loss),
                    None => ModelOutput::Prediction(sum),
                }
            }

            CombineMode::Smoothed {
                fds,
                dropout,
                project,
            } => {
                let raw = match (tabular.as_mut(), input.tabular()) {
                    (Some(TabularComponent::Dense(component)), Some(x)) => {
                        let out = component.forward(x)?;
                        check_output("deeptabular", &out, batch, component.output_dim())?;
                        out
                    }
                    _ => {
                        return Err(WideDeepError::ConfigError(
                            "feature smoothing requires a dense tabular branch".to_string(),
                        ))
                    }
                };

                if training {
                    // short-circuits before text/image so the trainer gets
                    // the raw features for the smoothing statistics
                    let (targets, epoch) = targets.ok_or(WideDeepError::MissingTargets)?;
                    if targets.len() != batch {
                        return Err(WideDeepError::DimensionMismatch {
                            context: "target count".to_string(),
                            expected: batch,
                            actual: targets.len(),
                        });
                    }
                    let smoothed = fds.smooth(&raw, targets, epoch)?;
                    let smoothed = dropout.forward(&smoothed);
                    sum += &project.forward(&smoothed);
                    ModelOutput::WithFeatures(sum, raw)
                } else {
                    sum += &project.forward(&raw);
                    if let (Some(component), Some(x)) = (text.as_mut(), input.text()) {
                        let out = component.forward(x)?;
                        check_output("deeptext", &out, batch, component.output_dim())?;
                        sum += &out;
                    }
                    if let (Some(component), Some(x)) = (image.as_mut(), input.image()) {
                        let out = component.forward(x)?;
                        check_output("deepimage", &out, batch, component.output_dim())?;
                        sum += &out;
                    }
                    ModelOutput::Prediction(sum)
                }
            }

            CombineMode::PerBranch {
                tabular_project,
                text_project,
                image_project,
            } => {
                let mut sparsity = None;

                if let (Some(tab), Some(x)) = (tabular.as_mut(), input.tabular()) {
                    let out = match tab {
                        TabularComponent::Dense(component) => {
                            let out = component.forward(x)?;
                            check_output("deeptabular", &out, batch, component.output_dim())?;
                            out
                        }
                        TabularComponent::Attentive(component) => {
                            let (out, loss) = component.forward(x)?;
                            check_output("deeptabular", &out, batch, component.output_dim())?;
                            sparsity = Some(loss);
                            out
                        }
                    };
                    if let Some(project) = tabular_project.as_ref() {
                        sum += &project.forward(&out);
                    }
                }
                if let (Some(component), Some(x)) = (text.as_mut(), input.text()) {
                    let out = component.forward(x)?;
                    check_output("deeptext", &out, batch, component.output_dim())?;
                    if let Some(project) = text_project.as_ref() {
                        sum += &project.forward(&out);
                    }
                }
                if let (Some(component), Some(x)) = (image.as_mut(), input.image()) {
                    let out = component.forward(x)?;
                    check_output("deepimage", &out, batch, component.output_dim())?;
                    if let Some(project) = image_project.as_ref() {
                        sum += &project.forward(&out);
                    }
                }

                match sparsity {
                    Some(loss) => ModelOutput::WithSparsityLoss(sum, loss),
                    None => ModelOutput::Prediction(sum),
                }
            }
        };

        Ok(match enforce_positive {
            Some(activation) => output.map_prediction(|p| activation.apply(p)),
            None => output,
        })
    }

    /// Supplied inputs must match configured branches exactly and agree on
    /// the batch size.
    fn check_inputs(&self, input: &ModelInput) -> Result<()> {
        let slots = [
            ("wide", self.wide.is_some(), input.wide()),
            ("deeptabular", self.tabular.is_some(), input.tabular()),
            ("deeptext", self.text.is_some(), input.text()),
            ("deepimage", self.image.is_some(), input.image()),
        ];

        let mut batch: Option<usize> = None;
        for (name, configured, supplied) in slots {
            match (configured, supplied) {
                (true, None) => return Err(WideDeepError::MissingInput(name.to_string())),
                (false, Some(_)) => return Err(WideDeepError::UnexpectedInput(name.to_string())),
                (true, Some(x)) => match batch {
                    None => batch = Some(x.nrows()),
                    Some(rows) if x.nrows() != rows => {
                        return Err(WideDeepError::DimensionMismatch {
                            context: format!("{} input rows", name),
                            expected: rows,
                            actual: x.nrows(),
                        })
                    }
                    Some(_) => {}
                },
                (false, None) => {}
            }
        }
        Ok(())
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        if let Some(component) = &mut self.wide {
            component.set_training(training);
        }
        if let Some(tab) = &mut self.tabular {
            tab.set_training(training);
        }
        if let Some(component) = &mut self.text {
            component.set_training(training);
        }
        if let Some(component) = &mut self.image {
            component.set_training(training);
        }
        match &mut self.mode {
            CombineMode::Head { net, .. } => match net {
                HeadNet::Built(mlp) => {
                    if training {
                        mlp.train();
                    } else {
                        mlp.eval();
                    }
                }
                HeadNet::Custom(head) => head.set_training(training),
            },
            CombineMode::Smoothed { dropout, .. } => {
                if training {
                    dropout.train();
                } else {
                    dropout.eval();
                }
            }
            CombineMode::PerBranch { .. } => {}
        }
    }
}

impl fmt::Debug for WideDeep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WideDeep")
            .field("pred_dim", &self.pred_dim)
            .field("wide", &self.wide.is_some())
            .field(
                "tabular",
                &self.tabular.as_ref().map(|t| {
                    if t.is_attentive() {
                        "attentive"
                    } else {
                        "dense"
                    }
                }),
            )
            .field("text", &self.text.is_some())
            .field("image", &self.image.is_some())
            .field("mode", &self.mode.label())
            .field("enforce_positive", &self.enforce_positive)
            .field("training", &self.training)
            .finish()
    }
}

fn check_output(source: &str, out: &Array2<f64>, batch: usize, width: usize) -> Result<()> {
    if out.nrows() != batch {
        return Err(WideDeepError::DimensionMismatch {
            context: format!("{} output rows", source),
            expected: batch,
            actual: out.nrows(),
        });
    }
    if out.ncols() != width {
        return Err(WideDeepError::DimensionMismatch {
            context: format!("{} output width", source),
            expected: width,
            actual: out.ncols(),
        });
    }
    Ok(())
}
