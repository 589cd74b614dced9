use std::sync::Arc;

use tracing::debug;

use crate::batch::BatchAssembler;
use crate::canonical::{Canonicalizer, PaddingPolicy};
use crate::config::DetectorConfig;
use crate::error::{Error, Result};
use crate::input::{resolve_sources, InputItem, ItemSource, RawInput};
use crate::network::{InferenceRunner, LandmarkNet};
use crate::postprocess::postprocess;
use crate::tensor::{TensorHandle, TensorStore};
use crate::types::{LandmarkSet, Landmarks};

/// Runs the full pipeline: canonicalize, batch, one forward pass, map back.
///
/// Each call works inside its own tensor scope, so the number of live tensors in
/// [`store`](Self::store) is the same before and after a call, whether it succeeds or
/// fails. The only exception is [`forward_input`](Self::forward_input), whose result
/// the caller must dispose.
///
/// The detector is `Send + Sync`; calls from several threads share the network weights
/// and the store but never each other's tensors.
///
/// # Usage
///
/// ```ignore
/// let detector = LandmarkDetector::builder()
///     .network(RegressionCascade::load("cascade.bin.bz2")?)
///     .build()?;
/// let landmarks = detector.detect_landmarks(&image.into())?;
/// ```
pub struct LandmarkDetector<N> {
    net: Arc<N>,
    store: Arc<TensorStore>,
    canonicalizer: Canonicalizer,
    config: DetectorConfig,
}

impl<N: LandmarkNet> LandmarkDetector<N> {
    /// A detector with default settings and a private store.
    pub fn new(net: N) -> Self {
        Self::from_parts(
            Arc::new(net),
            Arc::new(TensorStore::new()),
            DetectorConfig::default(),
        )
    }

    pub fn builder() -> LandmarkDetectorBuilder<N> {
        LandmarkDetectorBuilder::new()
    }

    fn from_parts(net: Arc<N>, store: Arc<TensorStore>, config: DetectorConfig) -> Self {
        let input_size = config.input_size.unwrap_or_else(|| net.input_size());
        let canonicalizer = Canonicalizer::new(input_size, config.padding, config.fill_value);
        Self {
            net,
            store,
            canonicalizer,
            config,
        }
    }

    pub fn store(&self) -> &Arc<TensorStore> {
        &self.store
    }

    pub fn network(&self) -> &Arc<N> {
        &self.net
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }

    /// Detect landmarks for a single item or a sequence of items.
    ///
    /// A single item yields [`Landmarks::Single`]; a sequence, or a rank-4 tensor
    /// holding several images, yields [`Landmarks::Batch`] aligned with the input order.
    pub fn detect_landmarks(&self, input: &RawInput) -> Result<Landmarks> {
        let sources = resolve_sources(input.items())?;
        let mut sets = self.run(&sources)?;

        if input.is_batch() {
            return Ok(Landmarks::Batch(sets));
        }
        match sets.len() {
            1 => Ok(Landmarks::Single(sets.remove(0))),
            n => Err(Error::invalid_input(format!(
                "single input produced {n} landmark sets"
            ))),
        }
    }

    pub fn detect_single(&self, item: &InputItem) -> Result<LandmarkSet> {
        let source = ItemSource::single(item)?;
        let mut sets = self.run(&[source])?;
        sets.pop()
            .ok_or_else(|| Error::invalid_input("single input produced no landmark set"))
    }

    pub fn detect_batch(&self, items: &[InputItem]) -> Result<Vec<LandmarkSet>> {
        let sources = resolve_sources(items)?;
        self.run(&sources)
    }

    /// Canonicalize, batch and run the network, returning the raw `batch x 136` output.
    ///
    /// The returned tensor belongs to the caller and must be released with
    /// [`TensorStore::dispose`].
    pub fn forward_input(&self, input: &RawInput) -> Result<TensorHandle> {
        let sources = resolve_sources(input.items())?;
        self.store.tidy(|scope| {
            let (batch, _) =
                BatchAssembler::new(&self.canonicalizer).assemble_sources(scope, &sources)?;
            let raw = InferenceRunner::new(self.net.as_ref()).forward(scope, batch)?;
            scope.keep(&raw)?;
            Ok(raw)
        })
    }

    fn run(&self, sources: &[ItemSource<'_>]) -> Result<Vec<LandmarkSet>> {
        debug!(items = sources.len(), "detecting landmarks");
        self.store.tidy(|scope| {
            let (batch, geometries) =
                BatchAssembler::new(&self.canonicalizer).assemble_sources(scope, sources)?;
            let raw = InferenceRunner::new(self.net.as_ref()).forward(scope, batch)?;
            postprocess(scope, &raw, &geometries)
        })
    }
}

/// Builder for a [`LandmarkDetector`].
pub struct LandmarkDetectorBuilder<N> {
    net: Option<Arc<N>>,
    store: Option<Arc<TensorStore>>,
    config: DetectorConfig,
}

impl<N: LandmarkNet> LandmarkDetectorBuilder<N> {
    pub fn new() -> Self {
        Self {
            net: None,
            store: None,
            config: DetectorConfig::default(),
        }
    }

    pub fn network(mut self, net: N) -> Self {
        self.net = Some(Arc::new(net));
        self
    }

    /// Use weights already shared with other detectors.
    pub fn shared_network(mut self, net: Arc<N>) -> Self {
        self.net = Some(net);
        self
    }

    /// Allocate into an existing store instead of a private one.
    pub fn store(mut self, store: Arc<TensorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn input_size(mut self, width: u32, height: u32) -> Self {
        self.config.input_size = Some((width, height));
        self
    }

    pub fn padding(mut self, padding: PaddingPolicy) -> Self {
        self.config.padding = padding;
        self
    }

    pub fn fill_value(mut self, fill_value: f32) -> Self {
        self.config.fill_value = fill_value;
        self
    }

    pub fn build(self) -> Result<LandmarkDetector<N>> {
        let net = self
            .net
            .ok_or_else(|| Error::InvalidModel("Missing network".into()))?;
        self.config.validate()?;
        let store = self.store.unwrap_or_default();
        Ok(LandmarkDetector::from_parts(net, store, self.config))
    }
}

impl<N: LandmarkNet> Default for LandmarkDetectorBuilder<N> {
    fn default() -> Self {
        Self::new()
    }
}
