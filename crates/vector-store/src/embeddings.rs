use crate::checksum::Fnv1a;
use crate::error::{Result, VectorStoreError};
use crate::paths::default_model_dir;
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, Axis, Ix3};
use ort::execution_providers::{CPUExecutionProvider, ExecutionProvider, ExecutionProviderDispatch};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use ort::Error as OrtError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tokio::task::spawn_blocking;

pub const DEFAULT_MODEL_ID: &str = "all-minilm-l6-v2";

const ENV_EMBEDDING_MODE: &str = "REPOLENS_EMBEDDING_MODE";
const ENV_EMBEDDING_MODEL: &str = "REPOLENS_EMBEDDING_MODEL";
const ENV_MODEL_DIR: &str = "REPOLENS_MODEL_DIR";

/// Which backend produces the vectors
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    /// Pretrained sentence-embedding model on ONNX Runtime
    #[default]
    Onnx,
    /// Deterministic hash-seeded vectors (tests, offline smoke runs)
    Stub,
}

impl EmbeddingMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "onnx" | "fast" => Ok(Self::Onnx),
            "stub" => Ok(Self::Stub),
            other => Err(VectorStoreError::EmbeddingError(format!(
                "Unsupported embedding mode '{other}' (expected 'onnx' or 'stub')"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Onnx => "onnx",
            Self::Stub => "stub",
        }
    }
}

/// User-facing embedding settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingOptions {
    pub mode: EmbeddingMode,
    pub model_id: String,
    /// Directory holding `<model_id>/model.onnx` and `<model_id>/tokenizer.json`
    pub model_dir: Option<PathBuf>,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::default(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            model_dir: None,
        }
    }
}

impl EmbeddingOptions {
    /// Apply `REPOLENS_EMBEDDING_MODE`, `REPOLENS_EMBEDDING_MODEL` and
    /// `REPOLENS_MODEL_DIR` on top of these options.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(raw) = env::var(ENV_EMBEDDING_MODE) {
            self.mode = EmbeddingMode::parse(&raw)?;
        }
        if let Ok(model) = env::var(ENV_EMBEDDING_MODEL) {
            if !model.trim().is_empty() {
                self.model_id = model;
            }
        }
        if let Ok(dir) = env::var(ENV_MODEL_DIR) {
            if !dir.trim().is_empty() {
                self.model_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(self)
    }

    #[must_use]
    pub fn resolved_model_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(default_model_dir)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ModelId(String);

impl Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ModelId {
    fn from_raw(model_name: &str) -> Self {
        Self(Self::normalize(model_name))
    }

    fn normalize(raw: &str) -> String {
        let model_name = raw.trim().to_ascii_lowercase();
        let model_name = model_name
            .strip_prefix("sentence-transformers/")
            .unwrap_or(&model_name);
        match model_name {
            "minilm" | "all-minilm-l6" => DEFAULT_MODEL_ID.to_string(),
            "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => "bge-small".to_string(),
            other => other.to_string(),
        }
    }

    fn spec(&self) -> Result<ModelSpec> {
        let (dimension, max_length, max_batch) = match self.0.as_str() {
            DEFAULT_MODEL_ID => (384, 256, 32),
            "bge-small" => (384, 512, 32),
            other => {
                return Err(VectorStoreError::EmbeddingError(format!(
                    "Unknown embedding model id '{other}'. Available: {DEFAULT_MODEL_ID}, bge-small"
                )))
            }
        };
        Ok(ModelSpec {
            id: self.clone(),
            dimension,
            max_length,
            max_batch,
        })
    }
}

#[derive(Clone, Debug)]
struct ModelSpec {
    id: ModelId,
    dimension: usize,
    max_length: usize,
    max_batch: usize,
}

impl ModelSpec {
    fn assets_in(&self, model_dir: &Path) -> ModelAssets {
        let model_dir = model_dir.join(self.id.to_string());
        ModelAssets {
            model_path: model_dir.join("model.onnx"),
            tokenizer_path: model_dir.join("tokenizer.json"),
        }
    }
}

#[derive(Clone)]
struct ModelAssets {
    model_path: PathBuf,
    tokenizer_path: PathBuf,
}

struct OrtBackend {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_length: usize,
    max_batch: usize,
    dimension: usize,
}

#[derive(Clone, Debug)]
struct StubBackend {
    dimension: usize,
}

impl StubBackend {
    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts
            .iter()
            .map(|text| stub_embed(text, self.dimension))
            .collect()
    }
}

impl OrtBackend {
    fn new(spec: &ModelSpec, model_dir: &Path) -> Result<Self> {
        // Keep tokenization single-threaded unless the user opted in explicitly.
        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }

        let assets = spec.assets_in(model_dir);
        if !assets.model_path.exists() || !assets.tokenizer_path.exists() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Model files for '{}' are missing. Expected ONNX at {} and tokenizer at {}. Download them or set {ENV_MODEL_DIR}.",
                spec.id,
                assets.model_path.display(),
                assets.tokenizer_path.display(),
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&assets.tokenizer_path)
            .map_err(|e| VectorStoreError::EmbeddingError(format!("Tokenizer load failed: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: spec.max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Tokenizer truncation failed: {e}"))
            })?;

        let (intra_threads, inter_threads) = default_ort_threads();
        let session = Session::builder()
            .map_err(|e| to_embedding_error(&e))?
            .with_intra_threads(intra_threads)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to set ORT intra threads: {e}"))
            })?
            .with_inter_threads(inter_threads)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to set ORT inter threads: {e}"))
            })?
            .with_execution_providers(build_execution_providers())
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!(
                    "Failed to register execution provider: {e}"
                ))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to set optimization level: {e}"))
            })?
            .commit_from_file(&assets.model_path)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to load ONNX model: {e}"))
            })?;

        log::info!(
            "Loaded ONNX model '{}' (dim {}, max_length {}, batch {})",
            spec.id,
            spec.dimension,
            spec.max_length,
            spec.max_batch
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_length: spec.max_length,
            max_batch: spec.max_batch,
            dimension: spec.dimension,
        })
    }

    fn embed_batch_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch) {
            let encodings = self
                .tokenizer
                .encode_batch(batch.to_vec(), true)
                .map_err(|e| {
                    VectorStoreError::EmbeddingError(format!("Tokenization failed: {e}"))
                })?;
            if encodings.is_empty() {
                continue;
            }

            let tokens = TokenBatch::from_encodings(&encodings, self.max_length)?;
            let mut available = tokens.input_tensors()?;

            let hidden = {
                let mut session = self.session.lock().map_err(|_| {
                    VectorStoreError::EmbeddingError("Failed to lock ONNX session".into())
                })?;

                // Exports differ on whether they declare token_type_ids.
                let mut feed: HashMap<String, DynTensor> = HashMap::new();
                for input in &session.inputs {
                    let value = available.remove(input.name.as_str()).ok_or_else(|| {
                        VectorStoreError::EmbeddingError(format!(
                            "Model expects unsupported input '{}'",
                            input.name
                        ))
                    })?;
                    feed.insert(input.name.clone(), value);
                }

                let outputs = session.run(SessionInputs::from(feed)).map_err(|e| {
                    VectorStoreError::EmbeddingError(format!("ONNX forward failed: {e}"))
                })?;
                if outputs.len() == 0 {
                    return Err(VectorStoreError::EmbeddingError(
                        "ONNX returned no outputs".to_string(),
                    ));
                }
                let hidden = outputs[0]
                    .try_extract_array::<f32>()
                    .map_err(|e| {
                        VectorStoreError::EmbeddingError(format!(
                            "Failed to decode ONNX output: {e}"
                        ))
                    })?
                    .to_owned();
                hidden
            };
            results.extend(embeddings_from_output(
                hidden,
                tokens.mask.view(),
                self.dimension,
            )?);
        }

        Ok(results)
    }
}

/// Token ids, attention mask and segment ids of one padded batch
struct TokenBatch {
    ids: Array2<i64>,
    mask: Array2<i64>,
    type_ids: Array2<i64>,
}

impl TokenBatch {
    fn from_encodings(encodings: &[Encoding], max_length: usize) -> Result<Self> {
        let seq_len = encodings.first().map_or(0, Encoding::len);
        if seq_len > max_length {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Tokenized length {seq_len} exceeds max_length {max_length}"
            )));
        }
        if encodings.iter().any(|e| e.len() != seq_len) {
            return Err(VectorStoreError::EmbeddingError(
                "Inconsistent sequence lengths after padding".to_string(),
            ));
        }

        let shape = (encodings.len(), seq_len);
        let column = |pick: fn(&Encoding) -> &[u32]| -> Result<Array2<i64>> {
            let flat = encodings
                .iter()
                .flat_map(|e| pick(e).iter().map(|v| i64::from(*v)))
                .collect();
            Array2::from_shape_vec(shape, flat).map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Token tensor shape error: {e}"))
            })
        };

        Ok(Self {
            ids: column(Encoding::get_ids)?,
            mask: column(Encoding::get_attention_mask)?,
            type_ids: column(Encoding::get_type_ids)?,
        })
    }

    fn input_tensors(&self) -> Result<HashMap<&'static str, DynTensor>> {
        let tensor = |values: &Array2<i64>| -> Result<DynTensor> {
            Ok(Tensor::from_array(values.clone().into_dyn())
                .map_err(|e| to_embedding_error(&e))?
                .upcast())
        };
        Ok(HashMap::from([
            ("input_ids", tensor(&self.ids)?),
            ("attention_mask", tensor(&self.mask)?),
            ("token_type_ids", tensor(&self.type_ids)?),
        ]))
    }
}

fn default_ort_threads() -> (usize, usize) {
    let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    ((cpus / 4).clamp(1, 4), 1)
}

fn build_execution_providers() -> Vec<ExecutionProviderDispatch> {
    vec![CPUExecutionProvider::default().build()]
}

fn ensure_dimension(vec: &[f32], expected: usize) -> Result<()> {
    if vec.len() != expected {
        return Err(VectorStoreError::DimensionMismatch {
            expected,
            actual: vec.len(),
        });
    }
    Ok(())
}

/// Mean-pool `[batch, tokens, hidden]` states over the attention mask.
fn embeddings_from_output(
    hidden: ArrayD<f32>,
    mask: ArrayView2<'_, i64>,
    expected_dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let shape = hidden.shape().to_vec();
    let hidden = hidden.into_dimensionality::<Ix3>().map_err(|_| {
        VectorStoreError::EmbeddingError(format!(
            "Expected [batch, tokens, hidden] output, got {shape:?}"
        ))
    })?;
    if hidden.len_of(Axis(0)) != mask.nrows() {
        return Err(VectorStoreError::EmbeddingError(format!(
            "Output batch of {} does not match {} inputs",
            hidden.len_of(Axis(0)),
            mask.nrows()
        )));
    }

    hidden
        .outer_iter()
        .zip(mask.outer_iter())
        .map(|(sample, row)| {
            let mut emb = mean_pool(sample, row);
            ensure_dimension(&emb, expected_dimension)?;
            normalize_or_reject(&mut emb)?;
            Ok(emb)
        })
        .collect()
}

fn mean_pool(sample: ArrayView2<'_, f32>, mask: ArrayView1<'_, i64>) -> Vec<f32> {
    let mut sum = Array1::<f32>::zeros(sample.ncols());
    let mut kept = 0usize;
    for (token, _) in sample
        .outer_iter()
        .zip(mask.iter())
        .filter(|(_, flag)| **flag != 0)
    {
        sum += &token;
        kept += 1;
    }
    if kept > 0 {
        sum /= kept as f32;
    }
    sum.to_vec()
}

/// Scale `vec` to unit L2 norm. Returns `false` for a zero or non-finite vector.
fn normalize(vec: &mut [f32]) -> bool {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for value in vec {
        *value /= norm;
    }
    true
}

fn normalize_or_reject(vec: &mut [f32]) -> Result<()> {
    if normalize(vec) {
        Ok(())
    } else {
        Err(VectorStoreError::EmbeddingError(
            "Model produced a degenerate (zero-norm) embedding".to_string(),
        ))
    }
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        Fnv1a::hash(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    if !normalize(&mut vec) {
        if let Some(first) = vec.first_mut() {
            *first = 1.0;
        }
    }
    vec
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn to_embedding_error(error: &OrtError) -> VectorStoreError {
    VectorStoreError::EmbeddingError(format!("{error}"))
}

/// The single text-to-vector transformation shared by ingestion and queries.
///
/// Every vector it returns has unit L2 norm, so inner product equals cosine
/// similarity downstream. Share one instance (behind an `Arc`) between the
/// ingest pipeline and the retriever.
pub struct EmbeddingModel {
    backend: EmbeddingBackend,
    dimension: usize,
    model_id: String,
}

enum EmbeddingBackend {
    Onnx(Arc<OrtBackend>),
    Stub(StubBackend),
}

impl std::fmt::Debug for EmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingModel")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl EmbeddingModel {
    /// Build the model described by `REPOLENS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_options(&EmbeddingOptions::default().with_env_overrides()?)
    }

    pub fn from_options(options: &EmbeddingOptions) -> Result<Self> {
        let id = ModelId::from_raw(&options.model_id);
        let spec = id.spec()?;

        match options.mode {
            EmbeddingMode::Stub => Ok(Self {
                dimension: spec.dimension,
                model_id: format!("stub:{}", spec.id),
                backend: EmbeddingBackend::Stub(StubBackend {
                    dimension: spec.dimension,
                }),
            }),
            EmbeddingMode::Onnx => {
                let dir = options.resolved_model_dir();
                let backend = OrtBackend::new(&spec, &dir)?;
                Ok(Self {
                    dimension: backend.dimension,
                    model_id: spec.id.to_string(),
                    backend: EmbeddingBackend::Onnx(Arc::new(backend)),
                })
            }
        }
    }

    /// Deterministic stub model with an explicit dimension
    #[must_use]
    pub fn stub(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("stub-{dimension}"),
            backend: EmbeddingBackend::Stub(StubBackend { dimension }),
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(vec![text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))
    }

    pub async fn embed_batch(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let expected = texts.len();
        let owned: Vec<String> = texts.into_iter().map(ToString::to_string).collect();
        let embeddings = match &self.backend {
            EmbeddingBackend::Stub(stub) => stub.embed_batch(&owned),
            EmbeddingBackend::Onnx(backend) => {
                let backend = backend.clone();
                spawn_blocking(move || backend.embed_batch_blocking(&owned))
                    .await
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("Join error: {e}")))??
            }
        };

        if embeddings.len() != expected {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Expected {expected} embeddings, got {}",
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}
