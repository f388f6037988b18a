use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    str::FromStr,
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use fastembed::{EmbeddingModel, ModelTrait, TextEmbedding, TextInitOptions};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::config::AppConfig;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    OpenAI,
    #[default]
    FastEmbed,
    Hashed,
}

/// Turns lesson text into vectors. Cheap to clone; every backend shares its client or model.
#[derive(Clone)]
pub struct EmbeddingProvider {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    OpenAI {
        client: Arc<Client<OpenAIConfig>>,
        model: String,
        dimensions: u32,
    },
    FastEmbed {
        model: Arc<Mutex<TextEmbedding>>,
        dimension: usize,
    },
    Hashed {
        dimension: usize,
    },
}

const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";

impl EmbeddingProvider {
    /// Builds the backend selected in the configuration.
    pub async fn from_config(config: &AppConfig, client: Arc<Client<OpenAIConfig>>) -> Result<Self> {
        let provider = match config.embedding_backend {
            EmbeddingBackend::OpenAI => Self::new_openai(
                client,
                config
                    .embedding_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_EMBEDDING_MODEL.to_string()),
                config.embedding_dimensions,
            ),
            EmbeddingBackend::FastEmbed => {
                Self::new_fastembed(config.embedding_model.clone()).await?
            }
            EmbeddingBackend::Hashed => Self::new_hashed(config.embedding_dimensions as usize),
        };

        info!(
            backend = provider.backend_label(),
            dimension = provider.dimension(),
            "Embedding provider ready"
        );
        Ok(provider)
    }

    pub fn new_openai(client: Arc<Client<OpenAIConfig>>, model: String, dimensions: u32) -> Self {
        Self {
            backend: Backend::OpenAI {
                client,
                model,
                dimensions,
            },
        }
    }

    pub async fn new_fastembed(model_override: Option<String>) -> Result<Self> {
        let model_name = match model_override {
            Some(code) => EmbeddingModel::from_str(&code).map_err(|err| anyhow!(err))?,
            None => EmbeddingModel::default(),
        };
        let options = TextInitOptions::new(model_name.clone()).with_show_download_progress(false);

        let (model, dimension) = tokio::task::spawn_blocking(move || -> Result<_> {
            let info = EmbeddingModel::get_model_info(&model_name)
                .ok_or_else(|| anyhow!("FastEmbed model metadata missing for {model_name}"))?;
            let dimension = info.dim;
            let model = TextEmbedding::try_new(options).context("loading FastEmbed model")?;
            Ok((model, dimension))
        })
        .await
        .context("joining FastEmbed loader")??;

        Ok(Self {
            backend: Backend::FastEmbed {
                model: Arc::new(Mutex::new(model)),
                dimension,
            },
        })
    }

    /// Deterministic bag-of-words vectors, used offline and in tests.
    pub fn new_hashed(dimension: usize) -> Self {
        Self {
            backend: Backend::Hashed {
                dimension: dimension.max(1),
            },
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match self.backend {
            Backend::OpenAI { .. } => "openai",
            Backend::FastEmbed { .. } => "fastembed",
            Backend::Hashed { .. } => "hashed",
        }
    }

    pub fn dimension(&self) -> usize {
        match &self.backend {
            Backend::OpenAI { dimensions, .. } => *dimensions as usize,
            Backend::FastEmbed { dimension, .. } | Backend::Hashed { dimension } => *dimension,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(vec![text.to_owned()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedding backend returned no vector"))
    }

    /// Embeds every input in one backend call. The output keeps input order.
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();

        let vectors = match &self.backend {
            Backend::Hashed { dimension } => texts
                .iter()
                .map(|text| hashed_embedding(text, *dimension))
                .collect(),
            Backend::FastEmbed { model, .. } => {
                embed_blocking(Arc::clone(model), texts, |model: &mut TextEmbedding, texts| {
                    model
                        .embed(texts, None)
                        .context("generating FastEmbed vectors")
                })
                .await?
            }
            Backend::OpenAI {
                client,
                model,
                dimensions,
            } => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model.clone())
                    .input(texts)
                    .dimensions(*dimensions)
                    .build()?;
                let mut data = client.embeddings().create(request).await?.data;
                data.sort_by_key(|item| item.index);
                data.into_iter().map(|item| item.embedding).collect()
            }
        };

        if vectors.len() != expected {
            return Err(anyhow!(
                "embedding backend returned {} vectors for {} inputs",
                vectors.len(),
                expected
            ));
        }
        debug!(
            backend = self.backend_label(),
            count = expected,
            "Generated embeddings"
        );
        Ok(vectors)
    }
}

/// Runs CPU-bound model inference on the blocking pool so async workers keep serving
/// other lessons.
async fn embed_blocking<M, F>(
    model: Arc<Mutex<M>>,
    texts: Vec<String>,
    embed: F,
) -> Result<Vec<Vec<f32>>>
where
    M: Send + 'static,
    F: FnOnce(&mut M, Vec<String>) -> Result<Vec<Vec<f32>>> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = model.blocking_lock();
        embed(&mut guard, texts)
    })
    .await
    .context("joining embedding worker")?
}

fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimension];

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        token.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() as usize) % dimension] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn hashed_vectors_are_deterministic_and_normalised() {
        let provider = EmbeddingProvider::new_hashed(32);
        let first = provider.embed("Chlorophyll absorbs light").await.unwrap();
        let second = provider.embed("chlorophyll ABSORBS light").await.unwrap();

        assert_eq!(first.len(), 32);
        assert_eq!(first, second);
        let norm = first.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn batch_preserves_order_and_handles_empty_input() {
        let provider = EmbeddingProvider::new_hashed(16);
        assert!(provider.embed_batch(Vec::new()).await.unwrap().is_empty());

        let batch = provider
            .embed_batch(vec!["alpha".into(), "beta".into()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], provider.embed("alpha").await.unwrap());
        assert_eq!(batch[1], provider.embed("beta").await.unwrap());
    }

    #[test]
    fn empty_text_gives_zero_vector() {
        assert!(hashed_embedding("", 8).iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn blocking_inference_leaves_the_runtime_free() {
        let model = Arc::new(Mutex::new(0usize));
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
        };

        let vectors = embed_blocking(
            Arc::clone(&model),
            vec!["a".into(), "b".into()],
            |calls: &mut usize, texts| {
                *calls += 1;
                std::thread::sleep(Duration::from_millis(200));
                Ok(texts.iter().map(|_| vec![1.0]).collect())
            },
        )
        .await
        .unwrap();
        ticker.abort();

        assert_eq!(vectors.len(), 2);
        assert_eq!(*model.lock().await, 1);
        assert!(
            ticks.load(Ordering::SeqCst) > 3,
            "runtime stalled while the model was busy"
        );
    }

    #[tokio::test]
    async fn blocking_inference_errors_propagate() {
        let model = Arc::new(Mutex::new(()));
        let result = embed_blocking(model, vec!["a".into()], |_: &mut (), _| {
            Err(anyhow!("model exploded"))
        })
        .await;
        assert!(result.unwrap_err().to_string().contains("model exploded"));
    }
}
