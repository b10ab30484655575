//! Lifecycle-managed embedding service.
//!
//! [`EmbeddingService`] owns the embedding model and implements the core
//! [`Embedder`] trait on top of it. The model is loaded lazily, shared by
//! every request once ready, and dropped again after a period without use:
//!
//! ```text
//!            embed()                 load ok
//! Unloaded ─────────▶ Loading ─────────────────▶ Ready
//!    ▲                   │                         │
//!    └───── load err ────┘◀──── idle timeout ──────┘
//! ```
//!
//! # Guarantees
//!
//! - Concurrent callers arriving while a load is in flight await the same
//!   load; the loader runs once per `Unloaded → Loading` transition.
//! - A failed or panicking load is reported to every waiter and leaves the
//!   service `Unloaded`, so the next call retries.
//! - The idle timer starts when a model becomes ready and restarts on each
//!   successful `embed` against that model. When it fires the model is
//!   dropped; requests still holding it finish normally.
//! - Empty or whitespace-only input returns the zero vector without loading
//!   anything.
//! - Input is capped at `max_input_chars` characters; output is
//!   L2-normalized.
//!
//! Only loading is serialized. Once `Ready`, calls run concurrently against
//! the same model; backends that need exclusive access lock internally.
//!
//! The service must be used from within a tokio runtime: loads and the idle
//! timer run as spawned tasks, so a canceled request never abandons a load
//! half way.

pub mod backends;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use notebook_rag_core::embedding::{l2_normalize, Embedder};
use notebook_rag_core::{Result, RetrievalError};

use crate::config::EmbeddingConfig;

pub use backends::create_loader;

/// A loaded model, ready for inference.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed one non-empty text. Output need not be normalized.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Produces [`EmbeddingModel`]s. Called once per load.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    /// Load the model. Errors are reported as
    /// [`RetrievalError::ModelLoadFailure`].
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>>;
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
}

#[derive(Clone)]
struct Loaded {
    generation: u64,
    model: Arc<dyn EmbeddingModel>,
}

type LoadFuture = Shared<BoxFuture<'static, Result<Loaded>>>;

enum Slot {
    Unloaded,
    Loading { generation: u64, load: LoadFuture },
    Ready(Loaded),
}

/// Tuning for [`EmbeddingService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    pub idle_timeout: Duration,
    pub max_input_chars: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            max_input_chars: 8192,
        }
    }
}

impl From<&EmbeddingConfig> for ServiceOptions {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            max_input_chars: config.max_input_chars,
        }
    }
}

struct Inner {
    loader: Arc<dyn ModelLoader>,
    options: ServiceOptions,
    slot: Mutex<Slot>,
    idle_timer: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    loads_started: AtomicU64,
}

/// Embedding model resource manager. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EmbeddingService {
    inner: Arc<Inner>,
}

impl EmbeddingService {
    pub fn new(loader: Arc<dyn ModelLoader>, options: ServiceOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                options,
                slot: Mutex::new(Slot::Unloaded),
                idle_timer: Mutex::new(None),
                generation: AtomicU64::new(0),
                loads_started: AtomicU64::new(0),
            }),
        }
    }

    /// Build the service for the configured provider.
    pub fn from_config(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let loader = create_loader(config)?;
        Ok(Self::new(loader, ServiceOptions::from(config)))
    }

    pub fn state(&self) -> ModelState {
        match &*self.inner.slot.lock() {
            Slot::Unloaded => ModelState::Unloaded,
            Slot::Loading { .. } => ModelState::Loading,
            Slot::Ready(_) => ModelState::Ready,
        }
    }

    /// Number of loads started since creation.
    pub fn load_count(&self) -> u64 {
        self.inner.loads_started.load(Ordering::SeqCst)
    }

    /// Load the model now instead of on first use. Starts the idle timer.
    pub async fn warm_up(&self) -> Result<()> {
        let loaded = self.inner.acquire().await?;
        self.inner.schedule_idle_unload(loaded.generation);
        Ok(())
    }

    /// Drop the model immediately. An in-flight load is abandoned: its
    /// waiters still get the model, but it is not kept.
    pub fn unload(&self) {
        if let Some(timer) = self.inner.idle_timer.lock().take() {
            timer.abort();
        }
        let mut slot = self.inner.slot.lock();
        if !matches!(*slot, Slot::Unloaded) {
            info!(model = self.inner.loader.model_name(), "embedding model unloaded");
        }
        *slot = Slot::Unloaded;
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    fn model_name(&self) -> &str {
        self.inner.loader.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.loader.dims()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let dims = self.dims();
        if text.trim().is_empty() {
            return Ok(vec![0.0; dims]);
        }
        let input = cap_chars(text, self.inner.options.max_input_chars);

        let loaded = self.inner.acquire().await?;
        let mut vector = loaded.model.embed(input).await?;
        if vector.len() != dims {
            return Err(RetrievalError::inference(format!(
                "model returned {} dimensions, expected {}",
                vector.len(),
                dims
            )));
        }
        l2_normalize(&mut vector);

        self.inner.schedule_idle_unload(loaded.generation);
        Ok(vector)
    }
}

impl Inner {
    /// Return the ready model, joining or starting a load as needed.
    async fn acquire(self: &Arc<Self>) -> Result<Loaded> {
        let load = {
            let mut slot = self.slot.lock();
            let pending = match &*slot {
                Slot::Ready(loaded) => return Ok(loaded.clone()),
                Slot::Loading { load, .. } => Some(load.clone()),
                Slot::Unloaded => None,
            };
            match pending {
                Some(load) => load,
                None => self.start_load(&mut *slot),
            }
        };
        load.await
    }

    /// Transition `Unloaded → Loading`. Caller holds the slot lock.
    fn start_load(self: &Arc<Self>, slot: &mut Slot) -> LoadFuture {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.loads_started.fetch_add(1, Ordering::SeqCst);
        info!(
            model = self.loader.model_name(),
            generation, "loading embedding model"
        );

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            let started = std::time::Instant::now();
            let result = match AssertUnwindSafe(inner.loader.load()).catch_unwind().await {
                Ok(result) => result.map(|model| Loaded { generation, model }),
                Err(panic) => Err(RetrievalError::model_load(format!(
                    "model loader panicked: {}",
                    panic_message(&*panic)
                ))),
            };
            inner.finish_load(generation, &result, started.elapsed());
            result
        });

        // Weak, so a parked load future does not keep the service alive.
        let owner = Arc::downgrade(self);
        let load = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let result = Err(RetrievalError::model_load(format!("model load task failed: {e}")));
                    if let Some(inner) = owner.upgrade() {
                        inner.finish_load(generation, &result, Duration::ZERO);
                    }
                    result
                }
            }
        }
        .boxed()
        .shared();

        *slot = Slot::Loading {
            generation,
            load: load.clone(),
        };
        load
    }

    /// Settle a load. A model that becomes `Ready` gets its idle timer right
    /// away, so it is released even if no embed on it ever succeeds.
    fn finish_load(self: &Arc<Self>, generation: u64, result: &Result<Loaded>, elapsed: Duration) {
        let became_ready = {
            let mut slot = self.slot.lock();
            let current =
                matches!(&*slot, Slot::Loading { generation: g, .. } if *g == generation);
            match result {
                Ok(loaded) if current => {
                    info!(
                        model = self.loader.model_name(),
                        generation,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "embedding model ready"
                    );
                    *slot = Slot::Ready(loaded.clone());
                    true
                }
                Ok(_) => {
                    debug!(generation, "discarding model from superseded load");
                    false
                }
                Err(e) => {
                    warn!(model = self.loader.model_name(), error = %e, "embedding model load failed");
                    if current {
                        *slot = Slot::Unloaded;
                    }
                    false
                }
            }
        };
        if became_ready {
            self.schedule_idle_unload(generation);
        }
    }

    /// Restart the idle timer, but only while the model of `generation` is
    /// still the ready one. A request finishing on a superseded model must
    /// not displace the timer of the current model.
    ///
    /// Lock order is `idle_timer` then `slot`, as in [`EmbeddingService::unload`].
    fn schedule_idle_unload(self: &Arc<Self>, generation: u64) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let timeout = self.options.idle_timeout;
        let mut timer = self.idle_timer.lock();
        let current =
            matches!(&*self.slot.lock(), Slot::Ready(loaded) if loaded.generation == generation);
        if !current {
            return;
        }
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.unload_if_idle(generation);
            }
        }));
    }

    fn unload_if_idle(&self, generation: u64) {
        let mut slot = self.slot.lock();
        if matches!(&*slot, Slot::Ready(loaded) if loaded.generation == generation) {
            *slot = Slot::Unloaded;
            info!(
                model = self.loader.model_name(),
                idle_secs = self.options.idle_timeout.as_secs(),
                "embedding model unloaded after idle timeout"
            );
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.idle_timer.get_mut().take() {
            timer.abort();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// At most `max` characters of `text`, cut on a char boundary.
fn cap_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
