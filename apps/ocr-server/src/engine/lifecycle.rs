//! Engine Lifecycle Manager
//!
//! Owns the single engine instance and its load state:
//! - Idempotent load requests (at most one load episode in flight)
//! - Observable progress while loading
//! - Error capture with retry from `Failed`
//!
//! The state lives in a `watch` channel. Every mutation goes through the
//! transition methods on `EngineState`, applied with `send_if_modified`, so
//! the Unloaded/Failed -> Loading check-and-set is atomic and readers always
//! see a whole snapshot.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::backend::{EngineBackend, EngineHandle, OcrModel};
use super::types::{AttentionImpl, EngineError, EnginePhase, EngineStatus, LoadMode, LoadOutcome};
use crate::config::Device;

// ============================================================================
// State
// ============================================================================

struct EngineState {
    status: EngineStatus,
    /// Present iff `status.phase == Ready`
    engine: Option<EngineHandle>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            status: EngineStatus::default(),
            engine: None,
        }
    }

    /// Unloaded/Failed -> Loading. Returns the outcome instead when no new
    /// episode may start.
    fn begin(&mut self) -> Result<(), LoadOutcome> {
        match self.status.phase {
            EnginePhase::Ready => Err(LoadOutcome::AlreadyLoaded),
            EnginePhase::Loading => Err(LoadOutcome::InProgress),
            EnginePhase::Unloaded | EnginePhase::Failed => {
                self.status = EngineStatus {
                    phase: EnginePhase::Loading,
                    progress: 0,
                    message: "Starting model download...".to_string(),
                    last_error: None,
                };
                Ok(())
            }
        }
    }

    fn advance(&mut self, progress: u8, message: &str) {
        if self.status.phase != EnginePhase::Loading {
            return;
        }
        self.status.progress = self.status.progress.max(progress.min(100));
        self.status.message = message.to_string();
    }

    fn complete(&mut self, engine: EngineHandle) {
        self.status = EngineStatus {
            phase: EnginePhase::Ready,
            progress: 100,
            message: "Model fully loaded and ready".to_string(),
            last_error: None,
        };
        self.engine = Some(engine);
    }

    fn fail(&mut self, error: String) {
        self.status = EngineStatus {
            phase: EnginePhase::Failed,
            progress: 0,
            message: format!("Error: {}", error),
            last_error: Some(error),
        };
        self.engine = None;
    }
}

// ============================================================================
// Load Episode
// ============================================================================

/// Write access to the state for the duration of one load episode.
///
/// If the episode is dropped before `complete`/`fail` (the caller's future
/// was cancelled) the state moves to `Failed` so a later request can retry.
struct LoadEpisode<'a> {
    state: &'a watch::Sender<EngineState>,
    finished: bool,
}

impl<'a> LoadEpisode<'a> {
    fn new(state: &'a watch::Sender<EngineState>) -> Self {
        Self {
            state,
            finished: false,
        }
    }

    fn advance(&self, progress: u8, message: &str) {
        self.state.send_modify(|s| s.advance(progress, message));
    }

    fn complete(mut self, engine: EngineHandle) {
        self.finished = true;
        self.state.send_modify(|s| s.complete(engine));
    }

    fn fail(mut self, error: &EngineError) {
        self.finished = true;
        self.state.send_modify(|s| s.fail(error.to_string()));
    }
}

impl Drop for LoadEpisode<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Model load cancelled before completion");
            self.state
                .send_modify(|s| s.fail("Model load was cancelled".to_string()));
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Lifecycle manager for the single engine instance
#[derive(Clone)]
pub struct EngineManager {
    inner: Arc<EngineManagerInner>,
}

struct EngineManagerInner {
    backend: Arc<dyn EngineBackend>,
    model_id: String,
    device: Device,
    state: watch::Sender<EngineState>,
    /// Background load task, if one was spawned
    background: Mutex<Option<JoinHandle<()>>>,
}

impl EngineManager {
    pub fn new(backend: Arc<dyn EngineBackend>, model_id: impl Into<String>, device: Device) -> Self {
        let (state, _) = watch::channel(EngineState::new());
        Self {
            inner: Arc::new(EngineManagerInner {
                backend,
                model_id: model_id.into(),
                device,
                state,
                background: Mutex::new(None),
            }),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.inner.model_id
    }

    pub fn device(&self) -> Device {
        self.inner.device
    }

    /// Snapshot of the lifecycle state. Never waits on a load in flight.
    pub fn status(&self) -> EngineStatus {
        self.inner.state.borrow().status.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.borrow().status.is_ready()
    }

    /// The loaded engine, if Ready
    pub fn engine(&self) -> Option<EngineHandle> {
        self.inner.state.borrow().engine.clone()
    }

    /// Request that the engine be loaded.
    ///
    /// Idempotent: returns `AlreadyLoaded` when Ready and `InProgress` when
    /// another episode is running, without touching the state. Otherwise a
    /// new episode starts, either detached (`Background`) or on the caller's
    /// task (`Blocking`, errors propagate).
    pub async fn request_load(&self, mode: LoadMode) -> Result<LoadOutcome, EngineError> {
        let mut refused = None;
        self.inner.state.send_if_modified(|s| match s.begin() {
            Ok(()) => true,
            Err(outcome) => {
                refused = Some(outcome);
                false
            }
        });
        if let Some(outcome) = refused {
            return Ok(outcome);
        }

        match mode {
            LoadMode::Background => {
                let manager = self.clone();
                let handle = tokio::spawn(async move {
                    // Failure is recorded in the state and observed via status()
                    let _ = manager.run_episode().await;
                });
                *self.inner.background.lock() = Some(handle);
                Ok(LoadOutcome::Started)
            }
            LoadMode::Blocking => {
                self.run_episode().await?;
                Ok(LoadOutcome::Loaded)
            }
        }
    }

    /// Make sure the engine is Ready, loading it on this task if needed.
    ///
    /// When another episode is already running, waits for its outcome.
    pub async fn ensure_ready(&self) -> Result<EngineHandle, EngineError> {
        if let Some(engine) = self.engine() {
            return Ok(engine);
        }

        if self.request_load(LoadMode::Blocking).await? == LoadOutcome::InProgress {
            self.wait_until_settled().await;
        }

        self.engine().ok_or_else(|| {
            EngineError::Unavailable(
                self.status()
                    .last_error
                    .unwrap_or_else(|| "Model not initialized".to_string()),
            )
        })
    }

    /// Wait until no load episode is in flight and return the final status
    pub async fn wait_until_settled(&self) -> EngineStatus {
        let mut rx = self.inner.state.subscribe();
        let settled = match rx
            .wait_for(|s| s.status.phase != EnginePhase::Loading)
            .await
        {
            Ok(state) => Some(state.status.clone()),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| self.status())
    }

    /// Abort a background load, if one is running
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.background.lock().take() {
            if !handle.is_finished() {
                tracing::info!("Aborting background model load");
                handle.abort();
            }
        }
    }

    async fn run_episode(&self) -> Result<(), EngineError> {
        let episode = LoadEpisode::new(&self.inner.state);
        match self.load(&episode).await {
            Ok(engine) => {
                tracing::info!(
                    model = %self.inner.model_id,
                    attention = %engine.attention(),
                    device = %engine.device(),
                    "Model fully loaded and ready"
                );
                episode.complete(engine);
                Ok(())
            }
            Err(e) => {
                tracing::error!(model = %self.inner.model_id, error = %e, "Failed to load model");
                episode.fail(&e);
                Err(e)
            }
        }
    }

    async fn load(&self, episode: &LoadEpisode<'_>) -> Result<EngineHandle, EngineError> {
        let model_id = self.inner.model_id.as_str();
        let device = self.inner.device;
        tracing::info!(model = %model_id, "Loading model");

        episode.advance(10, "Downloading tokenizer...");
        let tokenizer = self.inner.backend.load_tokenizer(model_id).await?;

        episode.advance(30, "Tokenizer ready. Downloading model...");
        let (mut model, attention) = self.load_weights(episode).await?;

        episode.advance(80, "Model downloaded. Configuring...");
        if device == Device::Cuda {
            episode.advance(80, "Moving model to GPU...");
        }
        model.place(device, device.precision()).await?;

        Ok(EngineHandle::new(model, tokenizer, attention, device))
    }

    /// Prefer flash attention, fall back to eager
    async fn load_weights(
        &self,
        episode: &LoadEpisode<'_>,
    ) -> Result<(Box<dyn OcrModel>, AttentionImpl), EngineError> {
        let model_id = self.inner.model_id.as_str();
        let backend = &self.inner.backend;

        episode.advance(30, "Loading model with flash_attention_2...");
        let accelerated = match backend.load_model(model_id, AttentionImpl::FlashAttention2).await {
            Ok(model) => return Ok((model, AttentionImpl::FlashAttention2)),
            Err(e) => e,
        };

        tracing::warn!(error = %accelerated, "Flash attention unavailable, falling back to eager");
        episode.advance(30, "Loading model with eager attention...");

        match backend.load_model(model_id, AttentionImpl::Eager).await {
            Ok(model) => Ok((model, AttentionImpl::Eager)),
            Err(baseline) => Err(EngineError::AttentionExhausted {
                accelerated: accelerated.to_string(),
                baseline: baseline.to_string(),
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockBackend;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn manager(backend: MockBackend) -> (EngineManager, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let manager = EngineManager::new(backend.clone(), "test/model", Device::Cpu);
        (manager, backend)
    }

    #[tokio::test]
    async fn test_starts_unloaded() {
        let (manager, _) = manager(MockBackend::new());
        let status = manager.status();
        assert_eq!(status.phase, EnginePhase::Unloaded);
        assert_eq!(status.progress, 0);
        assert!(manager.engine().is_none());
    }

    #[tokio::test]
    async fn test_blocking_load_reaches_ready() {
        let (manager, backend) = manager(MockBackend::new());

        let outcome = manager.request_load(LoadMode::Blocking).await.unwrap();

        assert_eq!(outcome, LoadOutcome::Loaded);
        let status = manager.status();
        assert_eq!(status.phase, EnginePhase::Ready);
        assert_eq!(status.progress, 100);
        assert!(status.last_error.is_none());
        assert!(manager.engine().is_some());
        assert_eq!(backend.tokenizer_calls(), 1);
    }

    #[tokio::test]
    async fn test_load_when_ready_is_noop() {
        let (manager, backend) = manager(MockBackend::new());
        manager.request_load(LoadMode::Blocking).await.unwrap();
        let before = manager.status();

        let outcome = manager.request_load(LoadMode::Background).await.unwrap();

        assert_eq!(outcome, LoadOutcome::AlreadyLoaded);
        assert_eq!(manager.status(), before);
        assert_eq!(backend.tokenizer_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_run_one_episode() {
        let (manager, backend) =
            manager(MockBackend::new().with_load_delay(Duration::from_millis(50)));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let manager = manager.clone();
                let mode = if i % 2 == 0 { LoadMode::Background } else { LoadMode::Blocking };
                tokio::spawn(async move { manager.request_load(mode).await.unwrap() })
            })
            .collect();

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }
        manager.wait_until_settled().await;

        let started = outcomes
            .iter()
            .filter(|o| matches!(o, LoadOutcome::Started | LoadOutcome::Loaded))
            .count();
        assert_eq!(started, 1);
        assert_eq!(backend.tokenizer_calls(), 1);
        assert!(manager.is_ready());
    }

    #[tokio::test]
    async fn test_concurrent_ensure_ready_loads_once() {
        let (manager, backend) =
            manager(MockBackend::new().with_load_delay(Duration::from_millis(50)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.ensure_ready().await.is_ok() })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(backend.tokenizer_calls(), 1);
    }

    #[tokio::test]
    async fn test_status_does_not_wait_for_background_load() {
        let (manager, _) = manager(MockBackend::new().with_load_delay(Duration::from_secs(5)));

        let outcome = manager.request_load(LoadMode::Background).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Started);

        let status = tokio::time::timeout(Duration::from_millis(100), async { manager.status() })
            .await
            .unwrap();
        assert_eq!(status.phase, EnginePhase::Loading);
        assert!(status.progress <= 10);
        assert!(manager.engine().is_none());

        let again = manager.request_load(LoadMode::Background).await.unwrap();
        assert_eq!(again, LoadOutcome::InProgress);

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_failure_records_error_and_allows_retry() {
        let (manager, backend) = manager(MockBackend::new().failing_tokenizer("hub unreachable"));

        let err = manager.request_load(LoadMode::Blocking).await.unwrap_err();
        assert!(matches!(err, EngineError::Tokenizer(_)));

        let status = manager.status();
        assert_eq!(status.phase, EnginePhase::Failed);
        assert_eq!(status.progress, 0);
        assert!(status.last_error.unwrap().contains("hub unreachable"));
        assert!(status.message.starts_with("Error: "));
        assert!(manager.engine().is_none());

        // Failed -> Loading is allowed
        let _ = manager.request_load(LoadMode::Blocking).await;
        assert_eq!(backend.tokenizer_calls(), 2);
    }

    #[tokio::test]
    async fn test_background_failure_visible_in_status() {
        let (manager, _) = manager(MockBackend::new().failing_tokenizer("disk full"));

        manager.request_load(LoadMode::Background).await.unwrap();
        let status = manager.wait_until_settled().await;

        assert_eq!(status.phase, EnginePhase::Failed);
        assert!(status.last_error.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_falls_back_to_eager_attention() {
        let (manager, backend) = manager(MockBackend::new().without_flash_attention());

        let engine = manager.ensure_ready().await.unwrap();

        assert_eq!(engine.attention(), AttentionImpl::Eager);
        assert_eq!(backend.model_calls.load(Ordering::SeqCst), 2);
        assert!(manager.is_ready());
    }

    #[tokio::test]
    async fn test_both_attention_failures_are_kept() {
        let (manager, _) =
            manager(MockBackend::new().without_flash_attention().failing_eager("out of memory"));

        let err = manager.ensure_ready().await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("flash_attn is not installed"));
        assert!(message.contains("out of memory"));
        assert_eq!(manager.status().phase, EnginePhase::Failed);
    }

    #[tokio::test]
    async fn test_ensure_ready_waits_for_background_failure() {
        let (manager, _) = manager(
            MockBackend::new()
                .with_load_delay(Duration::from_millis(30))
                .failing_tokenizer("bad token"),
        );

        manager.request_load(LoadMode::Background).await.unwrap();
        let err = manager.ensure_ready().await.unwrap_err();

        assert!(matches!(err, EngineError::Unavailable(_)));
        assert!(err.to_string().contains("bad token"));
    }

    #[tokio::test]
    async fn test_cancelled_blocking_load_can_be_retried() {
        let (manager, backend) = manager(MockBackend::new().with_load_delay(Duration::from_secs(5)));

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            manager.request_load(LoadMode::Blocking),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(manager.status().phase, EnginePhase::Failed);

        let outcome = manager.request_load(LoadMode::Background).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Started);
        assert!(backend.tokenizer_calls() >= 1);
        manager.shutdown();
    }
}
