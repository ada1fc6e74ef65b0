//! The engine-agnostic render synchronizer.
//!
//! Engine state lives behind a `std` mutex that is never held across an
//! `.await`. During initialization the engine is moved out of the mutex so
//! the slow part can run without blocking other commands; whatever arrives
//! meanwhile is recorded and replayed once the surface is ready.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use crisp_incident_models::{CATEGORIES, CategoryDef, Coordinate, Incident};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{CameraPosition, Engine, MapRenderer, RenderError, RenderState, SurfaceSize, project};

/// Interval between readiness checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Readiness checks made before giving up (about ten seconds).
pub const MAX_READY_POLLS: u32 = 200;

struct Inner<E> {
    /// `None` while initialization is in flight and after teardown.
    engine: Option<E>,
    incidents: Arc<[Incident]>,
    /// Incidents changed since they were last pushed to the engine.
    incidents_dirty: bool,
    /// Latest camera command issued before the engine was ready.
    pending_camera: Option<Coordinate>,
    /// Size the engine was last sized for.
    applied_size: Option<SurfaceSize>,
    poll: Option<JoinHandle<()>>,
}

struct Shared<E> {
    inner: Mutex<Inner<E>>,
    state: watch::Sender<RenderState>,
    categories: &'static [CategoryDef],
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives one engine on behalf of the map page.
///
/// Cheap to clone; clones share the engine.
pub struct RenderSynchronizer<E> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for RenderSynchronizer<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: Engine> RenderSynchronizer<E> {
    /// Wraps `engine`, coloring incidents with the built-in categories.
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self::with_categories(engine, CATEGORIES)
    }

    #[must_use]
    pub fn with_categories(engine: E, categories: &'static [CategoryDef]) -> Self {
        let (state, _) = watch::channel(RenderState::Uninitialized);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    engine: Some(engine),
                    incidents: Arc::from(Vec::new()),
                    incidents_dirty: false,
                    pending_camera: None,
                    applied_size: None,
                    poll: None,
                }),
                state,
                categories,
            }),
        }
    }

    /// Subscribes to lifecycle transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RenderState> {
        self.shared.state.subscribe()
    }

    fn spawn_poll(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            for attempt in 1..=MAX_READY_POLLS {
                interval.tick().await;
                if shared.poll_ready(attempt) {
                    return;
                }
            }
            shared.readiness_timed_out();
        })
    }
}

impl<E: Engine> Shared<E> {
    fn current_state(&self) -> RenderState {
        *self.state.borrow()
    }

    fn set_state(&self, state: RenderState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            log::debug!("Renderer {previous} -> {state}");
        }
    }

    /// One readiness check. Returns `true` once polling should stop.
    fn poll_ready(&self, attempt: u32) -> bool {
        let mut inner = lock(&self.inner);
        if self.current_state() != RenderState::Initializing {
            return true;
        }
        let Some(engine) = inner.engine.as_mut() else {
            return true;
        };

        let size = engine.surface_size();
        if size.is_empty() {
            log::trace!("{} surface not ready (poll {attempt})", engine.name());
            return false;
        }
        log::info!(
            "{} ready at {}x{} after {attempt} polls",
            engine.name(),
            size.width,
            size.height
        );

        inner.applied_size = Some(size);
        inner.poll = None;
        self.set_state(RenderState::Ready);
        self.sync_incidents(&mut inner);
        if let Some(target) = inner.pending_camera.take() {
            self.apply_fly_to(&mut inner, target);
        }
        true
    }

    fn readiness_timed_out(&self) {
        let mut inner = lock(&self.inner);
        if self.current_state() != RenderState::Initializing {
            return;
        }
        let error = RenderError::ReadinessTimeout {
            attempts: MAX_READY_POLLS,
        };
        if let Some(mut engine) = inner.engine.take() {
            log::error!("{}: {error}", engine.name());
            engine.destroy();
        }
        inner.poll = None;
        inner.pending_camera = None;
        self.set_state(RenderState::Failed);
    }

    fn sync_incidents(&self, inner: &mut Inner<E>) {
        if !inner.incidents_dirty {
            return;
        }
        let decorations = project(&inner.incidents, self.categories);
        let Some(engine) = inner.engine.as_mut() else {
            return;
        };
        match engine.replace_decorations(&decorations) {
            Ok(()) => {
                log::debug!("{} showing {} incidents", engine.name(), decorations.len());
            }
            Err(e) => log::error!("{} failed to update incidents: {e}", engine.name()),
        }
        inner.incidents_dirty = false;
    }

    fn apply_fly_to(&self, inner: &mut Inner<E>, target: Coordinate) {
        let Some(engine) = inner.engine.as_mut() else {
            return;
        };
        if let Err(e) = engine.fly_to(target) {
            log::error!("{} failed to fly to {target:?}: {e}", engine.name());
        }
    }
}

#[async_trait]
impl<E: Engine> MapRenderer for RenderSynchronizer<E> {
    async fn init(&self) -> Result<(), RenderError> {
        let mut engine = {
            let mut inner = lock(&self.shared.inner);
            if self.shared.current_state() != RenderState::Uninitialized {
                log::debug!("Renderer already initialized");
                return Ok(());
            }
            let Some(engine) = inner.engine.take() else {
                return Ok(());
            };
            self.shared.set_state(RenderState::Initializing);
            engine
        };

        let result = engine.init().await;

        let mut inner = lock(&self.shared.inner);
        if self.shared.current_state() == RenderState::Destroyed {
            log::debug!("{} finished initializing after teardown", engine.name());
            engine.destroy();
            return Err(RenderError::Destroyed);
        }
        if let Err(e) = result {
            log::error!("{} failed to initialize: {e}", engine.name());
            engine.destroy();
            inner.pending_camera = None;
            self.shared.set_state(RenderState::Failed);
            return Err(e);
        }

        inner.engine = Some(engine);
        inner.poll = Some(self.spawn_poll());
        drop(inner);
        Ok(())
    }

    fn set_incidents(&self, incidents: Arc<[Incident]>) {
        let mut inner = lock(&self.shared.inner);
        if self.shared.current_state().is_terminal() {
            return;
        }
        inner.incidents = incidents;
        inner.incidents_dirty = true;
        if self.shared.current_state() == RenderState::Ready {
            self.shared.sync_incidents(&mut inner);
        }
    }

    fn fly_to(&self, target: Coordinate) {
        let mut inner = lock(&self.shared.inner);
        match self.shared.current_state() {
            RenderState::Ready => self.shared.apply_fly_to(&mut inner, target),
            RenderState::Uninitialized | RenderState::Initializing => {
                if let Some(previous) = inner.pending_camera.replace(target) {
                    log::debug!("Camera command {previous:?} superseded by {target:?}");
                }
            }
            state @ (RenderState::Failed | RenderState::Destroyed) => {
                log::debug!("Ignoring camera command while {state}");
            }
        }
    }

    fn resize(&self) {
        let mut inner = lock(&self.shared.inner);
        if self.shared.current_state() != RenderState::Ready {
            return;
        }
        let applied = inner.applied_size;
        let Some(engine) = inner.engine.as_mut() else {
            return;
        };

        let size = engine.surface_size();
        if size.is_empty() || applied == Some(size) {
            return;
        }
        match engine.resize(size) {
            Ok(()) => inner.applied_size = Some(size),
            Err(e) => log::error!("{} failed to resize: {e}", engine.name()),
        }
    }

    fn destroy(&self) {
        let mut inner = lock(&self.shared.inner);
        if self.shared.current_state() == RenderState::Destroyed {
            return;
        }
        if let Some(poll) = inner.poll.take() {
            poll.abort();
        }
        if let Some(mut engine) = inner.engine.take() {
            log::debug!("Destroying {}", engine.name());
            engine.destroy();
        }
        inner.pending_camera = None;
        inner.incidents = Arc::from(Vec::new());
        self.shared.set_state(RenderState::Destroyed);
    }

    fn state(&self) -> RenderState {
        self.shared.current_state()
    }

    fn camera(&self) -> Option<CameraPosition> {
        if self.shared.current_state() != RenderState::Ready {
            return None;
        }
        lock(&self.shared.inner)
            .engine
            .as_ref()
            .and_then(|engine| engine.camera())
    }
}
