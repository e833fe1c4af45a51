//! Scene Graph Sync – keeps a retained-mode renderer scene in step with a
//! mutable host scene.
//!
//! Every frame the host scene is walked top-down. Each visible object is
//! resolved to a shared prototype (its data block) and a placement
//! (instance). Prototypes are exported once, reference-counted by their
//! instances, refreshed when the host data changes and evicted when the
//! last instance goes away. Optional motion blur sampling runs as a
//! pre-pass; light filter links are rebuilt after the lights are synced.

pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod identity;
pub mod linker;
pub mod mesh;
pub mod motion;
pub mod retained;
pub mod sync;
pub mod translate;
pub mod utils;

use parking_lot::Mutex;

pub use glam::{Mat4, Quat, Vec2, Vec3};

pub use cache::{CacheEntry, PrototypeCache, TranslatorState};
pub use config::{MotionSettings, ShutterTiming, SyncSettings};
pub use error::{
    CacheConsistencyError, ExtractionWarning, HostError, IdentityError, MotionSampleError,
    SyncError, TranslateError,
};
pub use host::{
    CameraData, CombineMode, HostMesh, HostObject, HostScene, LightData, LightFilterData,
    Modifier, ModifierKind, ObjectKind, ParticleInstance, Polygon, SceneArena,
};
pub use identity::{IdentityResolver, InstanceKey, PrototypeKey};
pub use linker::LightFilterLinker;
pub use motion::{MotionSampler, TransformMotion};
pub use retained::{
    Detail, NodeKind, NoTextureSchema, ParamList, ParamValue, PrimvarSet, RecordingScene,
    RetainedScene, ShaderSchema,
};
pub use sync::{CancelToken, InstanceState, SyncContext, SyncReport};
pub use translate::{EntityKind, TranslatorRegistry};
pub use utils::allocator::{Arena, NodeId, ObjectId};

struct EngineState<H, R> {
    host: H,
    scene: R,
    context: SyncContext,
}

/// High-level wrapper that owns a host scene, a retained scene and the
/// [`SyncContext`] between them.
///
/// Passes never overlap: [`SyncEngine::sync_frame`] fails fast with
/// [`SyncError::PassInProgress`] while another pass (or a `with_*`
/// accessor) holds the engine.
pub struct SyncEngine<H = SceneArena, R = RecordingScene> {
    state: Mutex<EngineState<H, R>>,
    cancel: CancelToken,
}

impl<H: HostScene, R: RetainedScene> SyncEngine<H, R> {
    pub fn new(host: H, scene: R, settings: SyncSettings) -> Self {
        Self::with_context(host, scene, SyncContext::new(settings))
    }

    /// Wraps an existing context, e.g. one configured with a shader schema.
    pub fn with_context(host: H, scene: R, context: SyncContext) -> Self {
        let cancel = context.cancel_token();
        Self {
            state: Mutex::new(EngineState {
                host,
                scene,
                context,
            }),
            cancel,
        }
    }

    /// Runs one sync pass at `frame`.
    pub fn sync_frame(&self, frame: f64) -> Result<SyncReport, SyncError> {
        let mut guard = self.state.try_lock().ok_or(SyncError::PassInProgress)?;
        let EngineState {
            host,
            scene,
            context,
        } = &mut *guard;
        context.sync_frame(host, scene, frame)
    }

    /// Asks the running pass to stop at the next entity boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn settings(&self) -> SyncSettings {
        self.state.lock().context.settings().clone()
    }

    pub fn set_settings(&self, settings: SyncSettings) {
        self.state.lock().context.set_settings(settings);
    }

    /// Mutable access to the host scene between passes.
    pub fn with_host<T>(&self, f: impl FnOnce(&mut H) -> T) -> T {
        f(&mut self.state.lock().host)
    }

    pub fn with_scene<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        f(&self.state.lock().scene)
    }

    pub fn with_context_ref<T>(&self, f: impl FnOnce(&SyncContext) -> T) -> T {
        f(&self.state.lock().context)
    }

    /// Removes everything the engine created from the retained scene.
    pub fn clear(&self) {
        let mut guard = self.state.lock();
        let EngineState { scene, context, .. } = &mut *guard;
        context.clear(scene);
    }

    pub fn into_parts(self) -> (H, R, SyncContext) {
        let EngineState {
            host,
            scene,
            context,
        } = self.state.into_inner();
        (host, scene, context)
    }
}
