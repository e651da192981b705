//! Asset Handle - Reference to a loading or loaded asset
//!
//! A handle wraps the shared future of the job that produces its payload.
//! Cloning a handle clones the reference, never the work: every copy
//! observes the same job and the same result.

use crate::job::{JobError, SharedFuture};
use crate::key::AssetKey;
use crate::loader::LoadError;
use std::any::{Any, TypeId};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Unique identifier for a handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId(pub u64);

impl AssetId {
    /// Create a new asset ID
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Invalid asset ID
    pub const fn invalid() -> Self {
        Self(u64::MAX)
    }

    /// Check if valid
    pub const fn is_valid(&self) -> bool {
        self.0 != u64::MAX
    }

    /// Get raw ID value
    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Load state for an asset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LoadState {
    /// No load was requested
    Unresolved = 0,
    /// The job is queued or running
    Pending = 1,
    /// The payload is available
    Ready = 2,
    /// The job failed
    Failed = 3,
}

impl From<u8> for LoadState {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Pending,
            2 => Self::Ready,
            3 => Self::Failed,
            _ => Self::Unresolved,
        }
    }
}

/// Result produced by a load job
pub type LoadOutcome<T> = Result<Arc<T>, LoadError>;

fn flatten<T>(result: Result<LoadOutcome<T>, JobError>) -> LoadOutcome<T> {
    match result {
        Ok(outcome) => outcome,
        Err(JobError::Cancelled) => Err(LoadError::Cancelled),
        Err(err) => Err(LoadError::Custom(err.to_string())),
    }
}

/// Typed handle to an asset
pub struct Handle<T> {
    id: AssetId,
    key: Option<AssetKey>,
    future: Option<SharedFuture<LoadOutcome<T>>>,
}

impl<T: Send + Sync + 'static> Handle<T> {
    /// A handle that refers to nothing
    pub fn unresolved() -> Self {
        Self {
            id: AssetId::invalid(),
            key: None,
            future: None,
        }
    }

    /// Handle backed by a job's future
    pub fn pending(id: AssetId, key: AssetKey, future: SharedFuture<LoadOutcome<T>>) -> Self {
        Self {
            id,
            key: Some(key),
            future: Some(future),
        }
    }

    /// Handle that already holds its payload
    pub fn from_instance(id: AssetId, key: AssetKey, asset: Arc<T>) -> Self {
        Self::pending(id, key, SharedFuture::ready(Ok(asset)))
    }

    /// Handle that failed before any job was scheduled
    pub fn failed(id: AssetId, key: AssetKey, error: LoadError) -> Self {
        Self::pending(id, key, SharedFuture::ready(Err(error)))
    }

    /// Get the asset ID
    pub fn id(&self) -> AssetId {
        self.id
    }

    /// Key the handle was requested with
    pub fn key(&self) -> Option<&AssetKey> {
        self.key.as_ref()
    }

    /// Current load state, without blocking
    pub fn state(&self) -> LoadState {
        match &self.future {
            None => LoadState::Unresolved,
            Some(future) => match future.try_get() {
                None => LoadState::Pending,
                Some(result) => match flatten(result) {
                    Ok(_) => LoadState::Ready,
                    Err(_) => LoadState::Failed,
                },
            },
        }
    }

    /// Check if the payload is available
    pub fn is_ready(&self) -> bool {
        self.state() == LoadState::Ready
    }

    /// Payload if ready, without blocking
    pub fn get(&self) -> Option<Arc<T>> {
        self.future
            .as_ref()
            .and_then(|f| f.try_get())
            .and_then(|r| flatten(r).ok())
    }

    /// Error if the load failed, without blocking
    pub fn error(&self) -> Option<LoadError> {
        self.future
            .as_ref()
            .and_then(|f| f.try_get())
            .and_then(|r| flatten(r).err())
    }

    /// Block until the job completes
    pub fn wait(&self) -> LoadOutcome<T> {
        match &self.future {
            None => Err(LoadError::NotFound("unresolved handle".to_string())),
            Some(future) => flatten(future.wait()),
        }
    }

    /// Whether two handles observe the same job
    pub fn shares_job(&self, other: &Self) -> bool {
        match (&self.future, &other.future) {
            (Some(a), Some(b)) => a.same_job(b),
            _ => false,
        }
    }

    /// Cast to an untyped handle
    pub fn untyped(&self) -> UntypedHandle {
        UntypedHandle::new(self.clone())
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            key: self.key.clone(),
            future: self.future.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Default for Handle<T> {
    fn default() -> Self {
        Self::unresolved()
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.key == other.key
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.key.hash(state);
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}

/// Untyped handle for type-erased caches
#[derive(Clone)]
pub struct UntypedHandle {
    id: AssetId,
    type_id: TypeId,
    type_name: &'static str,
    handle: Arc<dyn Any + Send + Sync>,
    state: Arc<dyn Fn() -> LoadState + Send + Sync>,
}

impl UntypedHandle {
    fn new<T: Send + Sync + 'static>(handle: Handle<T>) -> Self {
        let observed = handle.clone();
        Self {
            id: handle.id(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            handle: Arc::new(handle),
            state: Arc::new(move || observed.state()),
        }
    }

    /// Get the asset ID
    pub fn id(&self) -> AssetId {
        self.id
    }

    /// Get the load state
    pub fn state(&self) -> LoadState {
        (self.state)()
    }

    /// Type ID of the payload
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Type name of the payload
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recover the typed handle if `T` matches
    pub fn typed<T: Send + Sync + 'static>(&self) -> Option<Handle<T>> {
        self.handle.downcast_ref::<Handle<T>>().cloned()
    }
}

impl std::fmt::Debug for UntypedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UntypedHandle")
            .field("id", &self.id)
            .field("type", &self.type_name)
            .field("state", &self.state())
            .finish()
    }
}
