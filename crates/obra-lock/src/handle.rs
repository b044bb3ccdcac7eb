//! Scope-bound lock handle
//!
//! A [`ResourceLock`] binds one resource name to the scope that owns it (a
//! request handler, a form session, a job). It tracks whether the lock is held,
//! whether an acquire is in flight and the last error. With auto-release on,
//! dropping the handle while it still holds its lock fires a release in the
//! background: the drop does not wait for it, so the remote release may not
//! have completed when the scope ends and the service-side TTL is the backstop.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::client::LockClient;
use crate::model::{AcquireOptions, AcquireOutcome};

#[derive(Default)]
struct HandleState {
    token: Option<String>,
    error: Option<String>,
}

pub struct ResourceLock {
    client: LockClient,
    resource: String,
    options: AcquireOptions,
    auto_release: bool,
    acquiring: AtomicBool,
    state: Mutex<HandleState>,
}

impl LockClient {
    /// Create a handle for `resource` with auto-release enabled
    pub fn lock(&self, resource: &str, options: AcquireOptions) -> ResourceLock {
        ResourceLock::new(self.clone(), resource, options)
    }
}

impl ResourceLock {
    pub fn new(client: LockClient, resource: &str, options: AcquireOptions) -> Self {
        Self {
            client,
            resource: resource.to_string(),
            options,
            auto_release: true,
            acquiring: AtomicBool::new(false),
            state: Mutex::new(HandleState::default()),
        }
    }

    /// Keep the lock when the handle is dropped
    pub fn without_auto_release(mut self) -> Self {
        self.auto_release = false;
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Held by this handle and not yet released or expired locally
    pub fn is_locked(&self) -> bool {
        let state = self.state.lock();
        match &state.token {
            Some(token) => self.client.token_for(&self.resource).as_ref() == Some(token),
            None => false,
        }
    }

    pub fn is_acquiring(&self) -> bool {
        self.acquiring.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> Option<String> {
        self.state.lock().token.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    /// Acquire the resource, returning whether it is now held
    pub async fn acquire(&self) -> bool {
        self.acquiring.store(true, Ordering::SeqCst);
        let outcome: AcquireOutcome = self
            .client
            .acquire_with(&self.resource, &self.options)
            .await;
        self.acquiring.store(false, Ordering::SeqCst);

        let mut state = self.state.lock();
        if outcome.acquired {
            state.token = outcome.token;
            state.error = None;
            true
        } else {
            state.error = outcome.error;
            false
        }
    }

    /// Release the resource if this handle holds it
    pub async fn release(&self) -> bool {
        let token = self.state.lock().token.take();
        let Some(token) = token else {
            return false;
        };

        let released = self.client.release(&self.resource, Some(&token)).await;
        if !released {
            self.state.lock().error = Some(format!("failed to release {}", self.resource));
        }
        released
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        if !self.auto_release {
            return;
        }
        let Some(token) = self.state.get_mut().token.take() else {
            return;
        };
        // already released or expired locally
        if self.client.token_for(&self.resource).as_deref() != Some(token.as_str()) {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let client = self.client.clone();
                let resource = std::mem::take(&mut self.resource);
                debug!(resource = %resource, "Releasing lock on drop");
                runtime.spawn(async move {
                    if !client.release(&resource, Some(&token)).await {
                        warn!(resource = %resource, "Background release failed");
                    }
                });
            }
            Err(_) => {
                self.client.forget(&self.resource);
                warn!(
                    resource = %self.resource,
                    "No runtime to release lock on drop, remote lock stays until its TTL lapses"
                );
            }
        }
    }
}
