//! Shared-ownership core for device resources.
//!
//! Every wrapper in this crate ties the destruction of one native Vulkan
//! object to the lifetime of the last surviving handle. `Shared` is the
//! common machinery: cloning a handle aliases the native resource, and the
//! resource's `destroy` hook runs exactly once, when the final clone drops.

use std::sync::Arc;

/// Destruction hook for a wrapped native resource.
///
/// Implementations call the appropriate `vkDestroy*`/free path. The hook is
/// invoked once, from the drop of the last handle alias.
pub(crate) trait DeviceResource {
    fn destroy(&mut self);
}

struct SharedInner<R: DeviceResource> {
    resource: R,
    label: String,
}

impl<R: DeviceResource> Drop for SharedInner<R> {
    fn drop(&mut self) {
        self.resource.destroy();
    }
}

/// Reference-counted owner of one native resource.
///
/// The wrapped resource carries whatever destroy context it needs
/// (device reference, allocator reference) inside `R`.
pub(crate) struct Shared<R: DeviceResource> {
    inner: Arc<SharedInner<R>>,
}

impl<R: DeviceResource> Shared<R> {
    pub(crate) fn new(resource: R, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                resource,
                label: label.into(),
            }),
        }
    }

    pub(crate) fn resource(&self) -> &R {
        &self.inner.resource
    }

    pub(crate) fn label(&self) -> &str {
        &self.inner.label
    }

    /// Number of live aliases, including this one.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<R: DeviceResource> Clone for Shared<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResource {
        destroyed: Arc<AtomicUsize>,
    }

    impl DeviceResource for CountingResource {
        fn destroy(&mut self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn aliases_do_not_destroy() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let handle = Shared::new(
            CountingResource {
                destroyed: destroyed.clone(),
            },
            "probe",
        );

        let a = handle.clone();
        let b = handle.clone();
        assert_eq!(handle.strong_count(), 3);

        drop(a);
        drop(b);
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
        assert_eq!(handle.strong_count(), 1);
    }

    #[test]
    fn last_drop_destroys_exactly_once() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let handle = Shared::new(
            CountingResource {
                destroyed: destroyed.clone(),
            },
            "probe",
        );
        let alias = handle.clone();

        drop(handle);
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);

        drop(alias);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn label_is_preserved() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let handle = Shared::new(
            CountingResource {
                destroyed: destroyed.clone(),
            },
            "depth image",
        );
        assert_eq!(handle.clone().label(), "depth image");
    }
}
