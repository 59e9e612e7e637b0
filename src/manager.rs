//! Collaborators that create, validate and destroy pooled resources

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;

/// Lifecycle hooks the pool uses to manage a resource type.
///
/// The pool has no knowledge of the resource beyond these three calls. They
/// are always invoked without the pool's lock held and may run concurrently
/// with each other.
#[async_trait]
pub trait ResourceManager: Send + Sync + 'static {
    /// Type of the pooled resource
    type Resource: Send + 'static;

    /// Error raised by the collaborators
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new resource
    async fn create(&self) -> Result<Self::Resource, Self::Error>;

    /// Cheaply check that an idle resource is still usable.
    ///
    /// An `Err` is treated the same as `Ok(false)`.
    async fn validate(&self, _resource: &mut Self::Resource) -> Result<bool, Self::Error> {
        Ok(true)
    }

    /// Release the resource's underlying handle. Called at most once per resource.
    async fn destroy(&self, resource: Self::Resource) -> Result<(), Self::Error> {
        drop(resource);
        Ok(())
    }
}

type CreateFn<T, E> = Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<T, E>> + Send>> + Send + Sync>;
type ValidateFn<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type DestroyFn<T, E> = Box<dyn Fn(T) -> Result<(), E> + Send + Sync>;

/// A [`ResourceManager`] assembled from plain functions
///
/// # Examples
///
/// ```
/// use esox_resourcepool::FnManager;
/// use std::io;
///
/// let manager = FnManager::new(|| async { Ok::<_, io::Error>(String::from("conn")) })
///     .with_validator(|conn: &String| !conn.is_empty())
///     .with_destroyer(|_conn: String| Ok(()));
/// # drop(manager);
/// ```
pub struct FnManager<T, E> {
    create: CreateFn<T, E>,
    validate: Option<ValidateFn<T>>,
    destroy: Option<DestroyFn<T, E>>,
}

impl<T, E> FnManager<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Create a manager from a factory function
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            create: Box::new(move || Box::pin(factory())),
            validate: None,
            destroy: None,
        }
    }

    /// Set the liveness check
    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Box::new(validator));
        self
    }

    /// Set the teardown function
    pub fn with_destroyer<D>(mut self, destroyer: D) -> Self
    where
        D: Fn(T) -> Result<(), E> + Send + Sync + 'static,
    {
        self.destroy = Some(Box::new(destroyer));
        self
    }
}

#[async_trait]
impl<T, E> ResourceManager for FnManager<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Resource = T;
    type Error = E;

    async fn create(&self) -> Result<T, E> {
        (self.create)().await
    }

    async fn validate(&self, resource: &mut T) -> Result<bool, E> {
        Ok(self.validate.as_ref().is_none_or(|validate| validate(&*resource)))
    }

    async fn destroy(&self, resource: T) -> Result<(), E> {
        match &self.destroy {
            Some(destroy) => destroy(resource),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fn_manager_defaults() {
        let manager = FnManager::new(|| async { Ok::<_, io::Error>(7u32) });

        let mut value = manager.create().await.unwrap();
        assert_eq!(value, 7);
        assert!(manager.validate(&mut value).await.unwrap());
        assert!(manager.destroy(value).await.is_ok());
    }

    #[tokio::test]
    async fn test_fn_manager_custom_hooks() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&destroyed);

        let manager = FnManager::new(|| async { Ok::<_, io::Error>(0u32) })
            .with_validator(|v: &u32| *v > 0)
            .with_destroyer(move |_v: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let mut value = manager.create().await.unwrap();
        assert!(!manager.validate(&mut value).await.unwrap());
        manager.destroy(value).await.unwrap();
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fn_manager_factory_error() {
        let manager = FnManager::new(|| async {
            Err::<u32, _>(io::Error::new(io::ErrorKind::ConnectionRefused, "down"))
        });
        assert!(manager.create().await.is_err());
    }
}
