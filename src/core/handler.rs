//! Handler functions.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::core::context::Ctx;

type HandlerFn = dyn Fn(Ctx) -> BoxFuture<'static, ()> + Send + Sync;

/// A named, cloneable async request handler.
///
/// Middleware and route handlers share this one type: a handler runs its
/// pre-processing, awaits `ctx.next()` to run the rest of the chain, then
/// runs its post-processing.
#[derive(Clone)]
pub struct HandlerFunc {
    name: Arc<str>,
    func: Arc<HandlerFn>,
}

impl HandlerFunc {
    /// Wrap an async closure, naming it after its type.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Ctx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::named(std::any::type_name::<F>(), f)
    }

    /// Wrap an async closure under an explicit name (used in logs).
    pub fn named<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Ctx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: Arc::from(name),
            func: Arc::new(move |ctx| f(ctx).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, ctx: Ctx) -> BoxFuture<'static, ()> {
        (self.func)(ctx)
    }
}

impl fmt::Debug for HandlerFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandlerFunc").field(&self.name).finish()
    }
}

/// Shorthand for [`HandlerFunc::new`].
pub fn handler<F, Fut>(f: F) -> HandlerFunc
where
    F: Fn(Ctx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    HandlerFunc::new(f)
}
