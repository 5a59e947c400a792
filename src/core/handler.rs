//! Consumer callbacks.
//!
//! Handlers run on the dispatcher task, between store mutations; slow
//! handlers throttle the whole collection. They must not call
//! `Informer::stop` themselves.

#[cfg(test)]
use mockall::automock;

use crate::HandlerError;
use crate::Resource;

pub type HandlerResult = std::result::Result<(), HandlerError>;

#[cfg_attr(test, automock)]
pub trait ResourceEventHandler: Send + Sync + 'static {
    fn on_add(
        &self,
        _object: &Resource,
    ) -> HandlerResult {
        Ok(())
    }

    fn on_update(
        &self,
        _old: &Resource,
        _new: &Resource,
    ) -> HandlerResult {
        Ok(())
    }

    fn on_delete(
        &self,
        _object: &Resource,
    ) -> HandlerResult {
        Ok(())
    }
}

type ObjectFn = Box<dyn Fn(&Resource) -> HandlerResult + Send + Sync>;
type UpdateFn = Box<dyn Fn(&Resource, &Resource) -> HandlerResult + Send + Sync>;

/// Closure-backed [`ResourceEventHandler`]; unset callbacks do nothing.
#[derive(Default)]
pub struct ResourceEventHandlerFuncs {
    add: Option<ObjectFn>,
    update: Option<UpdateFn>,
    delete: Option<ObjectFn>,
}

impl ResourceEventHandlerFuncs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_add(
        mut self,
        f: impl Fn(&Resource) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.add = Some(Box::new(f));
        self
    }

    pub fn with_update(
        mut self,
        f: impl Fn(&Resource, &Resource) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    pub fn with_delete(
        mut self,
        f: impl Fn(&Resource) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.delete = Some(Box::new(f));
        self
    }
}

impl ResourceEventHandler for ResourceEventHandlerFuncs {
    fn on_add(
        &self,
        object: &Resource,
    ) -> HandlerResult {
        self.add.as_ref().map_or(Ok(()), |f| f(object))
    }

    fn on_update(
        &self,
        old: &Resource,
        new: &Resource,
    ) -> HandlerResult {
        self.update.as_ref().map_or(Ok(()), |f| f(old, new))
    }

    fn on_delete(
        &self,
        object: &Resource,
    ) -> HandlerResult {
        self.delete.as_ref().map_or(Ok(()), |f| f(object))
    }
}
