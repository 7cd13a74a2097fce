//! Before/after request hooks.
//!
//! Hooks are scoped to a client instance and run synchronously in
//! registration order. A before-hook can cancel the pending request; the
//! caller then receives the cancelled-result marker, not an error.
//! After-hooks observe the fully resolved result (refresh-and-retry cycle
//! included) and their return values are ignored.

use std::fmt;

use http::Method;

use super::params::Params;
use super::result::ApiResult;

/// The call signature handed to hooks.
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// HTTP method of the pending call.
    pub method: Method,
    /// Endpoint path relative to the API URL.
    pub endpoint: String,
    /// Parameters of the pending call.
    pub params: Params,
}

/// Outcome of a before-hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    /// Let the request proceed.
    Continue,
    /// Cancel the request before any token or network work.
    Cancel,
}

/// Callback invoked before a request is dispatched.
pub type BeforeHook = Box<dyn Fn(&CallInfo) -> HookAction + Send + Sync>;

/// Callback invoked after a result is fully resolved.
pub type AfterHook = Box<dyn Fn(bool, &ApiResult, &CallInfo) + Send + Sync>;

#[derive(Default)]
pub(crate) struct MiddlewareRegistry {
    before: Vec<BeforeHook>,
    after: Vec<AfterHook>,
}

impl MiddlewareRegistry {
    pub(crate) fn add_before(&mut self, hook: BeforeHook) {
        self.before.push(hook);
    }

    pub(crate) fn add_after(&mut self, hook: AfterHook) {
        self.after.push(hook);
    }

    /// Runs before-hooks in order; the first cancellation wins.
    pub(crate) fn run_before(&self, call: &CallInfo) -> HookAction {
        for hook in &self.before {
            if hook(call) == HookAction::Cancel {
                return HookAction::Cancel;
            }
        }
        HookAction::Continue
    }

    pub(crate) fn run_after(&self, success: bool, result: &ApiResult, call: &CallInfo) {
        for hook in &self.after {
            hook(success, result, call);
        }
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}
