//! The watchable value and its observers

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::{WatchError, WatchResult};
use super::value::{Kind, Value};
use crate::hub::{Delivery, SubscriptionHub};

/// Who performed a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    /// Application code
    App,
    /// A client, through the HTTP surface
    User,
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Agent::App => write!(f, "app"),
            Agent::User => write!(f, "user"),
        }
    }
}

/// A change of a watchable's value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    /// Absolute path of the watchable
    pub path: String,
    pub old_value: Value,
    pub new_value: Value,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub agent: Agent,
}

/// Callback invoked inline for every change an observer registered for
pub type ObserverFn = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Handle returned by [`Watchable::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

struct Observer {
    token: ObserverToken,
    /// `None` = all agents
    agent: Option<Agent>,
    callback: ObserverFn,
}

struct WatchState {
    value: Value,
    observers: Vec<Observer>,
    next_token: u64,
}

/// A typed, validated value bound to a tree node
///
/// The state lock covers the value and the observer list. A change also takes
/// the snapshot of hub subscribers for this path under that lock, so a
/// notification is never computed against a half-updated value or a
/// subscriber list that is mutating mid-broadcast. Observers and queue
/// delivery run after the lock is released.
pub struct Watchable {
    path: String,
    kind: Kind,
    state: Mutex<WatchState>,
    hub: Option<SubscriptionHub>,
    /// Set once the node is removed from its registry
    detached: AtomicBool,
}

impl fmt::Debug for Watchable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Watchable")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("value", &state.value)
            .field("observers", &state.observers.len())
            .finish()
    }
}

impl Watchable {
    /// Create a watchable that is not connected to any hub
    ///
    /// The initial value is validated; `None` uses the kind's default.
    pub fn new(path: impl Into<String>, kind: Kind, initial: Option<Value>) -> WatchResult<Self> {
        Self::build(path.into(), kind, initial, None)
    }

    pub(crate) fn with_hub(
        path: String,
        kind: Kind,
        initial: Option<Value>,
        hub: SubscriptionHub,
    ) -> WatchResult<Self> {
        Self::build(path, kind, initial, Some(hub))
    }

    fn build(
        path: String,
        kind: Kind,
        initial: Option<Value>,
        hub: Option<SubscriptionHub>,
    ) -> WatchResult<Self> {
        kind.check_definition()
            .map_err(|reason| WatchError::InvalidDefinition {
                path: path.clone(),
                reason,
            })?;

        let value = match initial {
            Some(v) => kind.validate(v).map_err(|reason| WatchError::Validation {
                path: path.clone(),
                reason,
            })?,
            None => kind.default_value(),
        };

        tracing::debug!(path = %path, kind = kind.name(), value = %value, "Watchable created");

        Ok(Self {
            path,
            kind,
            state: Mutex::new(WatchState {
                value,
                observers: Vec::new(),
                next_token: 0,
            }),
            hub,
            detached: AtomicBool::new(false),
        })
    }

    /// Absolute path of this watchable
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared kind
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Current value
    pub fn get(&self) -> Value {
        self.state.lock().value.clone()
    }

    /// Set a new value
    ///
    /// Returns `Ok(true)` if the value changed (observers and subscribers were
    /// notified), `Ok(false)` if the validated value equals the current one.
    /// A rejected value leaves the current value untouched.
    pub fn set(&self, value: Value, agent: Agent) -> WatchResult<bool> {
        self.update(agent, |_, kind| kind.validate(value))
    }

    /// Parse text according to the kind, then [`set`](Self::set) it
    pub fn set_text(&self, text: &str, agent: Agent) -> WatchResult<bool> {
        let value = self.kind.parse(text).map_err(|reason| self.invalid(reason))?;
        self.set(value, agent)
    }

    /// Step an int by `by`, or move a choice `by` positions
    ///
    /// Choices wrap around or saturate according to their kind; otherwise
    /// stepping past either end is a validation error.
    pub fn increment(&self, agent: Agent, by: i64) -> WatchResult<Value> {
        self.update(agent, |current, kind| match kind {
            Kind::Int { .. } => {
                let v = current.as_int().unwrap_or_default();
                let next = v
                    .checked_add(by)
                    .ok_or_else(|| format!("{} + {} overflows", v, by))?;
                kind.validate(Value::Int(next))
            }
            Kind::Choice {
                options,
                wrap,
                clamp,
            } => {
                let len = options.len() as i64;
                let pos = current
                    .as_text()
                    .and_then(|t| options.iter().position(|o| o == t))
                    .unwrap_or(0) as i64;
                let ix = match pos.checked_add(by) {
                    Some(target) if (0..len).contains(&target) => target,
                    _ if *wrap => (pos + by.rem_euclid(len)).rem_euclid(len),
                    Some(target) if *clamp => target.clamp(0, len - 1),
                    None if *clamp => {
                        if by > 0 {
                            len - 1
                        } else {
                            0
                        }
                    }
                    _ => {
                        return Err(format!(
                            "step of {} from position {} is outside the choices",
                            by, pos
                        ))
                    }
                };
                Ok(Value::Text(options[ix as usize].clone()))
            }
            _ => Err(format!("cannot increment a {} value", kind.name())),
        })?;
        Ok(self.get())
    }

    /// Select a choice by position
    pub fn set_index(&self, agent: Agent, index: usize) -> WatchResult<bool> {
        match &self.kind {
            Kind::Choice { options, .. } => match options.get(index) {
                Some(opt) => self.set(Value::Text(opt.clone()), agent),
                None => Err(self.invalid(format!("index {} out of range", index))),
            },
            other => Err(self.invalid(format!("cannot index a {} value", other.name()))),
        }
    }

    /// Position of the current value among the choices
    pub fn index(&self) -> Option<usize> {
        match &self.kind {
            Kind::Choice { options, .. } => {
                let value = self.get();
                options.iter().position(|o| Some(o.as_str()) == value.as_text())
            }
            _ => None,
        }
    }

    /// Notify everyone with the current value, even though it did not change
    pub fn trigger(&self, agent: Agent) {
        let (event, observers, targets) = {
            let state = self.state.lock();
            let event = self.event(state.value.clone(), state.value.clone(), agent);
            (event, Self::interested(&state, agent), self.targets())
        };
        self.notify(event, observers, targets);
    }

    /// Register an observer for changes by any agent
    pub fn subscribe<F>(&self, callback: F) -> ObserverToken
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.add_observer(None, Arc::new(callback))
    }

    /// Register an observer for changes by one agent only
    pub fn subscribe_agent<F>(&self, agent: Agent, callback: F) -> ObserverToken
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.add_observer(Some(agent), Arc::new(callback))
    }

    /// Remove an observer; unknown tokens are ignored
    ///
    /// Returns true if an observer was removed.
    pub fn unsubscribe(&self, token: ObserverToken) -> bool {
        let mut state = self.state.lock();
        let before = state.observers.len();
        state.observers.retain(|o| o.token != token);
        before != state.observers.len()
    }

    /// Number of registered in-process observers
    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    fn add_observer(&self, agent: Option<Agent>, callback: ObserverFn) -> ObserverToken {
        let mut state = self.state.lock();
        let token = ObserverToken(state.next_token);
        state.next_token += 1;
        state.observers.push(Observer {
            token,
            agent,
            callback,
        });
        tracing::trace!(path = %self.path, observers = state.observers.len(), "Observer added");
        token
    }

    /// Compute and commit a new value under the state lock
    fn update<F>(&self, agent: Agent, compute: F) -> WatchResult<bool>
    where
        F: FnOnce(&Value, &Kind) -> Result<Value, String>,
    {
        let (event, observers, targets) = {
            let mut state = self.state.lock();
            let new_value = compute(&state.value, &self.kind).map_err(|reason| self.invalid(reason))?;

            if new_value == state.value {
                tracing::trace!(path = %self.path, value = %new_value, "Value unchanged");
                return Ok(false);
            }

            let old_value = std::mem::replace(&mut state.value, new_value.clone());
            let event = self.event(old_value, new_value, agent);
            (event, Self::interested(&state, agent), self.targets())
        };

        self.notify(event, observers, targets);
        Ok(true)
    }

    fn event(&self, old_value: Value, new_value: Value, agent: Agent) -> ChangeEvent {
        ChangeEvent {
            path: self.path.clone(),
            old_value,
            new_value,
            timestamp: Utc::now().timestamp_millis(),
            agent,
        }
    }

    fn interested(state: &WatchState, agent: Agent) -> Vec<ObserverFn> {
        state
            .observers
            .iter()
            .filter(|o| o.agent.map_or(true, |a| a == agent))
            .map(|o| Arc::clone(&o.callback))
            .collect()
    }

    /// Stop publishing to the hub; a later watchable may reuse this path
    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    /// True once removed from the registry it was registered in
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn targets(&self) -> Option<Delivery> {
        if self.is_detached() {
            return None;
        }
        self.hub.as_ref().map(|hub| hub.prepare(&self.path))
    }

    fn notify(&self, event: ChangeEvent, observers: Vec<ObserverFn>, targets: Option<Delivery>) {
        tracing::debug!(
            path = %event.path,
            old = %event.old_value,
            new = %event.new_value,
            agent = %event.agent,
            observers = observers.len(),
            subscribers = targets.as_ref().map_or(0, Delivery::len),
            "Value changed"
        );

        for observer in observers {
            observer(&event);
        }

        if let (Some(hub), Some(delivery)) = (&self.hub, targets) {
            hub.deliver(delivery, &event);
        }
    }

    fn invalid(&self, reason: String) -> WatchError {
        WatchError::Validation {
            path: self.path.clone(),
            reason,
        }
    }
}
