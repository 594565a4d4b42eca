//! Observable Parameters
//!
//! Reactive values built on `tokio::sync::watch`. An [`Observable<T>`] holds
//! the last known value of an instrument quantity together with its metadata
//! (name, units, description, bounds) and an optional validator. Clones share
//! the same channel and metadata.
//!
//! [`ParameterBase`] is the type-erased, JSON-facing view used by generic
//! front ends (the CLI) and [`ParameterSet`] is the per-device registry.
//!
//! # Example
//!
//! ```rust,ignore
//! let setpoint = Observable::new("VTI_setpoint", 4.2)
//!     .with_units("K")
//!     .with_range(0.0, 300.0);
//!
//! let mut rx = setpoint.subscribe();
//! setpoint.set(10.0)?;
//! rx.changed().await?;
//! ```

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::DaqError;

/// Validator callback type.
pub type Validator<T> = Arc<dyn Fn(&T) -> Result<()> + Send + Sync>;

struct ObservableSharedState<T> {
    metadata: ObservableMetadata,
    validator: Option<Validator<T>>,
}

// =============================================================================
// ParameterBase Trait - Generic Parameter Access
// =============================================================================

/// Type-erased access to a parameter through JSON values.
///
/// `set_json` and `refresh_json` are async because hardware-backed
/// parameters perform a device exchange.
#[async_trait]
pub trait ParameterBase: Send + Sync {
    /// Parameter name
    fn name(&self) -> String;

    /// Metadata snapshot
    fn metadata(&self) -> ObservableMetadata;

    /// Last known value as JSON (no hardware access)
    fn get_json(&self) -> Result<serde_json::Value>;

    /// Validate and apply a JSON value
    async fn set_json(&self, value: serde_json::Value) -> Result<()>;

    /// Fetch the current value from its source and return it as JSON
    async fn refresh_json(&self) -> Result<serde_json::Value>;
}

// =============================================================================
// Observable<T>
// =============================================================================

/// A thread-safe, observable value with change notifications.
pub struct Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    sender: watch::Sender<T>,
    shared: Arc<RwLock<ObservableSharedState<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.read();
        f.debug_struct("Observable")
            .field("metadata", &shared.metadata)
            .field("has_validator", &shared.validator.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: self.shared.clone(),
        }
    }
}

/// Metadata for an observable parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservableMetadata {
    /// Parameter name (unique within a device).
    pub name: String,

    /// Human-readable description.
    pub description: Option<String>,

    /// Physical units (e.g. "K", "K/min", "%", "mbar").
    pub units: Option<String>,

    /// Read-only parameters reject `set()`.
    pub read_only: bool,

    /// Data type hint: `"float"`, `"bool"`, or empty when unknown.
    #[serde(default)]
    pub dtype: String,

    /// Inclusive lower bound, when range-validated.
    #[serde(default)]
    pub min_value: Option<f64>,

    /// Inclusive upper bound, when range-validated.
    #[serde(default)]
    pub max_value: Option<f64>,
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new observable with an initial value.
    pub fn new(name: impl Into<String>, initial_value: T) -> Self {
        let (sender, _) = watch::channel(initial_value);
        Self {
            sender,
            shared: Arc::new(RwLock::new(ObservableSharedState {
                metadata: ObservableMetadata {
                    name: name.into(),
                    ..Default::default()
                },
                validator: None,
            })),
        }
    }

    /// Add a description to this observable.
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.shared.write().metadata.description = Some(description.into());
        self
    }

    /// Add units to this observable.
    pub fn with_units(self, units: impl Into<String>) -> Self {
        self.shared.write().metadata.units = Some(units.into());
        self
    }

    /// Set the dtype hint.
    pub fn with_dtype(self, dtype: impl Into<String>) -> Self {
        self.shared.write().metadata.dtype = dtype.into();
        self
    }

    /// Mark this observable as read-only.
    pub fn read_only(self) -> Self {
        self.shared.write().metadata.read_only = true;
        self
    }

    /// Add a custom validator function. Replaces any previous validator.
    pub fn with_validator<F>(self, validator: F) -> Self
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        self.shared.write().validator = Some(Arc::new(validator));
        self
    }

    /// Get the current value (clone).
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Get the parameter name.
    pub fn name(&self) -> String {
        self.shared.read().metadata.name.clone()
    }

    /// Get the metadata (clone).
    pub fn metadata(&self) -> ObservableMetadata {
        self.shared.read().metadata.clone()
    }

    /// Whether `set()` is refused.
    pub fn is_read_only(&self) -> bool {
        self.shared.read().metadata.read_only
    }

    /// Run the validator against `value` without storing it.
    pub fn validate(&self, value: &T) -> Result<(), DaqError> {
        let guard = self.shared.read();
        if let Some(validator) = &guard.validator {
            validator(value).map_err(|e| DaqError::ParameterValidation {
                name: guard.metadata.name.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Validate and store a new value, notifying subscribers.
    pub fn set(&self, value: T) -> Result<(), DaqError> {
        if self.is_read_only() {
            return Err(DaqError::ParameterReadOnly(self.name()));
        }
        self.validate(&value)?;
        self.set_unchecked(value);
        Ok(())
    }

    /// Store a value without validation or read-only checks.
    ///
    /// Used when the hardware reports a value; the device is the source of
    /// truth even when it sits outside the operator-settable range.
    pub fn set_unchecked(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Subscribe to value changes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T> Observable<T>
where
    T: Clone + Copy + Send + Sync + PartialOrd + Debug + Into<f64> + 'static,
{
    /// Add inclusive min/max validation and record the bounds in metadata.
    ///
    /// Non-finite values are rejected.
    ///
    /// # Panics
    ///
    /// Panics at construction if the bounds are non-finite or out of order.
    pub fn with_range(self, min: T, max: T) -> Self {
        let (lo, hi): (f64, f64) = (min.into(), max.into());
        assert!(
            lo.is_finite() && hi.is_finite(),
            "Range bounds must be finite: min={}, max={}",
            lo,
            hi
        );
        assert!(lo <= hi, "min must be <= max: min={}, max={}", lo, hi);

        {
            let mut guard = self.shared.write();
            guard.metadata.min_value = Some(lo);
            guard.metadata.max_value = Some(hi);
            if guard.metadata.dtype.is_empty() {
                guard.metadata.dtype = "float".to_string();
            }
            guard.validator = Some(Arc::new(move |value: &T| {
                let v: f64 = (*value).into();
                if !v.is_finite() {
                    anyhow::bail!("Value must be finite, got {:?}", value);
                }
                if *value < min || *value > max {
                    anyhow::bail!("Value {:?} out of range [{:?}, {:?}]", value, min, max);
                }
                Ok(())
            }));
        }
        self
    }
}

#[async_trait]
impl<T> ParameterBase for Observable<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    fn name(&self) -> String {
        Observable::name(self)
    }

    fn metadata(&self) -> ObservableMetadata {
        Observable::metadata(self)
    }

    fn get_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.get())?)
    }

    async fn set_json(&self, value: serde_json::Value) -> Result<()> {
        let typed: T = serde_json::from_value(value)
            .map_err(|e| anyhow::anyhow!("Failed to deserialize value for '{}': {}", self.name(), e))?;
        self.set(typed)?;
        Ok(())
    }

    async fn refresh_json(&self) -> Result<serde_json::Value> {
        self.get_json()
    }
}

// =============================================================================
// ParameterSet
// =============================================================================

/// Registry of a device's parameters, ordered by name.
#[derive(Default)]
pub struct ParameterSet {
    parameters: BTreeMap<String, Box<dyn ParameterBase>>,
}

impl Debug for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterSet")
            .field("parameters", &self.names())
            .finish()
    }
}

impl ParameterSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter under its own name. A later registration with
    /// the same name replaces the earlier one.
    pub fn register<P>(&mut self, parameter: P)
    where
        P: ParameterBase + 'static,
    {
        self.parameters.insert(parameter.name(), Box::new(parameter));
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&dyn ParameterBase> {
        self.parameters.get(name).map(|p| p.as_ref())
    }

    /// Look up a parameter by name, failing with [`DaqError::ParameterNotFound`].
    pub fn require(&self, name: &str) -> Result<&dyn ParameterBase, DaqError> {
        self.get(name)
            .ok_or_else(|| DaqError::ParameterNotFound(name.to_string()))
    }

    /// Iterate parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn ParameterBase)> {
        self.parameters
            .iter()
            .map(|(name, p)| (name.as_str(), p.as_ref()))
    }

    /// Parameter names in order.
    pub fn names(&self) -> Vec<&str> {
        self.parameters.keys().map(String::as_str).collect()
    }

    /// Number of registered parameters.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_observable_basic() {
        let obs = Observable::new("test", 42);
        assert_eq!(obs.get(), 42);
        assert_eq!(obs.name(), "test");

        obs.set(100).unwrap();
        assert_eq!(obs.get(), 100);
    }

    #[test]
    fn test_observable_with_metadata() {
        let obs = Observable::new("VTI_ramp_rate", 1.0)
            .with_description("Loop ramp rate")
            .with_units("K/min");

        assert_eq!(obs.metadata().units.as_deref(), Some("K/min"));
        assert!(obs.metadata().description.is_some());
    }

    #[test]
    fn test_observable_range_validation() {
        let obs = Observable::new("VTI_setpoint", 4.2).with_range(0.0, 300.0);

        assert!(obs.set(300.0).is_ok());
        assert!(obs.set(0.0).is_ok());
        assert!(matches!(
            obs.set(-0.1),
            Err(DaqError::ParameterValidation { .. })
        ));
        assert!(obs.set(300.5).is_err());
        assert!(obs.set(f64::NAN).is_err());
        assert_eq!(obs.get(), 0.0);

        let meta = obs.metadata();
        assert_eq!(meta.min_value, Some(0.0));
        assert_eq!(meta.max_value, Some(300.0));
        assert_eq!(meta.dtype, "float");
    }

    #[test]
    fn test_observable_read_only() {
        let obs = Observable::new("VTI_temp", 4.2).read_only();

        assert!(matches!(obs.set(5.0), Err(DaqError::ParameterReadOnly(_))));
        obs.set_unchecked(5.0);
        assert_eq!(obs.get(), 5.0);
    }

    #[tokio::test]
    async fn test_observable_subscription() {
        let obs = Observable::new("value", 0);
        let mut rx = obs.subscribe();
        assert_eq!(*rx.borrow(), 0);

        obs.set(42).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 42);
    }

    #[tokio::test]
    async fn test_parameter_base_json() {
        let obs = Observable::new("flow", 50.0).with_units("%");
        let param: &dyn ParameterBase = &obs;

        assert_eq!(param.name(), "flow");
        assert_eq!(param.get_json().unwrap(), serde_json::json!(50.0));

        param.set_json(serde_json::json!(75.0)).await.unwrap();
        assert_eq!(obs.get(), 75.0);

        let err = param
            .set_json(serde_json::json!("not a number"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("deserialize"));
    }

    #[test]
    fn test_parameter_set_registry() {
        let mut set = ParameterSet::new();
        set.register(Observable::new("probe_temp", 1.5));
        set.register(Observable::new("VTI_temp", 4.2));

        assert_eq!(set.len(), 2);
        assert_eq!(set.names(), vec!["VTI_temp", "probe_temp"]);
        assert!(set.get("VTI_temp").is_some());
        assert!(matches!(
            set.require("missing"),
            Err(DaqError::ParameterNotFound(_))
        ));
    }
}
