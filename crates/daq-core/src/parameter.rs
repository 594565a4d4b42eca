//! Parameter<T> - hardware-connected Observable
//!
//! A [`Parameter<T>`] composes an [`Observable<T>`] with two optional async
//! callbacks: a hardware writer used by [`Parameter::set`] and a hardware
//! reader used by [`Parameter::read_from_hardware`].
//!
//! # Data Flow
//!
//! ```text
//! param.set(value)
//!   1. read-only check
//!   2. validate (range, finiteness) BEFORE touching hardware
//!   3. hardware_writer(value)        (fails here: cached value unchanged)
//!   4. store + notify subscribers
//!
//! param.read_from_hardware()
//!   1. hardware_reader()
//!   2. store + notify subscribers    (no validation: device is the truth)
//! ```

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::DaqError;
use crate::observable::{Observable, ObservableMetadata, ParameterBase};

type HardwareWriter<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<(), DaqError>> + Send + Sync>;
type HardwareReader<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, DaqError>> + Send + Sync>;

/// Typed parameter with hardware synchronization.
#[derive(Clone)]
pub struct Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    inner: Observable<T>,
    hardware_writer: Option<HardwareWriter<T>>,
    hardware_reader: Option<HardwareReader<T>>,
}

impl<T> Debug for Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("inner", &self.inner)
            .field("has_writer", &self.hardware_writer.is_some())
            .field("has_reader", &self.hardware_reader.is_some())
            .finish()
    }
}

impl<T> Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    /// Create new parameter with initial value
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        Self {
            inner: Observable::new(name, initial),
            hardware_writer: None,
            hardware_reader: None,
        }
    }

    /// Set parameter description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.inner = self.inner.with_description(description);
        self
    }

    /// Set parameter unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.inner = self.inner.with_units(unit);
        self
    }

    /// Set the dtype hint
    pub fn with_dtype(mut self, dtype: impl Into<String>) -> Self {
        self.inner = self.inner.with_dtype(dtype);
        self
    }

    /// Make parameter read-only
    pub fn read_only(mut self) -> Self {
        self.inner = self.inner.read_only();
        self
    }

    /// Set custom validation function
    pub fn with_validator(
        mut self,
        validator: impl Fn(&T) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.inner = self.inner.with_validator(validator);
        self
    }

    /// Connect hardware write function
    ///
    /// After calling this, `set()` writes to hardware before updating the
    /// cached value. If the write fails the cached value is left untouched.
    pub fn connect_to_hardware_write(
        &mut self,
        writer: impl Fn(T) -> BoxFuture<'static, Result<(), DaqError>> + Send + Sync + 'static,
    ) {
        self.hardware_writer = Some(Arc::new(writer));
    }

    /// Connect hardware read function
    pub fn connect_to_hardware_read(
        &mut self,
        reader: impl Fn() -> BoxFuture<'static, Result<T, DaqError>> + Send + Sync + 'static,
    ) {
        self.hardware_reader = Some(Arc::new(reader));
    }

    /// Connect both hardware read and write functions
    pub fn connect_to_hardware(
        &mut self,
        writer: impl Fn(T) -> BoxFuture<'static, Result<(), DaqError>> + Send + Sync + 'static,
        reader: impl Fn() -> BoxFuture<'static, Result<T, DaqError>> + Send + Sync + 'static,
    ) {
        self.connect_to_hardware_write(writer);
        self.connect_to_hardware_read(reader);
    }

    /// Last known value
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Set value (validates, writes to hardware if connected, notifies subscribers)
    pub async fn set(&self, value: T) -> Result<(), DaqError> {
        if self.inner.is_read_only() {
            return Err(DaqError::ParameterReadOnly(self.inner.name()));
        }
        self.inner.validate(&value)?;

        if let Some(writer) = &self.hardware_writer {
            writer(value.clone()).await?;
        }

        self.inner.set_unchecked(value);
        Ok(())
    }

    /// Read current value from hardware, cache it, and return it
    pub async fn read_from_hardware(&self) -> Result<T, DaqError> {
        let reader = self
            .hardware_reader
            .as_ref()
            .ok_or_else(|| DaqError::ParameterNoHardwareReader(self.inner.name()))?;

        let value = reader().await?;
        self.inner.set_unchecked(value.clone());
        Ok(value)
    }

    /// Subscribe to value changes
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.inner.subscribe()
    }

    /// Parameter name
    pub fn name(&self) -> String {
        self.inner.name()
    }

    /// Unit of measurement
    pub fn unit(&self) -> Option<String> {
        self.inner.metadata().units
    }

    /// Whether the parameter refuses `set()`
    pub fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    /// Direct access to the inner Observable
    pub fn inner(&self) -> &Observable<T> {
        &self.inner
    }
}

impl<T> Parameter<T>
where
    T: Clone + Copy + Send + Sync + PartialEq + PartialOrd + Debug + Into<f64> + 'static,
{
    /// Set inclusive numeric range constraints
    pub fn with_range(mut self, min: T, max: T) -> Self {
        self.inner = self.inner.with_range(min, max);
        self
    }
}

#[async_trait]
impl<T> ParameterBase for Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + Serialize + DeserializeOwned + 'static,
{
    fn name(&self) -> String {
        self.inner.name()
    }

    fn metadata(&self) -> ObservableMetadata {
        self.inner.metadata()
    }

    fn get_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.get())?)
    }

    async fn set_json(&self, value: serde_json::Value) -> Result<()> {
        let typed: T = serde_json::from_value(value)
            .map_err(|e| anyhow::anyhow!("Failed to deserialize value for '{}': {}", self.name(), e))?;
        self.set(typed).await?;
        Ok(())
    }

    async fn refresh_json(&self) -> Result<serde_json::Value> {
        if self.hardware_reader.is_some() {
            let value = self.read_from_hardware().await?;
            Ok(serde_json::to_value(value)?)
        } else {
            self.get_json()
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_validation_happens_before_hardware_write() {
        let writes = Arc::new(AtomicUsize::new(0));
        let counter = writes.clone();

        let mut heater = Parameter::new("VTI_heater", 0.0)
            .with_unit("%")
            .with_range(0.0, 100.0);
        heater.connect_to_hardware_write(move |_| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        assert!(heater.set(150.0).await.is_err());
        assert_eq!(writes.load(Ordering::SeqCst), 0);

        heater.set(42.5).await.unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(heater.get(), 42.5);
    }

    #[tokio::test]
    async fn test_failed_hardware_write_keeps_cached_value() {
        let mut flag = Parameter::new("VTI_ramp_mode", false).with_dtype("bool");
        flag.connect_to_hardware_write(|_| {
            Box::pin(async { Err(DaqError::Instrument("device rejected".into())) })
        });

        let err = flag.set(true).await.unwrap_err();
        assert!(matches!(err, DaqError::Instrument(_)));
        assert!(!flag.get());
    }

    #[tokio::test]
    async fn test_read_from_hardware_skips_validation() {
        let mut temp = Parameter::new("VTI_temp", 0.0)
            .with_unit("K")
            .with_range(0.0, 300.0)
            .read_only();
        temp.connect_to_hardware_read(|| Box::pin(async { Ok(301.5) }));

        assert_eq!(temp.read_from_hardware().await.unwrap(), 301.5);
        assert_eq!(temp.get(), 301.5);
        assert!(matches!(
            temp.set(4.2).await,
            Err(DaqError::ParameterReadOnly(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_reader() {
        let p = Parameter::new("flow", 10.0);
        assert!(matches!(
            p.read_from_hardware().await,
            Err(DaqError::ParameterNoHardwareReader(_))
        ));
        // Without a reader, refresh falls back to the cached value
        assert_eq!(p.refresh_json().await.unwrap(), serde_json::json!(10.0));
    }

    #[tokio::test]
    async fn test_json_round_trip_through_hardware() {
        let store = Arc::new(parking_lot::Mutex::new(1.0_f64));
        let (w, r) = (store.clone(), store.clone());

        let mut setpoint = Parameter::new("pressure_setpoint", 1.0).with_range(1.0, 50.0);
        setpoint.connect_to_hardware(
            move |v| {
                let w = w.clone();
                Box::pin(async move {
                    *w.lock() = v;
                    Ok(())
                })
            },
            move || {
                let r = r.clone();
                Box::pin(async move { Ok(*r.lock()) })
            },
        );

        setpoint.set_json(serde_json::json!(12.5)).await.unwrap();
        assert_eq!(*store.lock(), 12.5);
        assert_eq!(
            setpoint.refresh_json().await.unwrap(),
            serde_json::json!(12.5)
        );
        assert!(setpoint.set_json(serde_json::json!(0.5)).await.is_err());
    }
}
