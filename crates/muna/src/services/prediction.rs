use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use muna_core::{ControlPlane, CreatePredictionRequest};
use muna_registry::ResourceCache;
use muna_runtime::{
    Acceleration, Configuration, Device, Fxnc, Input, Predictor, PredictionStream, Release,
    RuntimeError, Value, ValueMap,
};

use crate::error::MunaError;
use crate::prediction::Prediction;

/// Named prediction inputs, in the order they are passed to the predictor.
#[derive(Debug, Default)]
pub struct Inputs {
    entries: Vec<(String, Input)>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input, replacing any previous input with the same name.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Input>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Input>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Encode every input into a native value map.
    fn into_value_map(self, fxnc: &Fxnc) -> Result<ValueMap, RuntimeError> {
        let mut map = ValueMap::new(fxnc)?;
        for (name, input) in self.entries {
            map.insert(&name, Value::from_input(fxnc, input)?)?;
        }
        Ok(map)
    }
}

impl<K: Into<String>, V: Into<Input>> FromIterator<(K, V)> for Inputs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut inputs = Inputs::new();
        for (name, value) in iter {
            inputs.insert(name, value);
        }
        inputs
    }
}

/// Options for creating a prediction.
#[derive(Debug, Clone, Default)]
pub struct PredictionOptions {
    pub acceleration: Acceleration,
    pub device: Option<Device>,
    /// Overrides the client identifier reported by the native runtime.
    pub client_id: Option<String>,
    /// Overrides the configuration identifier reported by the native runtime.
    pub configuration_id: Option<String>,
}

impl PredictionOptions {
    pub fn with_acceleration(mut self, acceleration: Acceleration) -> Self {
        self.acceleration = acceleration;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_configuration_id(mut self, configuration_id: impl Into<String>) -> Self {
        self.configuration_id = Some(configuration_id.into());
        self
    }
}

/// Native runtime, loaded the first time a local prediction needs it.
pub(crate) struct LazyRuntime {
    path: Option<PathBuf>,
    loaded: Mutex<Option<Fxnc>>,
}

impl LazyRuntime {
    pub(crate) fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            loaded: Mutex::new(None),
        }
    }

    pub(crate) fn loaded(fxnc: Fxnc) -> Self {
        Self {
            path: None,
            loaded: Mutex::new(Some(fxnc)),
        }
    }

    pub(crate) fn get(&self) -> Result<Fxnc, RuntimeError> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(fxnc) = loaded.as_ref() {
            return Ok(fxnc.clone());
        }
        let fxnc = match &self.path {
            Some(path) => Fxnc::load(path)?,
            None => Fxnc::load_default()?,
        };
        tracing::info!(version = %fxnc.version(), "loaded native runtime");
        *loaded = Some(fxnc.clone());
        Ok(fxnc)
    }
}

/// Make predictions.
///
/// Local predictors are built on first use and cached by tag until they are deleted or the
/// service is dropped.
pub struct PredictionService {
    control: Arc<dyn ControlPlane>,
    resources: ResourceCache,
    runtime: Arc<LazyRuntime>,
    cache: Mutex<HashMap<String, Arc<Slot>>>,
}

/// Predictor for one tag. Locked while the predictor is being built.
type Slot = Mutex<Option<Arc<Predictor>>>;

impl PredictionService {
    pub(crate) fn new(
        control: Arc<dyn ControlPlane>,
        resources: ResourceCache,
        runtime: Arc<LazyRuntime>,
    ) -> Self {
        Self {
            control,
            resources,
            runtime,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Create a prediction.
    ///
    /// Without inputs, the prediction is created by the control plane and nothing runs locally.
    /// A prediction that fails inside the predictor is returned with its `error` set.
    pub fn create(&self, tag: &str, inputs: Option<Inputs>) -> Result<Prediction, MunaError> {
        self.create_with(tag, inputs, &PredictionOptions::default())
    }

    pub fn create_with(
        &self,
        tag: &str,
        inputs: Option<Inputs>,
        options: &PredictionOptions,
    ) -> Result<Prediction, MunaError> {
        let Some(inputs) = inputs else {
            let fxnc = self.runtime.get().ok();
            return self.create_raw(tag, options, fxnc.as_ref()).map(Prediction::from);
        };
        let predictor = self.get_or_create(tag, options)?;
        let inputs = inputs.into_value_map(&predictor.fxnc())?;
        let mut prediction = predictor.create_prediction(&inputs)?;
        let decoded = prediction.decode()?;
        prediction.release();
        Ok(Prediction::from_native(tag, decoded))
    }

    /// Stream a prediction.
    ///
    /// Predictions are decoded one at a time as the returned iterator is advanced. Dropping the
    /// iterator stops the stream.
    pub fn stream(&self, tag: &str, inputs: Inputs) -> Result<PredictionIter, MunaError> {
        self.stream_with(tag, inputs, &PredictionOptions::default())
    }

    pub fn stream_with(
        &self,
        tag: &str,
        inputs: Inputs,
        options: &PredictionOptions,
    ) -> Result<PredictionIter, MunaError> {
        let predictor = self.get_or_create(tag, options)?;
        let inputs = inputs.into_value_map(&predictor.fxnc())?;
        Ok(PredictionIter {
            tag: tag.to_owned(),
            stream: predictor.stream_prediction(inputs)?,
        })
    }

    /// Unload the predictor for `tag`. Returns whether one was loaded.
    ///
    /// Waits for a predictor of `tag` that is still being built.
    pub fn delete(&self, tag: &str) -> bool {
        let Some(slot) = self.lock_cache().remove(tag) else {
            return false;
        };
        let Some(predictor) = lock_slot(&slot).take() else {
            return false;
        };
        tracing::debug!(tag, "unloading predictor");
        release(predictor);
        true
    }

    /// Unload every predictor.
    pub fn clear(&self) {
        let drained: Vec<_> = self.lock_cache().drain().collect();
        for (tag, slot) in drained {
            if let Some(predictor) = lock_slot(&slot).take() {
                tracing::debug!(tag, "unloading predictor");
                release(predictor);
            }
        }
    }

    /// Whether a predictor for `tag` is loaded. A predictor still being built is not.
    pub fn is_loaded(&self, tag: &str) -> bool {
        self.lock_cache().get(tag).is_some_and(|slot| peek_slot(slot))
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, Arc<Slot>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_raw(
        &self,
        tag: &str,
        options: &PredictionOptions,
        fxnc: Option<&Fxnc>,
    ) -> Result<muna_core::schemas::Prediction, MunaError> {
        let client_id = match (&options.client_id, fxnc) {
            (Some(id), _) => Some(id.clone()),
            (None, Some(fxnc)) => Some(Configuration::client_id(fxnc)?),
            (None, None) => None,
        };
        let configuration_id = match (&options.configuration_id, fxnc) {
            (Some(id), _) => Some(id.clone()),
            (None, Some(fxnc)) => Some(Configuration::unique_id(fxnc)?),
            (None, None) => None,
        };
        let request = CreatePredictionRequest {
            tag: tag.to_owned(),
            client_id,
            configuration_id,
        };
        Ok(self.control.create_prediction(&request)?)
    }

    /// Return the cached predictor for `tag`, building it if needed.
    ///
    /// Only the slot of `tag` stays locked while its predictor is built: concurrent callers for
    /// the same tag wait for it, callers for other tags do not.
    fn get_or_create(
        &self,
        tag: &str,
        options: &PredictionOptions,
    ) -> Result<Arc<Predictor>, MunaError> {
        let slot = self.lock_cache().entry(tag.to_owned()).or_default().clone();
        let mut loaded = lock_slot(&slot);
        if let Some(predictor) = loaded.as_ref() {
            tracing::debug!(tag, "predictor cache hit");
            return Ok(predictor.clone());
        }

        match self.build(tag, options) {
            Ok(predictor) => {
                let predictor = Arc::new(predictor);
                *loaded = Some(predictor.clone());
                Ok(predictor)
            }
            Err(e) => {
                // Slots are only cloned under the cache lock, so with no other holder nobody is
                // waiting to retry in this slot and it can go.
                let mut cache = self.lock_cache();
                let unused = Arc::strong_count(&slot) == 2;
                if unused && cache.get(tag).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                    cache.remove(tag);
                }
                Err(e)
            }
        }
    }

    fn build(&self, tag: &str, options: &PredictionOptions) -> Result<Predictor, MunaError> {
        let fxnc = self.runtime.get()?;
        let descriptor = self.create_raw(tag, options, Some(&fxnc))?;
        let resources = descriptor.resources.unwrap_or_default();
        let resolved = self.resources.resolve_all(&resources)?;

        let mut configuration = Configuration::new(&fxnc)?;
        configuration.set_tag(Some(&descriptor.tag))?;
        configuration.set_token(descriptor.configuration.as_deref())?;
        configuration.set_acceleration(options.acceleration)?;
        configuration.set_device(options.device)?;
        for resource in &resolved {
            configuration.add_resource(&resource.resource.kind, &resource.path)?;
        }
        let predictor = Predictor::new(&configuration)?;
        configuration.release();

        let downloaded: u64 = resolved.iter().map(|resource| resource.downloaded_bytes).sum();
        tracing::info!(
            tag,
            resources = resolved.len(),
            downloaded_bytes = downloaded,
            "created predictor"
        );
        Ok(predictor)
    }
}

impl Drop for PredictionService {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("resources", &self.resources)
            .field(
                "loaded",
                &self
                    .lock_cache()
                    .iter()
                    .filter(|(_, slot)| peek_slot(slot))
                    .map(|(tag, _)| tag)
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<Arc<Predictor>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whether `slot` holds a predictor, without waiting on one being built.
fn peek_slot(slot: &Slot) -> bool {
    match slot.try_lock() {
        Ok(loaded) => loaded.is_some(),
        Err(TryLockError::Poisoned(e)) => e.into_inner().is_some(),
        Err(TryLockError::WouldBlock) => false,
    }
}

/// Release a predictor now if nothing else holds it. Otherwise it is released by its last holder.
fn release(predictor: Arc<Predictor>) {
    if let Ok(mut predictor) = Arc::try_unwrap(predictor) {
        predictor.release();
    }
}

/// Predictions read from a streaming prediction.
pub struct PredictionIter {
    tag: String,
    stream: PredictionStream,
}

impl PredictionIter {
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl Iterator for PredictionIter {
    type Item = Result<Prediction, MunaError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut prediction = match self.stream.next()? {
            Ok(prediction) => prediction,
            Err(e) => return Some(Err(e.into())),
        };
        let decoded = prediction.decode();
        prediction.release();
        Some(
            decoded
                .map(|decoded| Prediction::from_native(&self.tag, decoded))
                .map_err(MunaError::from),
        )
    }
}

impl std::iter::FusedIterator for PredictionIter {}

impl std::fmt::Debug for PredictionIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionIter")
            .field("tag", &self.tag)
            .field("stream", &self.stream)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muna_runtime::Object;

    #[test]
    fn test_inputs_replace_duplicate_names() {
        let inputs = Inputs::new()
            .with("prompt", "hello")
            .with("count", 2)
            .with("prompt", "bye");

        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs.names().collect::<Vec<_>>(), ["prompt", "count"]);
        match &inputs.entries[0].1 {
            Input::Object(object) => assert_eq!(object, &Object::from("bye")),
            Input::Value(_) => panic!("expected an object"),
        }
    }

    #[test]
    fn test_inputs_from_iterator() {
        let inputs: Inputs = [("a", 1), ("b", 2)].into_iter().collect();

        assert_eq!(inputs.names().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn test_missing_runtime_fails_to_load() {
        let runtime = LazyRuntime::new(Some(PathBuf::from("/nonexistent/libFunction.so")));

        let err = runtime.get().unwrap_err();

        assert!(matches!(err, RuntimeError::Library(_)));
    }
}
