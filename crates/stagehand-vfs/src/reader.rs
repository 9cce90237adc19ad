//! Typed readers over VFS files.
//!
//! A [`ReaderRegistry`] maps a target type `T` to a function that turns a file
//! into a `T`. Readers receive the registry itself, so structured readers are
//! built on top of simpler ones (`JsonObject` reads a `serde_json::Value`,
//! which reads a `String`, which reads the raw bytes).

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::handle::File;
use crate::{VfsError, VfsResult};

type ReadFn<T> = Arc<dyn Fn(&ReaderRegistry, &dyn File) -> VfsResult<T> + Send + Sync>;

/// The lines of a UTF-8 text file, without terminators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lines(pub Vec<String>);

impl Deref for Lines {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A JSON document whose top level is an object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonObject(pub Map<String, Value>);

impl Deref for JsonObject {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A JSON document whose top level is an array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonArray(pub Vec<Value>);

impl Deref for JsonArray {
    type Target = [Value];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

struct Entry {
    name: &'static str,
    read: Box<dyn Any + Send + Sync>,
}

/// Registry of `File -> T` readers keyed by `T`.
pub struct ReaderRegistry {
    readers: HashMap<TypeId, Entry>,
}

impl ReaderRegistry {
    /// Create a registry with no readers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            readers: HashMap::new(),
        }
    }

    /// Create a registry holding the baseline readers: `Vec<u8>`, `String`,
    /// [`Lines`], `serde_json::Value`, [`JsonObject`] and [`JsonArray`].
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.insert::<Vec<u8>, _>(|_, file| file.read_all());
        registry.insert::<String, _>(|registry, file| {
            let bytes = registry.read::<Vec<u8>>(file)?;
            String::from_utf8(bytes).map_err(|e| decode_error::<String>(file, e))
        });
        registry.insert::<Lines, _>(|registry, file| {
            let text = registry.read::<String>(file)?;
            Ok(Lines(text.lines().map(str::to_owned).collect()))
        });
        registry.insert::<Value, _>(|registry, file| {
            let text = registry.read::<String>(file)?;
            serde_json::from_str(&text).map_err(|e| decode_error::<Value>(file, e))
        });
        registry.insert::<JsonObject, _>(|registry, file| {
            match registry.read::<Value>(file)? {
                Value::Object(map) => Ok(JsonObject(map)),
                other => Err(decode_error::<JsonObject>(
                    file,
                    format!("expected an object, found {}", json_kind(&other)),
                )),
            }
        });
        registry.insert::<JsonArray, _>(|registry, file| {
            match registry.read::<Value>(file)? {
                Value::Array(items) => Ok(JsonArray(items)),
                other => Err(decode_error::<JsonArray>(
                    file,
                    format!("expected an array, found {}", json_kind(&other)),
                )),
            }
        });
        registry
    }

    fn insert<T, F>(&mut self, reader: F)
    where
        T: 'static,
        F: Fn(&ReaderRegistry, &dyn File) -> VfsResult<T> + Send + Sync + 'static,
    {
        let read: ReadFn<T> = Arc::new(reader);
        self.readers.insert(
            TypeId::of::<T>(),
            Entry {
                name: type_name::<T>(),
                read: Box::new(read),
            },
        );
    }

    /// Register a reader for `T`.
    ///
    /// # Errors
    ///
    /// Returns `VfsError::DuplicateReader` if `T` already has a reader.
    pub fn register<T, F>(&mut self, reader: F) -> VfsResult<()>
    where
        T: 'static,
        F: Fn(&ReaderRegistry, &dyn File) -> VfsResult<T> + Send + Sync + 'static,
    {
        if self.contains::<T>() {
            return Err(VfsError::DuplicateReader(type_name::<T>()));
        }
        self.insert::<T, F>(reader);
        Ok(())
    }

    /// Register a reader that deserializes `T` from the file's JSON document.
    ///
    /// # Errors
    ///
    /// Returns `VfsError::DuplicateReader` if `T` already has a reader.
    pub fn register_json<T>(&mut self) -> VfsResult<()>
    where
        T: DeserializeOwned + 'static,
    {
        self.register::<T, _>(|registry, file| {
            let value = registry.read::<Value>(file)?;
            serde_json::from_value(value).map_err(|e| decode_error::<T>(file, e))
        })
    }

    /// Whether a reader for `T` is registered.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.readers.contains_key(&TypeId::of::<T>())
    }

    /// Names of every registered target type.
    #[must_use]
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.readers.values().map(|e| e.name).collect();
        names.sort_unstable();
        names
    }

    /// Read `file` as a `T`.
    ///
    /// # Errors
    ///
    /// Returns `VfsError::NoReader` if no reader for `T` is registered, or the
    /// reader's own error.
    pub fn read<T: 'static>(&self, file: &dyn File) -> VfsResult<T> {
        let read = self
            .readers
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.read.downcast_ref::<ReadFn<T>>())
            .ok_or(VfsError::NoReader(type_name::<T>()))?;
        read(self, file)
    }

    /// Read `file` as a `T` through the file's typed cache.
    ///
    /// The value stays cached until the file reports an update or deletion.
    ///
    /// # Errors
    ///
    /// See [`ReaderRegistry::read`].
    pub fn read_cached<T: Any + Send + Sync>(&self, file: &dyn File) -> VfsResult<Arc<T>> {
        if let Some(hit) = file.cache().get::<T>() {
            return Ok(hit);
        }
        let value = Arc::new(self.read::<T>(file)?);
        file.cache().insert(Arc::clone(&value));
        Ok(value)
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderRegistry")
            .field("readers", &self.type_names())
            .finish()
    }
}

fn decode_error<T>(file: &dyn File, message: impl ToString) -> VfsError {
    VfsError::Decode {
        path: file.path().to_string(),
        target: type_name::<T>(),
        message: message.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
