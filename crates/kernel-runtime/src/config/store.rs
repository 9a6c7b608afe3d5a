//! Layered configuration store.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, trace};

use super::placeholder;
use super::properties;
use crate::error::ConfigError;

/// Frozen key/value view handed out by the store.
pub type Environment = Arc<HashMap<String, String>>;

type OverrideHook = Arc<dyn Fn(&mut HashMap<String, String>) + Send + Sync>;

// =============================================================================
// PROCESS PROPERTIES
// =============================================================================

/// Properties supplied by the launching process.
///
/// They are merged first, then applied again last so that they override
/// every file.
#[derive(Debug, Clone, Default)]
pub struct ProcessProperties {
    entries: BTreeMap<String, String>,
}

impl ProcessProperties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect `-Dkey=value` and `--key=value` arguments.
    ///
    /// `-Dkey` alone sets an empty value and `--flag` alone sets `true`.
    /// Other arguments are ignored.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut props = Self::new();
        for arg in args {
            let arg = arg.as_ref();
            let (body, bare_value) = if let Some(rest) = arg.strip_prefix("-D") {
                (rest, "")
            } else if let Some(rest) = arg.strip_prefix("--") {
                (rest, "true")
            } else {
                continue;
            };
            match body.split_once('=') {
                Some((key, value)) if !key.is_empty() => props.set(key, value),
                None if !body.is_empty() => props.set(body, bare_value),
                _ => {}
            }
        }
        props
    }

    /// Properties from this process' command line.
    pub fn from_env_args() -> Self {
        Self::from_args(std::env::args().skip(1))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn apply(&self, values: &mut HashMap<String, String>) {
        for (k, v) in &self.entries {
            values.insert(k.clone(), v.clone());
        }
    }
}

// =============================================================================
// TYPED CONVERSION
// =============================================================================

/// Best-effort conversion from a raw property value.
pub trait FromConfig: Sized {
    fn from_config(raw: &str) -> Option<Self>;
}

impl FromConfig for String {
    fn from_config(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

impl FromConfig for bool {
    fn from_config(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

macro_rules! from_config_parse {
    ($($ty:ty),*) => {
        $(
            impl FromConfig for $ty {
                fn from_config(raw: &str) -> Option<Self> {
                    raw.trim().parse().ok()
                }
            }
        )*
    };
}

from_config_parse!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

/// Whole seconds.
impl FromConfig for Duration {
    fn from_config(raw: &str) -> Option<Self> {
        u64::from_config(raw).map(Duration::from_secs)
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Flattened configuration, built once and read without locks.
#[derive(Clone, Default)]
pub struct ConfigStore {
    values: Environment,
}

impl ConfigStore {
    #[must_use]
    pub fn builder() -> ConfigStoreBuilder {
        ConfigStoreBuilder::default()
    }

    /// Store over an already-flattened map. No files, no substitution.
    #[must_use]
    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Typed value, `None` when absent or not convertible.
    pub fn get_as<T: FromConfig>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(T::from_config)
    }

    /// Typed value, `default` when absent or not convertible.
    pub fn get_or<T: FromConfig>(&self, key: &str, default: T) -> T {
        self.get_as(key).unwrap_or(default)
    }

    /// Entries under `prefix.`, with the prefix stripped.
    pub fn attrs(&self, prefix: &str) -> BTreeMap<String, String> {
        let head = format!("{prefix}.");
        self.values
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&head)
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest.to_string(), v.clone()))
            })
            .collect()
    }

    pub fn profile(&self) -> Option<&str> {
        self.get("profile")
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Shared handle to the frozen map.
    pub fn snapshot(&self) -> Environment {
        Arc::clone(&self.values)
    }
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("entries", &self.values.len())
            .field("profile", &self.profile())
            .finish()
    }
}

/// Collects the configuration sources and merges them.
///
/// Priority, low to high:
///
/// ```text
///  1. process properties
///  2. bundled   <configname>.properties
///  3. bundled   <configname>-<profile>.properties
///  4. ./        <configname>.properties
///  5. ./        <configname>-<profile>.properties
///  6. configdir <configname>.properties
///  7. configdir <configname>-<profile>.properties
///  8. override hook
///     ── ${} substitution ──
///  9. process properties again
/// ```
#[derive(Clone)]
pub struct ConfigStoreBuilder {
    process: ProcessProperties,
    bundled: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    override_hook: Option<OverrideHook>,
}

impl Default for ConfigStoreBuilder {
    fn default() -> Self {
        Self {
            process: ProcessProperties::new(),
            bundled: HashMap::new(),
            working_dir: Some(PathBuf::from(".")),
            override_hook: None,
        }
    }
}

impl ConfigStoreBuilder {
    /// Add one process property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.process.set(key, value);
        self
    }

    /// Add every property from `props`.
    #[must_use]
    pub fn properties(mut self, props: ProcessProperties) -> Self {
        for (k, v) in props.iter() {
            self.process.set(k, v);
        }
        self
    }

    /// Register an in-memory file, typically from `include_str!`.
    #[must_use]
    pub fn bundled(mut self, file_name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.bundled.insert(file_name.into(), contents.into());
        self
    }

    /// Directory searched for layers 4 and 5. Defaults to `.`.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Skip layers 4 and 5.
    #[must_use]
    pub fn without_working_dir(mut self) -> Self {
        self.working_dir = None;
        self
    }

    /// Hook that may edit the merged map before substitution.
    #[must_use]
    pub fn override_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut HashMap<String, String>) + Send + Sync + 'static,
    {
        self.override_hook = Some(Arc::new(hook));
        self
    }

    /// Merge every source. Unreadable sources are logged and skipped.
    pub fn build(&self) -> ConfigStore {
        let mut values = HashMap::new();
        self.process.apply(&mut values);

        let configname = self.process.get("configname").unwrap_or("app").to_string();
        let profile = self.process.get("profile").map(str::to_string);
        let configdir = self.process.get("configdir").map(PathBuf::from);

        let mut file_names = vec![format!("{configname}.properties")];
        if let Some(profile) = &profile {
            file_names.push(format!("{configname}-{profile}.properties"));
        }

        for name in &file_names {
            if let Some(text) = self.bundled.get(name) {
                merge(&mut values, text);
                debug!(file = %name, "[config] Loaded bundled file");
            } else {
                trace!(file = %name, "[config] Bundled file not present");
            }
        }

        for dir in [self.working_dir.as_deref(), configdir.as_deref()]
            .into_iter()
            .flatten()
        {
            for name in &file_names {
                load_into(&mut values, &dir.join(name));
            }
        }

        if let Some(hook) = &self.override_hook {
            hook(&mut values);
        }

        let passes = placeholder::resolve(&mut values);
        self.process.apply(&mut values);

        info!(
            entries = values.len(),
            profile = profile.as_deref().unwrap_or("<none>"),
            substitution_passes = passes,
            "[config] Environment loaded"
        );
        ConfigStore::from_map(values)
    }
}

impl fmt::Debug for ConfigStoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStoreBuilder")
            .field("process", &self.process)
            .field("bundled", &self.bundled.keys().collect::<Vec<_>>())
            .field("working_dir", &self.working_dir)
            .field("override_hook", &self.override_hook.is_some())
            .finish()
    }
}

fn merge(values: &mut HashMap<String, String>, text: &str) {
    for (k, v) in properties::parse(text) {
        values.insert(k, v);
    }
}

fn load_into(values: &mut HashMap<String, String>, path: &Path) {
    match read_file(path) {
        Ok(Some(text)) => {
            merge(values, &text);
            debug!(path = %path.display(), "[config] Loaded file");
        }
        Ok(None) => trace!(path = %path.display(), "[config] File not found"),
        Err(e) => error!(error = %e, "[config] Skipping unreadable file"),
    }
}

fn read_file(path: &Path) -> Result<Option<String>, ConfigError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    String::from_utf8(bytes).map(Some).map_err(|_| ConfigError::Encoding {
        path: path.to_path_buf(),
    })
}
