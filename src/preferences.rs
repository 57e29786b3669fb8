use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

/// Key lookup with a change notification.
pub trait Preferences: Send + Sync {
    fn get_or_default(&self, key: &str, default: i64) -> i64;

    /// Fires once per observed change. `None` when the store never changes.
    fn subscribe(&self) -> Option<Receiver<()>> {
        None
    }
}

/// Fan-out of unit change notifications to any number of receivers.
#[derive(Default)]
pub(crate) struct Subscribers(Mutex<Vec<Sender<()>>>);

impl Subscribers {
    pub(crate) fn add(&self) -> Option<Receiver<()>> {
        let (tx, rx) = mpsc::channel();
        self.0.lock().ok()?.push(tx);
        Some(rx)
    }

    pub(crate) fn notify(&self) {
        if let Ok(mut senders) = self.0.lock() {
            senders.retain(|tx| tx.send(()).is_ok());
        }
    }
}

#[derive(Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, i64>>,
    subscribers: Subscribers,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: i64) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_owned(), value);
        }
        self.subscribers.notify();
    }
}

impl Preferences for MemoryPreferences {
    fn get_or_default(&self, key: &str, default: i64) -> i64 {
        self.values
            .lock()
            .ok()
            .and_then(|values| values.get(key).copied())
            .unwrap_or(default)
    }

    fn subscribe(&self) -> Option<Receiver<()>> {
        self.subscribers.add()
    }
}

struct FileState {
    path: PathBuf,
    values: Mutex<HashMap<String, i64>>,
    subscribers: Subscribers,
}

impl FileState {
    fn reload(&self) {
        let fresh = match read_values(&self.path) {
            Ok(values) => values,
            Err(err) => {
                log::warn!("Keeping previous preferences: {err:#}");
                return;
            }
        };
        let changed = match self.values.lock() {
            Ok(mut values) if *values != fresh => {
                *values = fresh;
                true
            }
            _ => false,
        };
        if changed {
            log::info!("Preferences reloaded from {}", self.path.display());
            self.subscribers.notify();
        }
    }
}

/// Integer preferences read from a TOML file. Nested tables become dotted
/// keys, so `[artwork] size_index = 1` is `artwork.size_index`.
pub struct FilePreferences {
    state: Arc<FileState>,
    watcher: Option<RecommendedWatcher>,
}

impl FilePreferences {
    /// A missing file is treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = read_values(&path)?;
        Ok(Self {
            state: Arc::new(FileState {
                path,
                values: Mutex::new(values),
                subscribers: Subscribers::default(),
            }),
            watcher: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.state.path
    }

    /// Starts reloading the file whenever it changes on disk.
    pub fn enable_hot_reload(&mut self) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }
        let dir = match self.state.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.exists() {
            return Err(anyhow!("Preferences directory {} does not exist", dir.display()));
        }

        let state = Arc::clone(&self.state);
        let file_name = state.path.file_name().map(|name| name.to_owned());
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(evt) => {
                    let relevant = evt
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_owned()) == file_name);
                    if relevant {
                        state.reload();
                    }
                }
                Err(err) => log::warn!("Preferences watcher error: {err}"),
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        self.watcher = Some(watcher);
        Ok(())
    }

    pub fn hot_reload_enabled(&self) -> bool {
        self.watcher.is_some()
    }

    /// Re-reads the file now; subscribers are notified if anything changed.
    pub fn reload(&self) {
        self.state.reload();
    }
}

impl Preferences for FilePreferences {
    fn get_or_default(&self, key: &str, default: i64) -> i64 {
        self.state
            .values
            .lock()
            .ok()
            .and_then(|values| values.get(key).copied())
            .unwrap_or(default)
    }

    fn subscribe(&self) -> Option<Receiver<()>> {
        self.state.subscribers.add()
    }
}

fn read_values(path: &Path) -> Result<HashMap<String, i64>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read preferences: {}", path.display()))?;
    let table: toml::Table = toml::from_str(&data)
        .with_context(|| format!("Failed to parse preferences: {}", path.display()))?;
    let mut values = HashMap::new();
    flatten_into(&mut values, "", &table);
    Ok(values)
}

fn flatten_into(out: &mut HashMap<String, i64>, prefix: &str, table: &toml::Table) {
    for (key, value) in table {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Integer(n) => {
                out.insert(full, *n);
            }
            toml::Value::Table(inner) => flatten_into(out, &full, inner),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn memory_preferences_notify_on_set() {
        let prefs = MemoryPreferences::new();
        let rx = prefs.subscribe().unwrap();
        assert_eq!(prefs.get_or_default("artwork.size_index", 0), 0);

        prefs.set("artwork.size_index", 2);
        assert_eq!(prefs.get_or_default("artwork.size_index", 0), 2);
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn nested_tables_become_dotted_keys() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("preferences.toml");
        fs::write(&path, "volume_step = 5\n[artwork]\nsize_index = 1\nlabel = \"x\"\n")?;

        let prefs = FilePreferences::open(&path)?;
        assert_eq!(prefs.get_or_default("artwork.size_index", 0), 1);
        assert_eq!(prefs.get_or_default("volume_step", 0), 5);
        assert_eq!(prefs.get_or_default("artwork.label", 7), 7);
        Ok(())
    }

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let prefs = FilePreferences::open(dir.path().join("absent.toml"))?;
        assert_eq!(prefs.get_or_default("artwork.size_index", 3), 3);
        Ok(())
    }

    #[test]
    fn reload_notifies_only_on_change() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("preferences.toml");
        fs::write(&path, "[artwork]\nsize_index = 0\n")?;
        let prefs = FilePreferences::open(&path)?;
        let rx = prefs.subscribe().unwrap();

        prefs.reload();
        assert!(rx.try_recv().is_err());

        fs::write(&path, "[artwork]\nsize_index = 2\n")?;
        prefs.reload();
        assert!(rx.try_recv().is_ok());
        assert_eq!(prefs.get_or_default("artwork.size_index", 0), 2);
        Ok(())
    }

    #[test]
    fn broken_file_keeps_previous_values() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("preferences.toml");
        fs::write(&path, "[artwork]\nsize_index = 1\n")?;
        let prefs = FilePreferences::open(&path)?;

        fs::write(&path, "[artwork\nsize_index = ")?;
        prefs.reload();
        assert_eq!(prefs.get_or_default("artwork.size_index", 0), 1);
        Ok(())
    }
}
