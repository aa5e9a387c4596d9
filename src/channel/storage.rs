use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Where the responder keeps transferred files. Shared by every session,
/// so implementations must stay consistent under concurrent calls.
pub trait Storage: Send + Sync {
    fn put(&self, name: &str, data: &[u8]) -> io::Result<()>;
    fn get(&self, name: &str) -> io::Result<Option<Vec<u8>>>;
    fn list(&self) -> io::Result<Vec<String>>;
}

/// Accepts only names that are one plain path component.
pub fn check_name(name: &str) -> io::Result<()> {
    let mut components = Path::new(name).components();
    let plain = matches!(components.next(), Some(Component::Normal(c)) if c == name)
        && components.next().is_none()
        && !name.contains(['\\', '\0']);
    if plain {
        Ok(())
    } else {
        Err(io::Error::new(ErrorKind::InvalidInput, format!("invalid file name `{}'", name)))
    }
}

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);
const TEMP_SUFFIX: &str = ".part";

/// Writes `data` next to `path` and renames it into place, so readers see
/// either the old file or the whole new one.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let file_name = path.file_name()
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "path has no file name"))?;
    let temp = dir.join(format!(".{}.{}.{}{}", file_name.to_string_lossy(), std::process::id(),
                                TEMP_COUNTER.fetch_add(1, Ordering::Relaxed), TEMP_SUFFIX));
    let res = fs::File::create(&temp).and_then(|mut f| {
        f.write_all(data)?;
        f.sync_all()
    }).and_then(|_| fs::rename(&temp, path));
    if res.is_err() {
        let _ = fs::remove_file(&temp);
    }
    res
}

pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Storage for DirStorage {
    fn put(&self, name: &str, data: &[u8]) -> io::Result<()> {
        check_name(name)?;
        write_atomic(&self.root.join(name), data)
    }

    fn get(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        check_name(name)?;
        match fs::read(self.root.join(name)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() { continue; }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') && name.ends_with(TEMP_SUFFIX) { continue; }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> io::Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.files.lock().map_err(|_| io::Error::new(ErrorKind::Other, "storage lock poisoned"))
    }
}

impl Storage for MemoryStorage {
    fn put(&self, name: &str, data: &[u8]) -> io::Result<()> {
        check_name(name)?;
        self.files()?.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        check_name(name)?;
        Ok(self.files()?.get(name).cloned())
    }

    fn list(&self) -> io::Result<Vec<String>> {
        Ok(self.files()?.keys().cloned().collect())
    }
}
