//! Keyed JSON documents on disk: a list of `(key, record)` pairs.
//!
//! Reads take a shared fs2 lock, read-modify-write cycles take an exclusive lock on the
//! same file handle for the whole cycle.

use super::StoreError;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub type Document<T> = Vec<(String, T)>;

pub(crate) fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

fn parse<T: DeserializeOwned>(raw: &str) -> Result<Document<T>, StoreError> {
    // Interrupted writes on some filesystems leave leading NULs behind.
    let cleaned = raw.trim_start_matches('\0').trim();
    if cleaned.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(cleaned)?)
}

/// Read the whole document. A missing file is an empty document.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Document<T>, StoreError> {
    let mut f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    f.lock_shared()?;
    let mut s = String::new();
    let read = f.read_to_string(&mut s);
    let _ = f.unlock();
    read?;
    parse(&s)
}

fn read_locked<T: DeserializeOwned>(f: &mut File) -> Result<Document<T>, StoreError> {
    let mut s = String::new();
    f.seek(SeekFrom::Start(0))?;
    f.read_to_string(&mut s)?;
    parse(&s)
}

fn write_locked<T: Serialize>(f: &mut File, doc: &Document<T>) -> Result<(), StoreError> {
    let data = serde_json::to_string_pretty(doc)?;
    // Rewrite from the start so a shorter document never leaves stale bytes behind.
    f.seek(SeekFrom::Start(0))?;
    f.set_len(0)?;
    f.write_all(data.as_bytes())?;
    f.flush()?;
    f.sync_all()?;
    Ok(())
}

/// Run `mutate` over the current on-disk document under an exclusive lock and write the
/// result back. `mutate` receives `Err` when the existing content could not be parsed and
/// decides what to write instead; returning `None` leaves the file untouched.
pub fn update<T, F, R>(path: &Path, mutate: F) -> Result<R, StoreError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce(Result<Document<T>, StoreError>) -> (Option<Document<T>>, R),
{
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    f.lock_exclusive()?;
    let current = read_locked(&mut f);
    let (next, out) = mutate(current);
    let written = match next {
        Some(doc) => write_locked(&mut f, &doc),
        None => Ok(()),
    };
    let _ = f.unlock();
    written.map(|_| out)
}

/// Replace the whole document.
pub fn store<T>(path: &Path, doc: Document<T>) -> Result<(), StoreError>
where
    T: Serialize + DeserializeOwned,
{
    update::<T, _, ()>(path, move |_| (Some(doc), ()))
}
