use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tokio::{
    fs::{self, File},
    io::{self, AsyncWriteExt},
};

/// Reads the whole file. A missing file is not an error and returns [None].
pub async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, io::Error> {
    match fs::read(path).await {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Replaces the contents of `path` in a way that readers either see the old or the new contents.
/// Data is written into a sibling temporary file that is renamed over the target afterwards.
pub async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    let temporary = temporary_path(path);

    let mut file = File::create(&temporary).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = fs::rename(&temporary, path).await {
        let _ = fs::remove_file(&temporary).await;
        return Err(e);
    }
    Ok(())
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|v| v.to_os_string())
        .unwrap_or_else(|| OsString::from("data"));
    name.push(".tmp");
    path.with_file_name(name)
}
