//! Owner-only storage for form databases.
//!
//! The parent directory is created 0o700 and, once the schema is in place,
//! the database and its WAL/SHM sidecars are narrowed to 0o600. Non-Unix
//! platforms get plain creation.

use std::fs::DirBuilder;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Open `path`, creating a private parent directory when it is missing.
pub(crate) fn open_secure_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder
            .create(parent)
            .with_context(|| format!("Failed to create store directory {}", parent.display()))?;
    }
    Connection::open(path).with_context(|| format!("Failed to open database at {}", path.display()))
}

/// Apply the pragmas every engine connection runs with.
pub(crate) fn configure_connection(db: &Connection, busy_timeout: Duration) -> Result<()> {
    db.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;",
    )
    .context("Failed to set form store pragmas")?;
    db.busy_timeout(busy_timeout)
        .context("Failed to set busy timeout")?;
    Ok(())
}

/// Narrow the database file and whichever sidecars exist to owner read/write.
///
/// Another engine on the same file may checkpoint and remove the WAL between
/// listing and chmod, so a vanished file is skipped.
pub(crate) fn restrict_db_files(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.as_os_str().to_owned();
            file.push(suffix);
            match fs::set_permissions(&file, fs::Permissions::from_mode(0o600)) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("Failed to restrict permissions on {}", Path::new(&file).display())
                    });
                }
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
