use crate::prelude::*;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use lazy_static::lazy_static;
use nanoid::nanoid;

lazy_static! {
    static ref CACHED: RwLock<HashMap<PathBuf, String>> = RwLock::new(HashMap::new());
}

/// The locally persisted player id: the closest thing to a durable session
/// token. Created on first launch, re-used across page reloads so rejoining
/// a lobby updates the existing player row instead of duplicating it.
pub fn player_id(path: &Path) -> Result<String> {
    if let Some(cached) = CACHED.read().unwrap().get(path) {
        return Ok(cached.clone());
    }

    let id = match fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => contents.trim().to_string(),
        _ => {
            let id = nanoid!();
            fs::write(path, &id)?;
            id
        }
    };

    CACHED.write().unwrap().insert(path.to_path_buf(), id.clone());
    return Ok(id);
}

/// Cleared on logout: the next launch mints a fresh identity.
pub fn clear(path: &Path) -> Result {
    CACHED.write().unwrap().remove(path);

    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            return Err(err.into());
        }
    }

    return Ok(());
}
