use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use crate::model::LoadProgress;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model not found at {0:?} and no download URL is configured")]
    NotFound(PathBuf),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to write model to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("recognizer backend error: {0}")]
    Backend(String),
}

const READ_CHUNK: usize = 64 * 1024;

/// Fetches `url` into `dest`, reporting `initiate`, `progress` and `done`
/// events. Progress is reported at most once per whole percent.
pub fn fetch(
    url: &str,
    dest: &Path,
    progress: &mut dyn FnMut(LoadProgress),
) -> Result<(), ModelError> {
    let file_name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| url.to_string());

    info!("Downloading model from {} to {:?}", url, dest);
    progress(LoadProgress::new("initiate").file(&file_name));

    let download_err = |source| ModelError::Download {
        url: url.to_string(),
        source,
    };
    let mut response = reqwest::blocking::get(url).map_err(download_err)?;
    if !response.status().is_success() {
        return Err(ModelError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    let total = response.content_length().unwrap_or(0);

    if let Some(dir) = dest.parent() {
        fs::create_dir_all(dir).map_err(|source| ModelError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    // Written beside the destination, then renamed into place
    let part = dest.with_extension("part");
    let write_err = |source| ModelError::Write {
        path: part.clone(),
        source,
    };
    let mut file = fs::File::create(&part).map_err(write_err)?;

    let mut buffer = vec![0u8; READ_CHUNK];
    let mut downloaded: u64 = 0;
    let mut last_percent: Option<u32> = None;
    loop {
        let read = response.read(&mut buffer).map_err(write_err)?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read]).map_err(write_err)?;
        downloaded += read as u64;

        if let Some(percent) = percent_of(downloaded, total) {
            let whole = percent as u32;
            if last_percent != Some(whole) {
                last_percent = Some(whole);
                progress(LoadProgress::new("progress").file(&file_name).percent(percent));
            }
        }
    }
    file.flush().map_err(write_err)?;
    drop(file);

    fs::rename(&part, dest).map_err(|source| ModelError::Write {
        path: dest.to_path_buf(),
        source,
    })?;

    info!("Downloaded {} bytes to {:?}", downloaded, dest);
    progress(LoadProgress::new("done").file(&file_name).percent(100.0));
    Ok(())
}

fn percent_of(done: u64, total: u64) -> Option<f32> {
    if total == 0 {
        return None;
    }
    Some((done as f64 / total as f64 * 100.0).min(100.0) as f32)
}
