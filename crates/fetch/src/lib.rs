//! Archive fetch & parse: download a content-addressed archive, verify it
//! against the supplied checksum, extract it into a scoped temporary
//! directory and yield one parameter record per file under the selected
//! directories.

#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use flate2::read::GzDecoder;
use metrics::{counter, histogram};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use kuset_core::{GitRepositoryGeneratorItem, ParamRecord};

/// Default number of retries when downloading an archive.
const DEFAULT_RETRIES: usize = 9;

const RETRY_DELAY: Duration = Duration::from_millis(500);

fn default_retries() -> usize {
    std::env::var("KUSET_FETCH_RETRIES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_RETRIES)
}

/// Downloads and parses file-source archives.
pub struct ArchiveFetcher {
    client: reqwest::Client,
    retries: usize,
}

impl Default for ArchiveFetcher {
    fn default() -> Self {
        Self::new(default_retries())
    }
}

impl ArchiveFetcher {
    pub fn new(retries: usize) -> Self {
        ArchiveFetcher {
            client: reqwest::Client::new(),
            retries,
        }
    }

    /// Fetch the archive at `url`, verify `checksum` (hex SHA-256), and
    /// return one record per file under the included directories.
    ///
    /// Any unreadable or unparsable file fails the whole fetch; nothing is
    /// yielded partially. The extraction directory is removed on every
    /// exit path.
    pub async fn fetch_and_parse(
        &self,
        url: &str,
        checksum: &str,
        directories: &[GitRepositoryGeneratorItem],
    ) -> Result<Vec<ParamRecord>> {
        let t0 = Instant::now();
        counter!("kuset_fetch_attempts", 1u64);
        let body = self.download(url).await?;
        verify_checksum(&body, checksum, url)?;

        let tmp = tempfile::tempdir().context("creating temporary directory for extraction")?;
        extract_archive(&body, tmp.path())
            .with_context(|| format!("extracting archive from {url}"))?;
        let records = parse_directories(tmp.path(), directories)?;
        histogram!("kuset_fetch_duration_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(url = %url, records = records.len(), took_ms = %t0.elapsed().as_millis(), "archive parsed");
        Ok(records)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let mut last_err = None;
        for attempt in 0..=self.retries {
            if attempt > 0 {
                counter!("kuset_fetch_retries", 1u64);
                tokio::time::sleep(RETRY_DELAY * attempt as u32).await;
            }
            match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                    Ok(bytes) => {
                        debug!(url = %url, bytes = bytes.len(), attempt, "archive downloaded");
                        return Ok(bytes.to_vec());
                    }
                    Err(e) => last_err = Some(anyhow!(e)),
                },
                Ok(resp) => last_err = Some(anyhow!("unexpected status {}", resp.status())),
                Err(e) => last_err = Some(anyhow!(e)),
            }
            warn!(url = %url, attempt, "archive download failed");
        }
        Err(last_err.unwrap_or_else(|| anyhow!("no download attempts made")))
            .with_context(|| format!("failed to get archive URL {url}"))
    }
}

fn verify_checksum(body: &[u8], checksum: &str, url: &str) -> Result<()> {
    let digest = hex::encode(Sha256::digest(body));
    if !digest.eq_ignore_ascii_case(checksum.trim()) {
        bail!("checksum mismatch for {url}: expected {checksum}, got {digest}");
    }
    Ok(())
}

fn extract_archive(body: &[u8], dest: &Path) -> Result<()> {
    let decoder = GzDecoder::new(Cursor::new(body));
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest).context("unpacking tarball")?;
    Ok(())
}

/// Resolve `rel` strictly beneath `root`, rejecting any component that
/// would escape it.
fn resolve_under(root: &Path, rel: &str) -> Result<PathBuf> {
    let mut resolved = root.to_path_buf();
    for comp in Path::new(rel).components() {
        match comp {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            _ => bail!("directory {rel:?} escapes the archive root"),
        }
    }
    Ok(resolved)
}

fn parse_directories(
    root: &Path,
    directories: &[GitRepositoryGeneratorItem],
) -> Result<Vec<ParamRecord>> {
    let excluded: HashSet<&str> = directories
        .iter()
        .filter(|d| d.exclude == Some(true))
        .map(|d| d.path.as_str())
        .collect();

    let mut records = Vec::new();
    for dir in directories {
        if dir.exclude == Some(true) || excluded.contains(dir.path.as_str()) {
            continue;
        }
        records.extend(parse_directory(root, &dir.path)?);
    }
    Ok(records)
}

fn parse_directory(root: &Path, rel: &str) -> Result<Vec<ParamRecord>> {
    let dir = resolve_under(root, rel)?;
    let mut entries = std::fs::read_dir(&dir)
        .with_context(|| format!("listing archive directory {rel:?}"))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("listing archive directory {rel:?}"))?;
    entries.sort_by_key(|e| e.file_name());

    let mut records = Vec::new();
    for entry in entries {
        let file_type = entry.file_type()?;
        if !file_type.is_file() {
            continue;
        }
        let local = format!(
            "{}/{}",
            rel.trim_end_matches('/'),
            entry.file_name().to_string_lossy()
        );
        let bytes = std::fs::read(entry.path())
            .with_context(|| format!("failed to read from archive file {local}"))?;
        let doc: serde_json::Value = serde_yaml::from_slice(&bytes)
            .with_context(|| format!("failed to parse archive file {local}"))?;
        let serde_json::Value::Object(record) = doc else {
            bail!("archive file {local} is not a mapping");
        };
        records.push(record);
    }
    Ok(records)
}
