use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::Builder;
use tracing::debug;

use crate::error::KiraError;

pub const ENTRY_EXTENSION: &str = "entry";
pub const SCHEMA_VERSION: u32 = 1;

const READABLE_PREFIX_LEN: usize = 64;
const HASH_PREFIX_LEN: usize = 16;
const ARGS_DIGEST_LEN: usize = 16;
const TEMP_PREFIX: &str = ".kira-mn-";

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("namespace pattern"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub cache_root: Utf8PathBuf,
    pub allow_manual_delete_only: bool,
    pub compress: bool,
}

impl CacheConfig {
    pub fn new(cache_root: Utf8PathBuf) -> Self {
        Self {
            cache_root,
            allow_manual_delete_only: true,
            compress: true,
        }
    }

    pub fn default_root() -> Result<Utf8PathBuf, KiraError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir().join(".cache").join("kira-metabolic-networks"),
                )
                .ok()
            })
            .ok_or_else(|| KiraError::Filesystem("unable to resolve cache directory".to_string()))
    }
}

/// Stable identity of a cached value: a logical namespace plus an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    namespace: String,
    identifier: String,
}

impl CacheKey {
    pub fn new(namespace: &str, identifier: impl Into<String>) -> Result<Self, KiraError> {
        if !NAMESPACE_RE.is_match(namespace) {
            return Err(KiraError::InvalidNamespace(namespace.to_string()));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            identifier: identifier.into(),
        })
    }

    /// Key of a derived value: `<label>-<digest>`, where the digest covers the
    /// canonical JSON of `args` (object keys sorted).
    pub fn for_args<T: Serialize + ?Sized>(
        namespace: &str,
        label: &str,
        args: &T,
    ) -> Result<Self, KiraError> {
        let value =
            serde_json::to_value(args).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let canonical =
            serde_json::to_vec(&value).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut digest = hex::encode(Sha256::digest(&canonical));
        digest.truncate(ARGS_DIGEST_LEN);
        Self::new(namespace, format!("{label}-{digest}"))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.namespace.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.identifier.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// `<sanitized identifier>-<digest prefix>.entry`
    pub fn file_name(&self) -> String {
        let digest = self.digest();
        format!(
            "{}-{}.{ENTRY_EXTENSION}",
            sanitize(&self.identifier),
            &digest[..HASH_PREFIX_LEN]
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.identifier)
    }
}

fn sanitize(identifier: &str) -> String {
    let cleaned = identifier
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .take(READABLE_PREFIX_LEN)
        .collect::<String>();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "entry".to_string()
    } else {
        cleaned.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryFormat {
    Raw,
    Serialized,
}

impl fmt::Display for EntryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryFormat::Raw => write!(f, "raw"),
            EntryFormat::Serialized => write!(f, "serialized"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryHeader {
    pub namespace: String,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
    pub format: EntryFormat,
    pub schema_version: u32,
    pub compressed: bool,
}

/// A persisted blob plus its metadata.
///
/// On disk an entry is one line of JSON header followed by the payload,
/// gzip-compressed when the header says so.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub header: EntryHeader,
    pub payload: Vec<u8>,
}

impl CacheEntry {
    pub fn new(key: &CacheKey, format: EntryFormat, payload: Vec<u8>, compressed: bool) -> Self {
        Self {
            header: EntryHeader {
                namespace: key.namespace().to_string(),
                identifier: key.identifier().to_string(),
                created_at: Utc::now(),
                format,
                schema_version: SCHEMA_VERSION,
                compressed,
            },
            payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, KiraError> {
        let mut bytes = serde_json::to_vec(&self.header)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        bytes.push(b'\n');
        if self.header.compressed {
            let mut encoder = GzEncoder::new(bytes, Compression::default());
            encoder
                .write_all(&self.payload)
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            return encoder
                .finish()
                .map_err(|err| KiraError::Filesystem(err.to_string()));
        }
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    pub fn decode(key: &CacheKey, bytes: &[u8]) -> Result<Self, KiraError> {
        let corrupt = |message: String| KiraError::CacheCorruption {
            key: key.to_string(),
            message,
        };
        let split = bytes
            .iter()
            .position(|byte| *byte == b'\n')
            .ok_or_else(|| corrupt("missing entry header".to_string()))?;
        let header: EntryHeader = serde_json::from_slice(&bytes[..split])
            .map_err(|err| corrupt(format!("unreadable entry header: {err}")))?;
        if header.namespace != key.namespace() || header.identifier != key.identifier() {
            return Err(corrupt(format!(
                "entry belongs to {}/{}",
                header.namespace, header.identifier
            )));
        }
        let body = &bytes[split + 1..];
        let payload = if header.compressed {
            let mut decoder = GzDecoder::new(body);
            let mut payload = Vec::new();
            decoder
                .read_to_end(&mut payload)
                .map_err(|err| corrupt(format!("compressed payload unreadable: {err}")))?;
            payload
        } else {
            body.to_vec()
        };
        Ok(Self { header, payload })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredEntry {
    pub file_name: String,
    pub path: Utf8PathBuf,
    pub size_bytes: u64,
    pub header: Option<EntryHeader>,
}

/// Durable key to blob persistence rooted at a cache directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    config: CacheConfig,
}

impl ContentStore {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.config.cache_root
    }

    pub fn path_for(&self, key: &CacheKey) -> Utf8PathBuf {
        self.config
            .cache_root
            .join(key.namespace())
            .join(key.file_name())
    }

    pub fn exists(&self, key: &CacheKey) -> bool {
        self.path_for(key).as_std_path().is_file()
    }

    pub fn read(&self, key: &CacheKey) -> Result<Vec<u8>, KiraError> {
        let path = self.path_for(key);
        fs::read(path.as_std_path()).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => KiraError::NotFound(key.to_string()),
            _ => KiraError::Filesystem(format!("{path}: {err}")),
        })
    }

    /// Writes through a temporary file in the target directory, then renames it into place.
    /// Concurrent writers of the same key race; the last rename wins.
    pub fn write(&self, key: &CacheKey, content: &[u8]) -> Result<(), KiraError> {
        let path = self.path_for(key);
        let parent = path
            .parent()
            .ok_or_else(|| KiraError::Filesystem("invalid cache path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        debug!(key = %key, bytes = content.len(), "cache entry written");
        Ok(())
    }

    pub fn read_entry(&self, key: &CacheKey) -> Result<CacheEntry, KiraError> {
        let bytes = self.read(key)?;
        CacheEntry::decode(key, &bytes)
    }

    pub fn write_entry(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), KiraError> {
        self.write(key, &entry.encode()?)
    }

    /// Operator removal of one entry. Returns whether an entry existed.
    pub fn delete(&self, key: &CacheKey) -> Result<bool, KiraError> {
        let path = self.path_for(key);
        match fs::remove_file(path.as_std_path()) {
            Ok(()) => {
                debug!(key = %key, "cache entry deleted");
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(KiraError::Filesystem(format!("{path}: {err}"))),
        }
    }

    /// Entries of one namespace, sorted by file name. Unreadable headers are listed without one.
    pub fn list(&self, namespace: &str) -> Result<Vec<StoredEntry>, KiraError> {
        if !NAMESPACE_RE.is_match(namespace) {
            return Err(KiraError::InvalidNamespace(namespace.to_string()));
        }
        let dir = self.config.cache_root.join(namespace);
        if !dir.as_std_path().is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for item in
            fs::read_dir(dir.as_std_path()).map_err(|err| KiraError::Filesystem(err.to_string()))?
        {
            let item = item.map_err(|err| KiraError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(item.path()) else {
                continue;
            };
            let Some(file_name) = path.file_name().map(str::to_string) else {
                continue;
            };
            if file_name.starts_with(TEMP_PREFIX) || path.extension() != Some(ENTRY_EXTENSION) {
                continue;
            }
            let size_bytes = item
                .metadata()
                .map_err(|err| KiraError::Filesystem(err.to_string()))?
                .len();
            entries.push(StoredEntry {
                header: read_header(&path),
                file_name,
                path,
                size_bytes,
            });
        }
        entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(entries)
    }
}

fn read_header(path: &Utf8Path) -> Option<EntryHeader> {
    let bytes = fs::read(path.as_std_path()).ok()?;
    let split = bytes.iter().position(|byte| *byte == b'\n')?;
    serde_json::from_slice(&bytes[..split]).ok()
}
