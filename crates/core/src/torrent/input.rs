//! Parsing user input into torrent add-specs.

use std::path::{Path, PathBuf};

use librqbit_core::torrent_metainfo::{torrent_from_bytes, TorrentMetaV1Borrowed};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::InfoHash;

/// Errors produced while interpreting torrent input.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Invalid magnet link: {0}")]
    InvalidMagnet(String),

    #[error("Invalid info hash: {0}")]
    InvalidHash(String),

    #[error("Invalid torrent file: {0}")]
    InvalidTorrentFile(String),

    #[error("Unrecognized input: must be a magnet link, torrent file path, or info hash")]
    Unrecognized,
}

/// Everything needed to (re)join a torrent's swarm.
///
/// Persisted as JSON inside the catalog record so a torrent can be rejoined
/// after a restart without the user supplying the input again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentSpec {
    pub info_hash: InfoHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trackers: Vec<String>,
    /// Raw `.torrent` contents, when the torrent was added from a file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub torrent_bytes: Option<Vec<u8>>,
}

impl TorrentSpec {
    /// A spec that only knows the hash; metadata must come from peers.
    pub fn from_hash(info_hash: InfoHash) -> Self {
        Self {
            info_hash,
            display_name: None,
            trackers: Vec::new(),
            torrent_bytes: None,
        }
    }

    /// Build a magnet link carrying the hash, name and trackers.
    pub fn to_magnet(&self) -> String {
        let mut uri = format!("magnet:?xt=urn:btih:{}", self.info_hash.to_hex());
        if let Some(ref name) = self.display_name {
            uri.push_str("&dn=");
            uri.push_str(&urlencoding::encode(name));
        }
        for tracker in &self.trackers {
            uri.push_str("&tr=");
            uri.push_str(&urlencoding::encode(tracker));
        }
        uri
    }

    /// Parse a `magnet:?` URI.
    pub fn from_magnet(uri: &str) -> Result<Self, InputError> {
        let query = uri
            .strip_prefix("magnet:?")
            .ok_or_else(|| InputError::InvalidMagnet("must start with 'magnet:?'".to_string()))?;

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::new();

        for param in query.split('&') {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());

            match key {
                "xt" => {
                    if let Some(hash) = value.strip_prefix("urn:btih:") {
                        info_hash = Some(InfoHash::parse(hash)?);
                    }
                }
                "dn" if !value.is_empty() => display_name = Some(value),
                "tr" if !value.is_empty() => trackers.push(value),
                _ => {}
            }
        }

        let info_hash = info_hash.ok_or_else(|| {
            InputError::InvalidMagnet("missing 'xt=urn:btih:' parameter".to_string())
        })?;

        Ok(Self {
            info_hash,
            display_name,
            trackers,
            torrent_bytes: None,
        })
    }

    /// Parse `.torrent` file contents. The info hash is computed by the
    /// engine's metainfo parser.
    pub fn from_torrent_bytes(data: Vec<u8>) -> Result<Self, InputError> {
        let (info_hash, display_name, trackers) = {
            let meta: TorrentMetaV1Borrowed<'_> = torrent_from_bytes(&data)
                .map_err(|e| InputError::InvalidTorrentFile(e.to_string()))?;

            let lossy = |b: &[u8]| String::from_utf8_lossy(b).into_owned();
            let display_name = meta.info.name.as_ref().map(|n| lossy(n.as_ref()));

            let mut trackers = Vec::new();
            if let Some(ref announce) = meta.announce {
                trackers.push(lossy(announce.as_ref()));
            }
            for tier in &meta.announce_list {
                for tracker in tier {
                    let tracker = lossy(tracker.as_ref());
                    if !trackers.contains(&tracker) {
                        trackers.push(tracker);
                    }
                }
            }

            (InfoHash::from_bytes(meta.info_hash.0), display_name, trackers)
        };

        Ok(Self {
            info_hash,
            display_name,
            trackers,
            torrent_bytes: Some(data),
        })
    }
}

/// The forms a user can add a torrent in.
#[derive(Debug, Clone)]
pub enum TorrentInput {
    /// `magnet:?xt=urn:btih:...`
    Magnet(String),
    /// Path to a `.torrent` file on the local filesystem.
    Path(PathBuf),
    /// Uploaded `.torrent` contents.
    TorrentFile(Vec<u8>),
    /// Bare 40-hex or 32-base32 info hash.
    Hash(String),
}

impl TorrentInput {
    /// Classify a free-form string the way the add dialog does: magnet
    /// first, then an existing file path, then a bare hash.
    pub fn detect(input: &str) -> Self {
        let input = input.trim();
        if input.starts_with("magnet:?") {
            TorrentInput::Magnet(input.to_string())
        } else if Path::new(input).is_file() {
            TorrentInput::Path(PathBuf::from(input))
        } else {
            TorrentInput::Hash(input.to_string())
        }
    }

    /// Short label for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TorrentInput::Magnet(_) => "magnet",
            TorrentInput::Path(_) | TorrentInput::TorrentFile(_) => "file",
            TorrentInput::Hash(_) => "hash",
        }
    }

    /// Validate and normalize into a spec.
    pub fn into_spec(self) -> Result<TorrentSpec, InputError> {
        match self {
            TorrentInput::Magnet(uri) => TorrentSpec::from_magnet(&uri),
            TorrentInput::Path(path) => {
                let data = std::fs::read(&path).map_err(|e| {
                    InputError::InvalidTorrentFile(format!("{}: {}", path.display(), e))
                })?;
                TorrentSpec::from_torrent_bytes(data)
            }
            TorrentInput::TorrentFile(data) => TorrentSpec::from_torrent_bytes(data),
            TorrentInput::Hash(hash) => match hash.len() {
                40 | 32 => InfoHash::parse(&hash).map(TorrentSpec::from_hash),
                _ => Err(InputError::Unrecognized),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn test_magnet_with_name_and_trackers() {
        let uri = format!(
            "magnet:?xt=urn:btih:{}&dn=Big%20Buck%20Bunny&tr=udp%3A%2F%2Ftracker.example%3A80&tr=http%3A%2F%2Fother.example%2Fannounce",
            HEX
        );
        let spec = TorrentSpec::from_magnet(&uri).unwrap();
        assert_eq!(spec.info_hash.to_hex(), HEX);
        assert_eq!(spec.display_name.as_deref(), Some("Big Buck Bunny"));
        assert_eq!(
            spec.trackers,
            vec![
                "udp://tracker.example:80".to_string(),
                "http://other.example/announce".to_string()
            ]
        );
        assert!(spec.torrent_bytes.is_none());
    }

    #[test]
    fn test_magnet_without_hash_is_rejected() {
        let err = TorrentSpec::from_magnet("magnet:?dn=Nothing").unwrap_err();
        assert!(matches!(err, InputError::InvalidMagnet(_)));
    }

    #[test]
    fn test_magnet_with_bad_hash_is_rejected() {
        let err = TorrentSpec::from_magnet("magnet:?xt=urn:btih:nothex").unwrap_err();
        assert!(matches!(err, InputError::InvalidHash(_)));
    }

    #[test]
    fn test_to_magnet_roundtrips_through_parser() {
        let spec = TorrentSpec {
            info_hash: InfoHash::parse(HEX).unwrap(),
            display_name: Some("A & B".to_string()),
            trackers: vec!["udp://t.example:1337".to_string()],
            torrent_bytes: None,
        };
        let parsed = TorrentSpec::from_magnet(&spec.to_magnet()).unwrap();
        assert_eq!(parsed, spec);
    }

    #[test]
    fn test_detect_classifies_input() {
        assert!(matches!(
            TorrentInput::detect("  magnet:?xt=urn:btih:abc "),
            TorrentInput::Magnet(_)
        ));
        assert!(matches!(TorrentInput::detect(HEX), TorrentInput::Hash(_)));

        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert!(matches!(TorrentInput::detect(&path), TorrentInput::Path(_)));
    }

    #[test]
    fn test_hash_input_into_spec() {
        let spec = TorrentInput::Hash(HEX.to_uppercase()).into_spec().unwrap();
        assert_eq!(spec.info_hash.to_hex(), HEX);
        assert!(spec.display_name.is_none());
    }

    #[test]
    fn test_unrecognized_input() {
        let err = TorrentInput::detect("definitely not a torrent")
            .into_spec()
            .unwrap_err();
        assert!(matches!(err, InputError::Unrecognized));
    }

    #[test]
    fn test_garbage_torrent_bytes_rejected() {
        let err = TorrentInput::TorrentFile(b"not bencode".to_vec())
            .into_spec()
            .unwrap_err();
        assert!(matches!(err, InputError::InvalidTorrentFile(_)));
    }

    #[test]
    fn test_spec_json_omits_empty_fields() {
        let spec = TorrentSpec::from_hash(InfoHash::parse(HEX).unwrap());
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, format!("{{\"info_hash\":\"{}\"}}", HEX));
    }
}
