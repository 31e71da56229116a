fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use temposhare_protocol::{
        ControlMessage, FileProgress, FileStatus, Frame, Payload, TransferState,
    };

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    ///
    /// Browser peers emit `50` for a whole-number percentage where
    /// `serde_json` emits `50.0`.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Parses a fixture as a control message, re-encodes it, and compares
    /// the JSON values (key order independent).
    fn roundtrip(name: &str) -> ControlMessage {
        let fixture = load_fixture(name);
        let parsed = ControlMessage::from_json(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to decode {name}: {e}"));
        let encoded = parsed
            .to_json()
            .unwrap_or_else(|e| panic!("failed to encode {name}: {e}"));
        let reserialized: serde_json::Value = serde_json::from_str(&encoded).unwrap();

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  encoded: {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_request_manifest() {
        assert_eq!(
            roundtrip("request_manifest.json"),
            ControlMessage::RequestManifest
        );
    }

    #[test]
    fn fixture_manifest() {
        match roundtrip("manifest.json") {
            ControlMessage::Manifest(m) => {
                assert_eq!(m.files.len(), 2);
                assert_eq!(m.total_size, 1_048_618);
                assert_eq!(m.files[0].mime_type, "application/pdf");
                assert_eq!(m.files[1].name, "notes.txt");
            }
            other => panic!("expected MANIFEST, got {}", other.kind()),
        }
    }

    #[test]
    fn fixture_manifest_accepts_mime_type_key() {
        let msg = ControlMessage::from_json(&read_fixture("manifest_mime_alias.json")).unwrap();
        let ControlMessage::Manifest(manifest) = msg else {
            panic!("expected MANIFEST");
        };
        assert_eq!(manifest.files[0].mime_type, "image/jpeg");

        // Re-encoding normalizes to the `type` key.
        let v = serde_json::to_value(ControlMessage::Manifest(manifest)).unwrap();
        assert_eq!(v["files"][0]["type"], "image/jpeg");
        assert!(v["files"][0].get("mimeType").is_none());
    }

    #[test]
    fn fixture_request_download() {
        match roundtrip("request_download.json") {
            ControlMessage::RequestDownload { file_id } => {
                assert_eq!(file_id, "aK7pQz3-0-1718000000000");
            }
            other => panic!("expected REQUEST_DOWNLOAD, got {}", other.kind()),
        }
    }

    #[test]
    fn fixture_file_start() {
        match roundtrip("file_start.json") {
            ControlMessage::FileStart(start) => {
                assert_eq!(start.name, "report.pdf");
                assert_eq!(start.size, 1_048_576);
                assert_eq!(start.mime_type, "application/pdf");
            }
            other => panic!("expected FILE_START, got {}", other.kind()),
        }
    }

    #[test]
    fn fixture_file_end() {
        assert!(matches!(
            roundtrip("file_end.json"),
            ControlMessage::FileEnd { .. }
        ));
    }

    #[test]
    fn fixture_download_complete() {
        assert!(matches!(
            roundtrip("download_complete.json"),
            ControlMessage::DownloadComplete { .. }
        ));
    }

    #[test]
    fn fixture_file_progress_encoding() {
        let progress = FileProgress {
            transferred: 524_288,
            total: 1_048_576,
            percentage: 50.0,
            speed: "1.5 MB/s".into(),
            status: FileStatus::Downloading,
            data: Some(vec![1u8, 2, 3].into()),
        };
        let encoded = serde_json::to_value(&progress).unwrap();
        assert_eq!(
            normalize_value(&load_fixture("file_progress.json")),
            normalize_value(&encoded)
        );
    }

    #[test]
    fn every_fixture_decodes_through_a_text_frame() {
        for name in [
            "request_manifest.json",
            "manifest.json",
            "request_download.json",
            "file_start.json",
            "file_end.json",
            "download_complete.json",
        ] {
            let frame = Frame::Text(read_fixture(name));
            assert!(
                matches!(frame.decode(), Ok(Payload::Control(_))),
                "{name} did not decode as a control frame"
            );
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let frame = Frame::Text(r#"{"type":"PING"}"#.into());
        assert!(frame.decode().is_err());
    }

    #[test]
    fn status_and_state_spellings() {
        let statuses = [
            (FileStatus::Idle, "idle"),
            (FileStatus::Queued, "queued"),
            (FileStatus::Downloading, "downloading"),
            (FileStatus::Completed, "completed"),
            (FileStatus::Saved, "saved"),
        ];
        for (status, wire) in statuses {
            assert_eq!(serde_json::to_value(status).unwrap(), wire);
        }

        let states = [
            (TransferState::Idle, "IDLE"),
            (TransferState::Initializing, "INITIALIZING"),
            (TransferState::Waiting, "WAITING"),
            (TransferState::Connecting, "CONNECTING"),
            (TransferState::Connected, "CONNECTED"),
            (TransferState::Transferring, "TRANSFERRING"),
            (TransferState::Failed, "FAILED"),
        ];
        for (state, wire) in states {
            assert_eq!(serde_json::to_value(state).unwrap(), wire);
        }
    }
}
