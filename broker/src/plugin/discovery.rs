//! Plugin discovery
//!
//! Scans the immediate subdirectories of the plugins root for a
//! `plugin.yaml` descriptor. A broken descriptor only removes that plugin.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use super::lifecycle::PluginInstance;
use super::metadata::{DESCRIPTOR_FILE, PluginMetadata};

/// Discover every valid plugin under `root`, keyed by protocol
///
/// A missing or unreadable root yields an empty map. When two descriptors
/// claim the same protocol the first one found wins.
pub fn discover_plugins(root: &Path) -> HashMap<String, PluginInstance> {
    let mut plugins = HashMap::new();

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Plugins directory not readable");
            return plugins;
        }
    };

    let mut dirs: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    for dir in dirs {
        let descriptor = dir.join(DESCRIPTOR_FILE);
        if !descriptor.is_file() {
            debug!(dir = %dir.display(), "No plugin descriptor, skipping");
            continue;
        }

        let metadata = match PluginMetadata::load(&descriptor) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(descriptor = %descriptor.display(), error = %e, "Skipping invalid plugin");
                continue;
            }
        };

        let protocol = metadata.protocol.clone();
        if plugins.contains_key(&protocol) {
            warn!(
                protocol = %protocol,
                dir = %dir.display(),
                "Duplicate plugin protocol, skipping"
            );
            continue;
        }

        info!(
            protocol = %protocol,
            name = %metadata.name,
            version = %metadata.version,
            "Discovered plugin"
        );
        plugins.insert(protocol, PluginInstance::new(metadata, &dir));
    }

    plugins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::lifecycle::PluginState;
    use std::fs;
    use tempfile::TempDir;

    fn descriptor(protocol: &str) -> String {
        format!(
            r#"
name: "{protocol} plugin"
protocol: "{protocol}"
executable:
  type: "binary"
  command: ["./run"]
grpc:
  port: 50052
capabilities:
  video_codecs: ["H264"]
  audio_codecs: ["OPUS"]
  supported_resolutions: []
  webrtc_support: true
"#
        )
    }

    fn write_plugin(root: &Path, dir: &str, contents: &str) {
        let path = root.join(dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(DESCRIPTOR_FILE), contents).unwrap();
    }

    #[test]
    fn test_discovers_valid_plugins() {
        let root = TempDir::new().unwrap();
        write_plugin(root.path(), "matrix", &descriptor("matrix"));
        write_plugin(root.path(), "xmpp", &descriptor("xmpp"));

        let plugins = discover_plugins(root.path());

        assert_eq!(plugins.len(), 2);
        let matrix = &plugins["matrix"];
        assert_eq!(matrix.state, PluginState::Stopped);
        assert_eq!(matrix.plugin_dir, root.path().join("matrix"));
    }

    #[test]
    fn test_malformed_descriptor_skipped() {
        let root = TempDir::new().unwrap();
        write_plugin(root.path(), "good", &descriptor("good"));
        write_plugin(root.path(), "bad", "name: [unterminated");
        write_plugin(root.path(), "incomplete", "name: \"No protocol\"\n");

        let plugins = discover_plugins(root.path());

        assert_eq!(plugins.len(), 1);
        assert!(plugins.contains_key("good"));
    }

    #[test]
    fn test_non_plugin_entries_ignored() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("README.md"), "not a plugin").unwrap();
        fs::create_dir(root.path().join("empty")).unwrap();

        assert!(discover_plugins(root.path()).is_empty());
    }

    #[test]
    fn test_missing_root_is_empty() {
        let root = TempDir::new().unwrap();
        assert!(discover_plugins(&root.path().join("nope")).is_empty());
    }

    #[test]
    fn test_duplicate_protocol_keeps_first() {
        let root = TempDir::new().unwrap();
        write_plugin(root.path(), "a", &descriptor("dup"));
        write_plugin(root.path(), "b", &descriptor("dup"));

        let plugins = discover_plugins(root.path());
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins["dup"].plugin_dir, root.path().join("a"));
    }
}
