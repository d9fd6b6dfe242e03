//! Discovery of the Ghostscript executable

use docpress_config::EngineConfig;
use docpress_types::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Ghostscript versions probed on Windows when no install is found by scanning
const KNOWN_WINDOWS_VERSIONS: [&str; 5] = ["10.06.0", "10.05.0", "10.04.0", "10.03.0", "10.02.0"];

/// Finds a working engine executable among an ordered candidate list.
///
/// The first successful probe is cached for the lifetime of the locator. A
/// miss is not cached, so installing the engine later is picked up by the
/// next request.
#[derive(Debug)]
pub struct EngineLocator {
    candidates: Vec<String>,
    probe_timeout: Duration,
    located: OnceCell<PathBuf>,
}

impl EngineLocator {
    /// Create a locator over explicit candidates
    pub fn new(candidates: Vec<String>, probe_timeout: Duration) -> Self {
        Self {
            candidates,
            probe_timeout,
            located: OnceCell::new(),
        }
    }

    /// Create a locator with the platform candidates for `config`
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(default_candidates(config), config.probe_timeout())
    }

    /// Candidates in probe order
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Engine found by an earlier `locate`, if any
    pub fn cached(&self) -> Option<&Path> {
        self.located.get().map(PathBuf::as_path)
    }

    /// Return the first candidate that answers `--version`
    pub async fn locate(&self) -> Result<PathBuf> {
        self.located
            .get_or_try_init(|| self.probe_all())
            .await
            .cloned()
    }

    async fn probe_all(&self) -> Result<PathBuf> {
        for candidate in &self.candidates {
            if probe(Path::new(candidate), self.probe_timeout).await {
                info!("Using compression engine at {}", candidate);
                return Ok(PathBuf::from(candidate));
            }
        }

        warn!(
            "No compression engine found among {} candidates",
            self.candidates.len()
        );
        Err(Error::EngineNotFound {
            candidates: self.candidates.clone(),
        })
    }
}

/// Run `<candidate> --version` and report whether it exited successfully in time
pub async fn probe(candidate: &Path, timeout: Duration) -> bool {
    let child = Command::new(candidate)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(e) => {
            debug!("Engine candidate {} not runnable: {}", candidate.display(), e);
            return false;
        }
    };

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => true,
        Ok(Ok(status)) => {
            debug!("Engine candidate {} exited with {}", candidate.display(), status);
            false
        }
        Ok(Err(e)) => {
            debug!("Engine candidate {} failed: {}", candidate.display(), e);
            false
        }
        Err(_) => {
            debug!(
                "Engine candidate {} did not answer within {:?}",
                candidate.display(),
                timeout
            );
            false
        }
    }
}

/// Ordered candidates for the current platform.
///
/// The configured path comes first, configured extras come last.
pub fn default_candidates(config: &EngineConfig) -> Vec<String> {
    let mut candidates = Vec::new();

    if let Some(path) = &config.path {
        candidates.push(path.display().to_string());
    }

    candidates.extend(platform_candidates());

    for extra in &config.extra_candidates {
        if !candidates.contains(extra) {
            candidates.push(extra.clone());
        }
    }

    candidates
}

#[cfg(not(windows))]
fn platform_candidates() -> Vec<String> {
    ["gs", "/usr/bin/gs", "/usr/local/bin/gs", "/opt/homebrew/bin/gs"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[cfg(windows)]
fn platform_candidates() -> Vec<String> {
    let mut candidates = vec!["gswin64c".to_string(), "gswin32c".to_string()];

    let roots = [
        (PathBuf::from(r"C:\Program Files\gs"), "gswin64c.exe"),
        (PathBuf::from(r"C:\Program Files (x86)\gs"), "gswin32c.exe"),
    ];

    for (root, exe) in &roots {
        for found in scan_install_root(root, exe) {
            push_unique(&mut candidates, found.display().to_string());
        }
    }

    for version in KNOWN_WINDOWS_VERSIONS {
        for (root, exe) in &roots {
            let path = root.join(format!("gs{}", version)).join("bin").join(exe);
            push_unique(&mut candidates, path.display().to_string());
        }
    }

    candidates
}

#[cfg(windows)]
fn push_unique(candidates: &mut Vec<String>, candidate: String) {
    if !candidates.contains(&candidate) {
        candidates.push(candidate);
    }
}

/// Find `<root>/gs<version>/bin/<exe>` on disk, newest version first
pub fn scan_install_root(root: &Path, exe: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };

    let mut found: Vec<(Vec<u32>, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let version = parse_install_version(&name)?;
            let exe_path = entry.path().join("bin").join(exe);
            exe_path.is_file().then_some((version, exe_path))
        })
        .collect();

    found.sort_by(|a, b| b.0.cmp(&a.0));
    found.into_iter().map(|(_, path)| path).collect()
}

/// Parse `gs10.06.0` into `[10, 6, 0]`
fn parse_install_version(name: &str) -> Option<Vec<u32>> {
    let version = name.strip_prefix("gs")?;
    version
        .split('.')
        .map(|part| part.parse::<u32>().ok())
        .collect()
}

/// Known Windows versions, newest first
pub fn known_windows_versions() -> &'static [&'static str] {
    &KNOWN_WINDOWS_VERSIONS
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_configured_path_is_probed_first() {
        let config = EngineConfig {
            path: Some(PathBuf::from("/opt/custom/gs")),
            extra_candidates: vec!["/srv/gs".to_string()],
            ..EngineConfig::default()
        };

        let candidates = default_candidates(&config);
        assert_eq!(candidates.first().map(String::as_str), Some("/opt/custom/gs"));
        assert_eq!(candidates.last().map(String::as_str), Some("/srv/gs"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_unix_candidates() {
        let candidates = default_candidates(&EngineConfig::default());
        assert_eq!(candidates[0], "gs");
        assert!(candidates.contains(&"/usr/bin/gs".to_string()));
        assert!(candidates.contains(&"/opt/homebrew/bin/gs".to_string()));
    }

    #[test]
    fn test_scan_install_root_orders_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        for version in ["gs10.02.0", "gs10.06.0", "gs9.56.1", "not-gs"] {
            let bin = temp_dir.path().join(version).join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            std::fs::write(bin.join("gswin64c.exe"), b"").unwrap();
        }
        // Install directory without the executable
        std::fs::create_dir_all(temp_dir.path().join("gs10.07.0").join("bin")).unwrap();

        let found = scan_install_root(temp_dir.path(), "gswin64c.exe");
        let versions: Vec<_> = found
            .iter()
            .map(|p| p.parent().unwrap().parent().unwrap().file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(versions, vec!["gs10.06.0", "gs10.02.0", "gs9.56.1"]);
    }

    #[test]
    fn test_scan_missing_root() {
        assert!(scan_install_root(Path::new("/definitely/not/here"), "gswin64c.exe").is_empty());
        assert_eq!(known_windows_versions()[0], "10.06.0");
    }

    #[tokio::test]
    async fn test_locate_not_found_lists_candidates() {
        let locator = EngineLocator::new(
            vec![
                "/nonexistent/docpress/gs".to_string(),
                "docpress-no-such-engine".to_string(),
            ],
            Duration::from_secs(1),
        );

        match locator.locate().await {
            Err(Error::EngineNotFound { candidates }) => assert_eq!(candidates.len(), 2),
            other => panic!("expected EngineNotFound, got {:?}", other),
        }
        assert!(locator.cached().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_locate_skips_failing_candidates_and_caches() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let broken = temp_dir.path().join("broken-gs");
        std::fs::write(&broken, "#!/bin/sh\nexit 3\n").unwrap();
        let working = temp_dir.path().join("gs");
        std::fs::write(&working, "#!/bin/sh\necho 10.06.0\n").unwrap();
        for path in [&broken, &working] {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let locator = EngineLocator::new(
            vec![
                broken.display().to_string(),
                working.display().to_string(),
            ],
            Duration::from_secs(5),
        );

        let located = locator.locate().await.unwrap();
        assert_eq!(located, working);
        assert_eq!(locator.cached(), Some(working.as_path()));

        // Cached result survives the executable disappearing
        std::fs::remove_file(&working).unwrap();
        assert_eq!(locator.locate().await.unwrap(), working);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let slow = temp_dir.path().join("slow-gs");
        std::fs::write(&slow, "#!/bin/sh\nexec sleep 10\n").unwrap();
        std::fs::set_permissions(&slow, std::fs::Permissions::from_mode(0o755)).unwrap();

        let started = std::time::Instant::now();
        assert!(!probe(&slow, Duration::from_millis(200)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
