//! File-transfer client — wraps the external transfer binary as a subprocess,
//! with input validation, retries, SHA-512 verification, and secure cleanup
//! of per-session temp directories on every exit path.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::RngCore;
use sha2::{Digest, Sha512};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_types::config::TransferConfig;
use courier_types::transfer::{DetectedFile, TransferError};

/// Descriptor substrings rejected outright: path traversal and absolute
/// system paths have no business inside a transfer descriptor.
const FORBIDDEN_DESCRIPTOR_MARKERS: &[&str] = &["../", "~/", "/etc/", "/proc/", "/sys/"];

/// Minimum plausible descriptor length.
const MIN_DESCRIPTOR_LEN: usize = 10;

/// One transfer attempt's working state: an isolated temp directory holding
/// the descriptor file. Never shared between concurrent calls.
struct TransferSession {
    id: String,
    dir: PathBuf,
    descriptor_file: PathBuf,
}

pub struct TransferClient {
    bin_path: PathBuf,
    temp_root: PathBuf,
    timeout: Duration,
    max_file_size: u64,
    retry_attempts: u32,
}

impl TransferClient {
    pub fn new(config: &TransferConfig) -> Self {
        Self {
            bin_path: config.bin_path.clone(),
            temp_root: config.temp_dir.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_file_size: config.max_file_size,
            retry_attempts: config.retry_attempts.max(1),
        }
    }

    /// Whether the external binary looks invocable.
    pub fn is_available(&self) -> bool {
        self.bin_path.is_file() || which_on_path(&self.bin_path)
    }

    /// Download a file described by `descriptor` to `dest`, verifying its
    /// SHA-512 when an expected hash is known. The session temp directory is
    /// securely removed before returning, on every path.
    pub async fn download(
        &self,
        descriptor: &str,
        expected_size: i64,
        expected_hash: Option<&str>,
        dest: &Path,
    ) -> Result<(), TransferError> {
        self.validate(descriptor, expected_size)?;
        let session = self.create_session(descriptor, &self.temp_root).await?;
        info!(session = %session.id, expected_size, "starting download");

        let result = self.attempt_with_retries(&session, expected_hash, dest).await;
        cleanup_session_dir(&session.dir).await;
        match &result {
            Ok(()) => info!(session = %session.id, dest = %dest.display(), "download complete"),
            Err(e) => warn!(session = %session.id, error = %e, "download failed"),
        }
        result
    }

    /// Like [`download`], but for transfers that only reveal the real
    /// filename on completion. The file is left inside the session directory;
    /// the caller moves it into place and then calls [`cleanup_session_dir`]
    /// on `session_dir`. On failure the session is cleaned up here.
    ///
    /// [`download`]: TransferClient::download
    pub async fn download_detecting_name(
        &self,
        descriptor: &str,
        expected_size: i64,
        temp_dir: &Path,
    ) -> Result<DetectedFile, TransferError> {
        self.validate(descriptor, expected_size)?;
        let session = self.create_session(descriptor, temp_dir).await?;
        info!(session = %session.id, expected_size, "starting download (detecting name)");

        let mut last_err = None;
        for attempt in 1..=self.retry_attempts {
            if attempt > 1 {
                tokio::time::sleep(backoff(attempt)).await;
            }
            match self.run_attempt(&session).await {
                Ok(()) => match find_output_file(&session.dir, &session.descriptor_file).await {
                    Ok(path) => {
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        info!(session = %session.id, name, "detected downloaded filename");
                        return Ok(DetectedFile {
                            name,
                            path,
                            session_dir: session.dir.clone(),
                        });
                    }
                    Err(e) if e.is_retryable() => {
                        warn!(session = %session.id, attempt, error = %e, "attempt failed");
                        last_err = Some(e);
                    }
                    Err(e) => {
                        cleanup_session_dir(&session.dir).await;
                        return Err(e);
                    }
                },
                Err(e) if e.is_retryable() => {
                    warn!(session = %session.id, attempt, error = %e, "attempt failed");
                    last_err = Some(e);
                }
                Err(e) => {
                    cleanup_session_dir(&session.dir).await;
                    return Err(e);
                }
            }
        }
        cleanup_session_dir(&session.dir).await;
        Err(last_err.unwrap_or(TransferError::OutputMissing))
    }

    fn validate(&self, descriptor: &str, expected_size: i64) -> Result<(), TransferError> {
        if expected_size <= 0 || expected_size as u64 > self.max_file_size {
            warn!(expected_size, max = self.max_file_size, "rejecting transfer: bad size");
            return Err(TransferError::InvalidSize {
                size: expected_size,
                max: self.max_file_size,
            });
        }
        if !descriptor_is_safe(descriptor) {
            warn!("rejecting transfer: unsafe descriptor");
            return Err(TransferError::InvalidDescriptor);
        }
        Ok(())
    }

    async fn create_session(
        &self,
        descriptor: &str,
        root: &Path,
    ) -> Result<TransferSession, TransferError> {
        let id = format!(
            "xfer_{}_{}",
            chrono::Utc::now().timestamp(),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let dir = root.join(&id);
        tokio::fs::create_dir_all(&dir).await?;
        let descriptor_file = dir.join(format!("{id}.desc"));
        tokio::fs::write(&descriptor_file, descriptor).await?;
        debug!(session = %id, dir = %dir.display(), "created transfer session");
        Ok(TransferSession {
            id,
            dir,
            descriptor_file,
        })
    }

    async fn attempt_with_retries(
        &self,
        session: &TransferSession,
        expected_hash: Option<&str>,
        dest: &Path,
    ) -> Result<(), TransferError> {
        let mut last_err = None;
        for attempt in 1..=self.retry_attempts {
            if attempt > 1 {
                tokio::time::sleep(backoff(attempt)).await;
            }
            match self.attempt_once(session, expected_hash, dest).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    warn!(
                        session = %session.id,
                        attempt,
                        of = self.retry_attempts,
                        error = %e,
                        "attempt failed"
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(TransferError::OutputMissing))
    }

    async fn attempt_once(
        &self,
        session: &TransferSession,
        expected_hash: Option<&str>,
        dest: &Path,
    ) -> Result<(), TransferError> {
        self.run_attempt(session).await?;
        let produced = find_output_file(&session.dir, &session.descriptor_file).await?;

        if let Some(expected) = expected_hash {
            let actual = sha512_hex(&produced).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                warn!(session = %session.id, "integrity check failed");
                return Err(TransferError::Integrity {
                    expected: expected.to_ascii_lowercase(),
                    actual,
                });
            }
            debug!(session = %session.id, "integrity verified");
        }

        move_file(&produced, dest).await?;
        Ok(())
    }

    /// One subprocess invocation under the wall-clock budget. The external
    /// binary is text-marker-driven: a completion marker on stdout counts as
    /// success even when the exit code alone is ambiguous.
    async fn run_attempt(&self, session: &TransferSession) -> Result<(), TransferError> {
        let invocation = tokio::process::Command::new(&self.bin_path)
            .arg("recv")
            .arg(&session.descriptor_file)
            .arg(&session.dir)
            .arg("-y")
            .current_dir(&session.dir)
            .output();

        let output = match tokio::time::timeout(self.timeout, invocation).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(TransferError::Io(e)),
            Err(_) => {
                warn!(session = %session.id, budget_secs = self.timeout.as_secs(), "subprocess timed out");
                return Err(TransferError::Timeout(self.timeout.as_secs()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let parsed = parse_cli_output(&stdout);
        debug!(
            session = %session.id,
            code = output.status.code().unwrap_or(-1),
            status = ?parsed.status,
            progress = parsed.progress,
            "subprocess finished"
        );

        // Marker-driven: a completion marker wins over a bad exit code, and
        // an explicit error marker wins over a clean one.
        if parsed.status == CliStatus::Completed
            || (output.status.success() && parsed.status != CliStatus::Error)
        {
            return Ok(());
        }
        let reason = parsed
            .error
            .or_else(|| stderr.lines().next().map(str::to_string))
            .unwrap_or_else(|| {
                format!("exit code {}", output.status.code().unwrap_or(-1))
            });
        Err(TransferError::Process(reason))
    }
}

fn backoff(attempt: u32) -> Duration {
    // 1s, 2s, 4s... before attempts 2, 3, 4...
    Duration::from_secs(1u64 << (attempt.saturating_sub(2)).min(6))
}

fn descriptor_is_safe(descriptor: &str) -> bool {
    let trimmed = descriptor.trim();
    if trimmed.len() <= MIN_DESCRIPTOR_LEN {
        return false;
    }
    let lower = trimmed.to_ascii_lowercase();
    !FORBIDDEN_DESCRIPTOR_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

fn which_on_path(bin: &Path) -> bool {
    let Some(name) = bin.to_str() else {
        return false;
    };
    if name.contains(std::path::MAIN_SEPARATOR) {
        return false;
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|p| p.join(name).is_file()))
        .unwrap_or(false)
}

/// The one file the subprocess produced, besides the descriptor. Zero or
/// multiple candidates are an error, never a guess.
async fn find_output_file(dir: &Path, descriptor_file: &Path) -> Result<PathBuf, TransferError> {
    let mut candidates = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path == descriptor_file {
            continue;
        }
        if entry.file_type().await?.is_file() {
            candidates.push(path);
        }
    }
    match candidates.len() {
        0 => Err(TransferError::OutputMissing),
        1 => Ok(candidates.remove(0)),
        n => Err(TransferError::AmbiguousOutput(n)),
    }
}

async fn sha512_hex(path: &Path) -> Result<String, std::io::Error> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(hex)
}

async fn move_file(src: &Path, dest: &Path) -> Result<(), std::io::Error> {
    if tokio::fs::rename(src, dest).await.is_err() {
        // Cross-device move: copy then remove.
        tokio::fs::copy(src, dest).await?;
        tokio::fs::remove_file(src).await?;
    }
    Ok(())
}

/// Overwrite a file with random bytes, sync, then unlink. Residual transfer
/// content must not survive on disk.
async fn secure_wipe(path: &Path) -> Result<(), std::io::Error> {
    let len = tokio::fs::metadata(path).await?.len();
    let mut file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    let mut noise = vec![0u8; (len as usize).min(1 << 20).max(1)];
    let mut remaining = len as usize;
    while remaining > 0 {
        let n = remaining.min(noise.len());
        rand::rng().fill_bytes(&mut noise[..n]);
        file.write_all(&noise[..n]).await?;
        remaining -= n;
    }
    file.sync_all().await?;
    drop(file);
    tokio::fs::remove_file(path).await
}

/// Securely delete a session directory and everything in it. Best-effort:
/// cleanup problems are logged, never surfaced.
pub async fn cleanup_session_dir(dir: &Path) {
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                if let Err(e) = secure_wipe(&path).await {
                    warn!(path = %path.display(), error = %e, "failed to wipe session file");
                }
            }
        }
    }
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %dir.display(), error = %e, "failed to remove session dir");
        }
    } else {
        debug!(dir = %dir.display(), "session dir removed");
    }
}

// ── Subprocess output parsing ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliStatus {
    Completed,
    Receiving,
    Error,
    Unknown,
}

#[derive(Debug)]
struct CliOutcome {
    status: CliStatus,
    file_path: Option<String>,
    error: Option<String>,
    progress: u8,
}

/// Parse the transfer binary's textual progress/outcome markers.
fn parse_cli_output(output: &str) -> CliOutcome {
    let mut outcome = CliOutcome {
        status: CliStatus::Unknown,
        file_path: None,
        error: None,
        progress: 0,
    };
    for line in output.lines() {
        let line = line.trim();
        let lower = line.to_ascii_lowercase();
        if lower.contains("received file") || lower.contains("file downloaded:") {
            outcome.status = CliStatus::Completed;
            if let Some((_, path)) = line.split_once(':') {
                outcome.file_path = Some(path.trim().to_string());
            }
        } else if lower.contains("error") || lower.contains("failed") {
            outcome.status = CliStatus::Error;
            outcome.error = Some(line.to_string());
        } else if lower.contains("receiving") {
            if outcome.status == CliStatus::Unknown {
                outcome.status = CliStatus::Receiving;
            }
        } else if let Some(pct) = parse_percent(line) {
            outcome.progress = pct;
        }
    }
    outcome
}

fn parse_percent(line: &str) -> Option<u8> {
    let end = line.find('%')?;
    let digits: String = line[..end]
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(temp_root: &Path, bin: &Path, retry_attempts: u32, timeout_secs: u64) -> TransferClient {
        TransferClient::new(&TransferConfig {
            bin_path: bin.to_path_buf(),
            temp_dir: temp_root.to_path_buf(),
            timeout_secs,
            max_file_size: 1024 * 1024,
            retry_attempts,
        })
    }

    /// Writes an executable fake transfer binary that logs each invocation
    /// to `log` and then runs `body` (sh; $2 = descriptor file, $3 = dir).
    #[cfg(unix)]
    fn fake_bin(dir: &Path, log: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-xftp");
        let script = format!("#!/bin/sh\necho run >> {}\n{}\n", log.display(), body);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn invocations(log: &Path) -> usize {
        std::fs::read_to_string(log).map(|s| s.lines().count()).unwrap_or(0)
    }

    fn temp_root_entries(root: &Path) -> usize {
        std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    const GOOD_DESCRIPTOR: &str = "xftp-descriptor-abcdef0123456789";

    #[test]
    fn descriptor_safety() {
        assert!(descriptor_is_safe(GOOD_DESCRIPTOR));
        assert!(!descriptor_is_safe(""));
        assert!(!descriptor_is_safe("   "));
        assert!(!descriptor_is_safe("short"));
        assert!(!descriptor_is_safe("xftp-../../../etc/shadow-x"));
        assert!(!descriptor_is_safe("descriptor pointing at /etc/passwd"));
        assert!(!descriptor_is_safe("descriptor with ~/secret inside"));
    }

    #[test]
    fn cli_output_markers() {
        let parsed = parse_cli_output("receiving chunk 1\n42%\nFile downloaded: /tmp/x/out.bin\n");
        assert_eq!(parsed.status, CliStatus::Completed);
        assert_eq!(parsed.file_path.as_deref(), Some("/tmp/x/out.bin"));
        assert_eq!(parsed.progress, 42);

        let parsed = parse_cli_output("receiving file meta\n");
        assert_eq!(parsed.status, CliStatus::Receiving);

        let parsed = parse_cli_output("error: relay unreachable\n");
        assert_eq!(parsed.status, CliStatus::Error);
        assert!(parsed.error.unwrap().contains("relay unreachable"));

        assert_eq!(parse_cli_output("").status, CliStatus::Unknown);
    }

    #[test]
    fn backoff_is_exponential() {
        assert_eq!(backoff(2), Duration::from_secs(1));
        assert_eq!(backoff(3), Duration::from_secs(2));
        assert_eq!(backoff(4), Duration::from_secs(4));
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;

        #[tokio::test]
        async fn bad_size_rejected_before_any_subprocess_work() {
            let tmp = tempfile::tempdir().unwrap();
            let log = tmp.path().join("invocations.log");
            let bin = fake_bin(tmp.path(), &log, "echo should-not-run");
            let root = tmp.path().join("sessions");
            let client = client(&root, &bin, 3, 30);
            let dest = tmp.path().join("dest.bin");

            for size in [0i64, -5, 2 * 1024 * 1024] {
                let err = client
                    .download(GOOD_DESCRIPTOR, size, None, &dest)
                    .await
                    .unwrap_err();
                assert!(matches!(err, TransferError::InvalidSize { .. }));
            }
            assert_eq!(invocations(&log), 0);
            assert_eq!(temp_root_entries(&root), 0);
            assert!(!dest.exists());
        }

        #[tokio::test]
        async fn bad_descriptor_rejected_before_any_subprocess_work() {
            let tmp = tempfile::tempdir().unwrap();
            let log = tmp.path().join("invocations.log");
            let bin = fake_bin(tmp.path(), &log, "echo should-not-run");
            let client = client(&tmp.path().join("sessions"), &bin, 3, 30);

            let err = client
                .download("xftp-../../../etc/x", 100, None, &tmp.path().join("d"))
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::InvalidDescriptor));
            assert_eq!(invocations(&log), 0);
        }

        #[tokio::test]
        async fn successful_download_moves_file_and_cleans_session() {
            let tmp = tempfile::tempdir().unwrap();
            let log = tmp.path().join("invocations.log");
            let bin = fake_bin(
                tmp.path(),
                &log,
                "printf payload > \"$3/received.bin\"\necho \"File downloaded: $3/received.bin\"",
            );
            let root = tmp.path().join("sessions");
            let client = client(&root, &bin, 3, 30);
            let dest = tmp.path().join("dest.bin");

            client
                .download(GOOD_DESCRIPTOR, 7, None, &dest)
                .await
                .unwrap();
            assert_eq!(std::fs::read_to_string(&dest).unwrap(), "payload");
            assert_eq!(invocations(&log), 1);
            assert_eq!(temp_root_entries(&root), 0, "session dir must be gone");
        }

        #[tokio::test]
        async fn hash_verification_accepts_match_and_rejects_mismatch() {
            let tmp = tempfile::tempdir().unwrap();
            let log = tmp.path().join("invocations.log");
            let bin = fake_bin(
                tmp.path(),
                &log,
                "printf payload > \"$3/received.bin\"\necho \"File downloaded: $3/received.bin\"",
            );
            let root = tmp.path().join("sessions");
            let client = client(&root, &bin, 2, 30);
            let dest = tmp.path().join("dest.bin");

            // Expected digest of b"payload", computed the same way.
            let sample = tmp.path().join("sample");
            std::fs::write(&sample, "payload").unwrap();
            let good_hash = sha512_hex(&sample).await.unwrap();

            client
                .download(GOOD_DESCRIPTOR, 7, Some(&good_hash.to_uppercase()), &dest)
                .await
                .unwrap();
            assert!(dest.exists());
            std::fs::remove_file(&dest).unwrap();

            let err = client
                .download(GOOD_DESCRIPTOR, 7, Some("deadbeef"), &dest)
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::Integrity { .. }));
            assert!(!dest.exists(), "destination untouched on failure");
            // Mismatch consumed the full retry budget of the second call.
            assert_eq!(invocations(&log), 3);
            assert_eq!(temp_root_entries(&root), 0);
        }

        #[tokio::test]
        async fn process_failure_exhausts_retries_and_cleans_up() {
            let tmp = tempfile::tempdir().unwrap();
            let log = tmp.path().join("invocations.log");
            let bin = fake_bin(tmp.path(), &log, "echo \"error: relay unreachable\"\nexit 1");
            let root = tmp.path().join("sessions");
            let client = client(&root, &bin, 1, 30);

            let err = client
                .download(GOOD_DESCRIPTOR, 7, None, &tmp.path().join("dest.bin"))
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::Process(_)));
            assert_eq!(invocations(&log), 1);
            assert_eq!(temp_root_entries(&root), 0);
        }

        #[tokio::test]
        async fn error_marker_overrides_clean_exit_code() {
            let tmp = tempfile::tempdir().unwrap();
            let log = tmp.path().join("invocations.log");
            let bin = fake_bin(
                tmp.path(),
                &log,
                "printf x > \"$3/out.bin\"\necho \"error: checksum mismatch\"\nexit 0",
            );
            let root = tmp.path().join("sessions");
            let dest = tmp.path().join("dest.bin");

            let err = client(&root, &bin, 1, 30)
                .download(GOOD_DESCRIPTOR, 7, None, &dest)
                .await
                .unwrap_err();
            match err {
                TransferError::Process(reason) => assert!(reason.contains("checksum mismatch")),
                other => panic!("expected Process error, got {other:?}"),
            }
            assert!(!dest.exists());
            assert_eq!(temp_root_entries(&root), 0);
        }

        #[tokio::test]
        async fn zero_or_many_output_files_are_errors() {
            let tmp = tempfile::tempdir().unwrap();
            let log = tmp.path().join("invocations.log");
            // Claims success, writes nothing.
            let bin = fake_bin(tmp.path(), &log, "echo \"File downloaded: nothing\"");
            let root = tmp.path().join("sessions");
            let err = client(&root, &bin, 1, 30)
                .download(GOOD_DESCRIPTOR, 7, None, &tmp.path().join("d1"))
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::OutputMissing));

            let bin = fake_bin(
                tmp.path(),
                &log,
                "printf a > \"$3/a\"\nprintf b > \"$3/b\"\necho \"File downloaded: $3/a\"",
            );
            let err = client(&root, &bin, 1, 30)
                .download(GOOD_DESCRIPTOR, 7, None, &tmp.path().join("d2"))
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::AmbiguousOutput(2)));
            assert_eq!(temp_root_entries(&root), 0);
        }

        #[tokio::test]
        async fn subprocess_timeout_is_not_retried() {
            let tmp = tempfile::tempdir().unwrap();
            let log = tmp.path().join("invocations.log");
            let bin = fake_bin(tmp.path(), &log, "sleep 30");
            let root = tmp.path().join("sessions");
            let client = client(&root, &bin, 3, 1);

            let err = client
                .download(GOOD_DESCRIPTOR, 7, None, &tmp.path().join("dest.bin"))
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::Timeout(1)));
            assert_eq!(invocations(&log), 1, "timeout must not consume more attempts");
            assert_eq!(temp_root_entries(&root), 0);
        }

        #[tokio::test]
        async fn detecting_name_leaves_file_for_caller_then_cleanup_removes_it() {
            let tmp = tempfile::tempdir().unwrap();
            let log = tmp.path().join("invocations.log");
            let bin = fake_bin(
                tmp.path(),
                &log,
                "printf data > \"$3/surprise.pdf\"\necho \"File downloaded: $3/surprise.pdf\"",
            );
            let root = tmp.path().join("sessions");
            let client = client(&root, &bin, 3, 30);

            let detected = client
                .download_detecting_name(GOOD_DESCRIPTOR, 4, &root)
                .await
                .unwrap();
            assert_eq!(detected.name, "surprise.pdf");
            assert!(detected.path.exists(), "file stays until the caller moves it");

            cleanup_session_dir(&detected.session_dir).await;
            assert!(!detected.session_dir.exists());
            assert_eq!(temp_root_entries(&root), 0);
        }
    }
}
