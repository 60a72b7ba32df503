//! Pre-flight capacity check before a download.
//!
//! The host may not be able to report capacity at all. In that case
//! admission fails open and the download proceeds; a later write failure is
//! still reported as `StorageWriteFailed`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use satchel_core::config::{QuotaMode, QuotaSettings};

use crate::catalog::sum_local_bytes;
use crate::store::StoreHandle;

pub use satchel_core::size::parse_size;

/// Host capacity figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaEstimate {
    pub capacity_bytes: u64,
    pub used_bytes: u64,
}

impl QuotaEstimate {
    pub fn available(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.used_bytes)
    }
}

/// Reports `(capacity, used)`, or `None` when the host cannot tell.
///
/// Called on the blocking pool.
pub trait QuotaReporter: Send + Sync {
    fn estimate(&self) -> Option<QuotaEstimate>;
}

/// Free space of the filesystem holding `path`.
pub struct FilesystemQuota {
    path: PathBuf,
}

impl FilesystemQuota {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl QuotaReporter for FilesystemQuota {
    fn estimate(&self) -> Option<QuotaEstimate> {
        statvfs(nearest_existing(&self.path)?)
    }
}

/// The database file may not exist yet; measure its closest existing ancestor.
fn nearest_existing(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.exists())
}

#[cfg(unix)]
fn statvfs(path: &Path) -> Option<QuotaEstimate> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    // Safety: c_path is NUL-terminated and stat is a plain C struct the
    // call fully initializes on success.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return None;
    }

    let block = stat.f_frsize as u64;
    let capacity_bytes = (stat.f_blocks as u64).saturating_mul(block);
    let available = (stat.f_bavail as u64).saturating_mul(block);
    Some(QuotaEstimate {
        capacity_bytes,
        used_bytes: capacity_bytes.saturating_sub(available),
    })
}

#[cfg(not(unix))]
fn statvfs(_path: &Path) -> Option<QuotaEstimate> {
    None
}

/// Fixed byte budget measured against what the catalog already holds.
pub struct BudgetQuota {
    max_bytes: u64,
    store: StoreHandle,
}

impl BudgetQuota {
    pub fn new(max_bytes: u64, store: StoreHandle) -> Self {
        Self { max_bytes, store }
    }
}

impl QuotaReporter for BudgetQuota {
    fn estimate(&self) -> Option<QuotaEstimate> {
        if self.max_bytes == 0 {
            return None;
        }
        match sum_local_bytes(self.store.as_ref()) {
            Ok(used_bytes) => Some(QuotaEstimate {
                capacity_bytes: self.max_bytes,
                used_bytes,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "could not measure cache usage");
                None
            }
        }
    }
}

/// Fixed figures. Useful for hosts that report quota out of band.
pub struct StaticQuota(pub QuotaEstimate);

impl QuotaReporter for StaticQuota {
    fn estimate(&self) -> Option<QuotaEstimate> {
        Some(self.0)
    }
}

/// Host without quota introspection.
pub struct Unreported;

impl QuotaReporter for Unreported {
    fn estimate(&self) -> Option<QuotaEstimate> {
        None
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// No figures from the host; admitted anyway.
    Unreported,
    Denied { available: u64 },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Self::Denied { .. })
    }
}

#[derive(Clone)]
pub struct AdmissionController {
    reporter: Arc<dyn QuotaReporter>,
}

impl AdmissionController {
    pub fn new(reporter: Arc<dyn QuotaReporter>) -> Self {
        Self { reporter }
    }

    /// Reporter chosen by `[quota] mode`.
    pub fn from_settings(settings: &QuotaSettings, db_path: &Path, store: StoreHandle) -> Self {
        let reporter: Arc<dyn QuotaReporter> = match settings.mode {
            QuotaMode::Filesystem => Arc::new(FilesystemQuota::new(db_path)),
            QuotaMode::Budget => Arc::new(BudgetQuota::new(settings.max_cache_bytes, store)),
            QuotaMode::None => Arc::new(Unreported),
        };
        Self::new(reporter)
    }

    /// Decide admission from the host's figures: admit iff
    /// `capacity - used >= required`. An overcommitted host admits nothing.
    pub fn decide(estimate: Option<QuotaEstimate>, required_bytes: u64) -> Admission {
        match estimate {
            None => Admission::Unreported,
            Some(e) if e.used_bytes <= e.capacity_bytes && e.available() >= required_bytes => {
                Admission::Admitted
            }
            Some(e) => Admission::Denied {
                available: e.available(),
            },
        }
    }

    pub async fn admit(&self, required_bytes: u64) -> Admission {
        let reporter = self.reporter.clone();
        let estimate = match tokio::task::spawn_blocking(move || reporter.estimate()).await {
            Ok(estimate) => estimate,
            Err(e) => {
                tracing::warn!(error = %e, "quota reporter task failed");
                None
            }
        };

        let admission = Self::decide(estimate, required_bytes);
        match admission {
            Admission::Unreported => {
                tracing::warn!(required_bytes, "quota unavailable, admitting without a check")
            }
            Admission::Admitted => tracing::debug!(required_bytes, ?estimate, "quota check passed"),
            Admission::Denied { available } => {
                tracing::info!(required_bytes, available, "quota check denied")
            }
        }
        admission
    }

    /// `true` when a download of `required_bytes` may proceed.
    pub async fn check_quota(&self, required_bytes: u64) -> bool {
        self.admit(required_bytes).await.is_admitted()
    }
}
