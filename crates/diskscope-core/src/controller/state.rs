/// Scan and freed-space state snapshots.
use std::fmt;
use std::time::{Duration, Instant};

/// Phase of the scan state machine.
///
/// `Idle → Scanning → ComputingSizes → Complete → (finalize) → Idle`,
/// with any error dropping straight back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanPhase {
    #[default]
    Idle,
    Scanning,
    ComputingSizes,
    Complete,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "",
            Self::Scanning => "Scanning files",
            Self::ComputingSizes => "Computing sizes",
            Self::Complete => "Complete",
        };
        f.write_str(label)
    }
}

/// Snapshot of the current scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanState {
    pub phase: ScanPhase,
    pub started_at: Option<Instant>,
    pub files_scanned: u64,
    pub dirs_scanned: u64,
    pub bytes_found: u64,
}

impl ScanState {
    /// `true` while a scan runs, including the brief terminal `Complete`
    /// display before `finalize_scan` returns the phase to `Idle`.
    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            ScanPhase::Scanning | ScanPhase::ComputingSizes | ScanPhase::Complete
        )
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO)
    }
}

/// Bytes reclaimed through observed deletions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreedState {
    /// Reset on every new scan.
    pub session: u64,
    /// Persisted across runs by the stats manager.
    pub lifetime: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_labels() {
        assert_eq!(ScanPhase::Idle.to_string(), "");
        assert_eq!(ScanPhase::Scanning.to_string(), "Scanning files");
        assert_eq!(ScanPhase::ComputingSizes.to_string(), "Computing sizes");
        assert_eq!(ScanPhase::Complete.to_string(), "Complete");
    }

    #[test]
    fn activity_covers_terminal_display() {
        let mut state = ScanState::default();
        assert!(!state.is_active());
        for phase in [
            ScanPhase::Scanning,
            ScanPhase::ComputingSizes,
            ScanPhase::Complete,
        ] {
            state.phase = phase;
            assert!(state.is_active());
        }
    }
}
