//! Upload progress reporting

/// Which image is being transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    StubUpload,
    FlashWrite,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::StubUpload => write!(f, "Uploading stub"),
            Stage::FlashWrite => write!(f, "Writing flash"),
        }
    }
}

/// Receives progress updates from a session
///
/// `advance` is only called once a chunk has been acknowledged, so resends
/// never count twice.
pub trait Progress: Send {
    fn start(&mut self, _stage: Stage, _total: usize) {}

    fn advance(&mut self, _stage: Stage, _bytes: usize) {}

    fn finish(&mut self, _stage: Stage) {}
}

/// Progress sink that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {}
