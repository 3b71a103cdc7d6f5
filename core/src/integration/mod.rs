//! Integration tests for the ghost player
//!
//! Demo files are written to temporary directories and driven through the
//! full setup → start → tick → render path against the test doubles.


#[cfg(test)]
pub(crate) mod test_utils {
    use std::path::Path;

    use tempfile::TempDir;

    use crate::config::GhostConfig;
    use crate::ghost::DemoGhostPlayer;
    use crate::host::SearchPathResolver;
    use crate::test_utils::{RecordingRenderTarget, TestSession, write_demo};

    pub const MAPS: [&str; 4] = ["sp_a1_intro1", "sp_a1_intro2", "sp_a1_intro3", "sp_a1_intro4"];

    pub type TestPlayer = DemoGhostPlayer<RecordingRenderTarget>;

    /// Temporary demo directory plus a resolver that searches it
    pub struct DemoDir {
        pub dir: TempDir,
        pub resolver: SearchPathResolver,
    }

    impl DemoDir {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let resolver = SearchPathResolver::new(vec![dir.path().to_path_buf()]);
            Self { dir, resolver }
        }

        pub fn path(&self) -> &Path {
            self.dir.path()
        }

        /// Write `<file>` recorded on `map`
        pub fn demo(&self, file: &str, map: &str, ticks: usize) {
            write_demo(&self.path().join(file), "runner", map, ticks);
        }
    }

    pub fn new_player() -> TestPlayer {
        DemoGhostPlayer::new(RecordingRenderTarget::default(), &GhostConfig::default())
    }

    pub fn live_on(map: &str) -> TestSession {
        let mut session = TestSession::new(&MAPS);
        session.load(Some(map));
        session
    }

    /// Run `ticks` simulation ticks
    pub fn run(player: &mut TestPlayer, session: &mut TestSession, ticks: usize) {
        for _ in 0..ticks {
            player.on_tick(session);
            session.advance();
        }
    }
}
